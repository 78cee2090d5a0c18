use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::copy::CopyStrategy;
use crate::error::CollectorError;
use crate::host::{Host, Role};
use crate::progress::Progress;
use crate::resolver::HostResolver;
use crate::staging::Staging;
use crate::task::CollectionTask;
use crate::transport::Transport;

/// Phases of a collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ValidatingConfig,
    ResolvingHosts,
    CollectingPerHost,
    CollectingClusterWide,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::ValidatingConfig => "validating_config",
            RunState::ResolvingHosts => "resolving_hosts",
            RunState::CollectingPerHost => "collecting_per_host",
            RunState::CollectingClusterWide => "collecting_cluster_wide",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-host outcomes of a run. Every resolved host lands in exactly one of
/// `succeeded` or `failed`.
#[derive(Debug, Default)]
pub struct CollectionResult {
    pub succeeded: Vec<Host>,
    pub failed: BTreeMap<Host, CollectorError>,
    pub cluster_failures: BTreeMap<String, CollectorError>,
}

impl CollectionResult {
    pub fn record(&mut self, host: Host, outcome: Result<(), CollectorError>) {
        match outcome {
            Ok(()) => {
                self.failed.remove(&host);
                if !self.succeeded.contains(&host) {
                    self.succeeded.push(host);
                }
            }
            Err(e) => {
                self.succeeded.retain(|h| h != &host);
                self.failed.insert(host, e);
            }
        }
    }

    pub fn host_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cluster_failures.is_empty()
    }

    /// One error joining every per-host failure, or `None` if all hosts succeeded.
    pub fn summary_error(&self) -> Option<CollectorError> {
        if self.failed.is_empty() {
            return None;
        }
        let summary = self
            .failed
            .iter()
            .map(|(host, e)| format!("{}: {}", host, e))
            .collect::<Vec<_>>()
            .join("; ");
        Some(CollectorError::HostsFailed {
            count: self.failed.len(),
            summary,
        })
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Done {
        hosts: Vec<Host>,
        result: CollectionResult,
    },
    Failed {
        error: CollectorError,
        partial: CollectionResult,
    },
}

impl RunOutcome {
    pub fn result(&self) -> &CollectionResult {
        match self {
            RunOutcome::Done { result, .. } => result,
            RunOutcome::Failed { partial, .. } => partial,
        }
    }
}

/// Drives a run: validate, resolve both roles, collect per host, then run
/// the cluster-wide steps.
pub struct CollectionOrchestrator<'a> {
    config: &'a Config,
    transport: Arc<dyn Transport>,
    copy: CopyStrategy,
    staging: Staging,
    progress: Progress,
    state: RunState,
}

impl<'a> CollectionOrchestrator<'a> {
    pub fn new(config: &'a Config, transport: Arc<dyn Transport>, staging: Staging) -> Self {
        let copy = CopyStrategy::for_transport(transport.as_ref(), config.sudo_user.as_deref());
        Self {
            config,
            transport,
            copy,
            staging,
            progress: Progress::new(),
            state: RunState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn copy_strategy(&self) -> &CopyStrategy {
        &self.copy
    }

    pub async fn run(&mut self) -> RunOutcome {
        self.state = RunState::ValidatingConfig;
        if let Err(e) = self.config.validate() {
            return self.fail(e, CollectionResult::default());
        }

        self.state = RunState::ResolvingHosts;
        let mut hosts = Vec::new();
        for role in [Role::Coordinator, Role::Executor] {
            let selector = self.config.selector(role);
            match HostResolver::resolve(&selector, self.transport.as_ref()).await {
                Ok(found) => hosts.extend(found),
                Err(e) => {
                    error!("{}", self.transport.help_text());
                    return self.fail(e, CollectionResult::default());
                }
            }
        }
        self.progress.set_hosts_total(hosts.len());

        self.state = RunState::CollectingPerHost;
        let mut result = self.collect_per_host(&hosts).await;

        // barrier: every host task has completed before this point
        self.state = RunState::CollectingClusterWide;
        let cluster_dir = self.staging.cluster_dir();
        for (step, e) in self.transport.collect_cluster(&hosts, &cluster_dir).await {
            warn!("cluster step '{}' failed: {}", step, e);
            result.cluster_failures.insert(step, e);
        }

        if let Some(summary) = result.summary_error() {
            warn!("{}", summary);
        }
        self.state = RunState::Done;
        RunOutcome::Done { hosts, result }
    }

    fn fail(&mut self, error: CollectorError, partial: CollectionResult) -> RunOutcome {
        error!("collection aborted during {}: {}", self.state, error);
        self.state = RunState::Failed;
        RunOutcome::Failed { error, partial }
    }

    async fn collect_per_host(&self, hosts: &[Host]) -> CollectionResult {
        let deadline = Instant::now() + self.config.run_timeout();
        let semaphore = Arc::new(Semaphore::new(self.config.collection.worker_limit.max(1)));
        let transport = self.transport.as_ref();
        let copy = &self.copy;

        info!(
            "Collecting from {} host(s) with up to {} at a time",
            hosts.len(),
            self.config.collection.worker_limit
        );

        let mut pending = FuturesUnordered::new();
        for host in hosts {
            let task = CollectionTask::plan(host.clone(), self.config, &self.staging);
            let semaphore = semaphore.clone();
            pending.push(async move {
                let work = async {
                    let _permit = semaphore.acquire().await.map_err(|e| {
                        CollectorError::Transport(format!("worker pool closed: {}", e))
                    })?;
                    task.run(transport, copy).await
                };
                let outcome = match tokio::time::timeout_at(deadline, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(CollectorError::HostTimedOut(task.host.identifier.clone())),
                };
                (task.host, outcome)
            });
        }

        let mut result = CollectionResult::default();
        while let Some((host, outcome)) = pending.next().await {
            match &outcome {
                Ok(()) => self.progress.host_finished(true),
                Err(e) => {
                    warn!("collection failed on {}: {}", host, e);
                    self.progress.host_finished(false);
                }
            }
            result.record(host, outcome);
        }
        result.succeeded.sort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportMode;
    use crate::copy::CopyPath;
    use crate::testing::FakeTransport;
    use std::time::Duration;

    fn config(dir: &std::path::Path) -> Config {
        let mut config = Config {
            mode: Some(TransportMode::Docker),
            coordinator: "dremio-coordinator".into(),
            executors: "dremio-executor".into(),
            staging_dir: dir.to_path_buf(),
            collection_yaml: dir.join("missing-ddc.yaml"),
            ..Config::default()
        };
        config.collection.diagnostic_commands =
            [("uname".to_string(), "uname -a".to_string())].into_iter().collect();
        config
    }

    async fn run_with(config: &Config, transport: Arc<FakeTransport>) -> RunOutcome {
        let staging = Staging::create(config.staging_dir.clone()).unwrap();
        let mut orch = CollectionOrchestrator::new(config, transport, staging);
        let outcome = orch.run().await;
        match &outcome {
            RunOutcome::Done { .. } => assert_eq!(orch.state(), RunState::Done),
            RunOutcome::Failed { .. } => assert_eq!(orch.state(), RunState::Failed),
        }
        outcome
    }

    #[tokio::test]
    async fn one_failing_host_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let transport = Arc::new(
            FakeTransport::new(&["coord-0"], &["exec-0", "exec-1"]).failing_on("exec-0"),
        );

        let outcome = run_with(&cfg, transport.clone()).await;
        let RunOutcome::Done { hosts, result } = outcome else {
            panic!("run should complete");
        };

        assert_eq!(hosts.len(), 3);
        assert_eq!(result.host_count(), 3);
        assert_eq!(
            result.succeeded,
            vec![
                Host::new("coord-0", Role::Coordinator),
                Host::new("exec-1", Role::Executor)
            ]
        );
        assert!(result
            .failed
            .contains_key(&Host::new("exec-0", Role::Executor)));

        let err = result.summary_error().unwrap().to_string();
        assert!(err.contains("exec-0"), "{}", err);
        assert!(!err.contains("exec-1"), "{}", err);

        let streamed = dir.path().join("executors/exec-1/diag/uname.txt");
        assert_eq!(
            std::fs::read_to_string(streamed).unwrap().trim(),
            "output from exec-1"
        );
    }

    #[tokio::test]
    async fn succeeded_and_failed_partition_the_resolved_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let transport = Arc::new(
            FakeTransport::new(&["c1", "c2"], &["e1", "e2", "e3"])
                .failing_on("c2")
                .failing_on("e3"),
        );

        let RunOutcome::Done { hosts, result } = run_with(&cfg, transport).await else {
            panic!("run should complete");
        };

        for host in &hosts {
            let in_ok = result.succeeded.contains(host);
            let in_failed = result.failed.contains_key(host);
            assert!(in_ok ^ in_failed, "{} must be in exactly one set", host);
        }
        assert_eq!(result.host_count(), hosts.len());
        assert_eq!(result.failed.len(), 2);
    }

    #[tokio::test]
    async fn empty_selector_fails_before_any_transport_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.executors = "  ".into();
        let transport = Arc::new(FakeTransport::new(&["c1"], &["e1"]));

        let outcome = run_with(&cfg, transport.clone()).await;
        match outcome {
            RunOutcome::Failed { error, partial } => {
                assert!(matches!(error, CollectorError::ConfigValidation(_)));
                assert!(error.to_string().contains("--executors"));
                assert_eq!(partial.host_count(), 0);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn no_hosts_for_a_role_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let transport = Arc::new(FakeTransport::new(&["c1"], &[]));

        match run_with(&cfg, transport.clone()).await {
            RunOutcome::Failed { error, .. } => {
                assert!(matches!(
                    error,
                    CollectorError::NoHostsFound {
                        role: Role::Executor,
                        ..
                    }
                ));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        // discovery only; no per-host work was started
        assert_eq!(transport.op_counts().get("execute"), None);
    }

    #[tokio::test]
    async fn cluster_steps_run_after_hosts_and_see_every_host() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let mut fake = FakeTransport::new(&["c1"], &["e1", "e2"]);
        fake.cluster_failure = Some("pod-logs".into());
        let transport = Arc::new(fake);

        let RunOutcome::Done { result, .. } = run_with(&cfg, transport.clone()).await else {
            panic!("run should complete");
        };
        assert_eq!(transport.cluster_hosts().len(), 3);
        assert!(result.cluster_failures.contains_key("pod-logs"));
        assert!(result.failed.is_empty());
    }

    #[tokio::test]
    async fn per_host_work_never_exceeds_the_worker_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.collection.worker_limit = 2;
        let transport = Arc::new(
            FakeTransport::new(&["c1"], &["e1", "e2", "e3", "e4"])
                .with_call_delay(Duration::from_millis(20)),
        );

        let RunOutcome::Done { result, .. } = run_with(&cfg, transport.clone()).await else {
            panic!("run should complete");
        };
        assert_eq!(result.succeeded.len(), 5);
        assert!(result.failed.is_empty());
        assert_eq!(transport.peak_in_flight(), 2);
    }

    #[tokio::test]
    async fn a_stalled_host_is_recorded_as_timed_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.collection.run_timeout_secs = 1;
        let transport = Arc::new(
            FakeTransport::new(&["c1"], &["e1"]).slow_on("e1", Duration::from_secs(30)),
        );

        let RunOutcome::Done { result, .. } = run_with(&cfg, transport).await else {
            panic!("run should complete");
        };
        assert_eq!(result.succeeded, vec![Host::new("c1", Role::Coordinator)]);
        assert!(matches!(
            result.failed.get(&Host::new("e1", Role::Executor)),
            Some(CollectorError::HostTimedOut(_))
        ));
    }

    #[tokio::test]
    async fn escalated_copies_use_the_sudo_user() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sudo_user = Some("dremio".into());
        let transport = Arc::new(FakeTransport::new(&["c1"], &["e1"]).escalating());

        let staging = Staging::create(dir.path()).unwrap();
        let mut orch = CollectionOrchestrator::new(&cfg, transport.clone(), staging);
        assert_eq!(
            orch.copy_strategy().path(),
            &CopyPath::Escalated {
                sudo_user: "dremio".into()
            }
        );
        orch.run().await;

        let counts = transport.op_counts();
        assert_eq!(counts.get("copy_from"), None);
        assert_eq!(counts.get("copy_from_sudo"), Some(&4));
        assert!(transport
            .log()
            .iter()
            .filter(|l| l.starts_with("copy_from_sudo"))
            .all(|l| l.contains(" dremio ")));
    }

    #[tokio::test]
    async fn plain_copies_never_escalate() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.sudo_user = Some("dremio".into());
        let transport = Arc::new(FakeTransport::new(&["c1"], &["e1"]));

        run_with(&cfg, transport.clone()).await;

        let counts = transport.op_counts();
        assert_eq!(counts.get("copy_from"), Some(&4));
        assert_eq!(counts.get("copy_from_sudo"), None);
        assert_eq!(counts.get("copy_to_sudo"), None);
    }

    #[tokio::test]
    async fn collection_yaml_is_pushed_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        let yaml = dir.path().join("ddc.yaml");
        std::fs::write(&yaml, "log_dir: /var/log/dremio\n").unwrap();
        cfg.collection_yaml = yaml;
        let transport = Arc::new(FakeTransport::new(&["c1"], &["e1"]));

        run_with(&cfg, transport.clone()).await;

        assert!(transport
            .log()
            .contains(&"copy_to c1 /tmp/ddc/ddc.yaml".to_string()));
    }
}
