use ddc_core::config::KubeArgs;
use ddc_core::error::CollectorError;
use ddc_core::host::{Host, Selector};
use ddc_core::process::{CommandRunner, FileSink, OutputSink, SystemRunner};
use ddc_core::transport::{argv, ClusterStepFailure, Transport};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Namespaced resources dumped as YAML by the cluster-wide step.
pub const CLUSTER_RESOURCES: &[&str] = &[
    "pods",
    "services",
    "endpoints",
    "statefulsets",
    "deployments",
    "daemonsets",
    "replicasets",
    "configmaps",
    "persistentvolumeclaims",
    "events",
];

const HELP_TEXT: &str = "Make sure the labels and namespace you use actually correspond to your dremio pods: try something like 'ddc --mode kubernetes -n mynamespace --coordinator app=dremio-coordinator --executors app=dremio-executor'. You can also run 'kubectl get pods --show-labels' to see what labels are available to use for your dremio pods";

/// Kubernetes transport: hosts are pod names, commands run through
/// `kubectl exec` in the pod's dremio container.
///
/// Commands already run as the container's service account, so the sudo
/// copy variants take the plain path.
pub struct KubectlTransport {
    args: KubeArgs,
    runner: Arc<dyn CommandRunner>,
    containers: Mutex<HashMap<String, String>>,
}

impl KubectlTransport {
    pub fn new(args: KubeArgs) -> Self {
        Self::with_runner(args, Arc::new(SystemRunner::new()))
    }

    pub fn with_runner(args: KubeArgs, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            args,
            runner,
            containers: Mutex::new(HashMap::new()),
        }
    }

    fn kubectl(&self) -> &str {
        &self.args.kubectl_path
    }

    fn namespace(&self) -> &str {
        &self.args.namespace
    }

    /// First configured container name for the host's role that the pod runs.
    /// Falls back to the first configured name when the pod cannot be inspected.
    async fn container_for(&self, host: &Host) -> String {
        if let Some(name) = self.cached_container(&host.identifier) {
            return name;
        }

        let wanted = self.args.containers_for(host.role);
        let fallback = wanted.first().cloned().unwrap_or_default();
        let lookup = self
            .runner
            .execute(
                false,
                &argv([
                    self.kubectl(),
                    "get",
                    "pod",
                    host.identifier.as_str(),
                    "-n",
                    self.namespace(),
                    "-o",
                    "jsonpath={.spec.containers[*].name}",
                ]),
            )
            .await;

        let chosen = match lookup {
            Ok(out) => {
                let running: Vec<&str> = out.split_whitespace().collect();
                wanted
                    .iter()
                    .find(|w| running.contains(&w.as_str()))
                    .cloned()
                    .unwrap_or(fallback)
            }
            Err(e) => {
                debug!("unable to list containers of {}: {}", host, e);
                fallback
            }
        };

        self.containers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(host.identifier.clone(), chosen.clone());
        chosen
    }

    fn cached_container(&self, pod: &str) -> Option<String> {
        self.containers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(pod)
            .cloned()
    }

    async fn exec_command(&self, host: &Host, args: &[String]) -> Vec<String> {
        let container = self.container_for(host).await;
        let mut cmd = argv([
            self.kubectl(),
            "exec",
            "-n",
            self.namespace(),
            "-c",
            container.as_str(),
            host.identifier.as_str(),
            "--",
        ]);
        cmd.extend(args.iter().cloned());
        cmd
    }

    async fn dump_to_file(&self, args: Vec<String>, path: &Path) -> Result<(), CollectorError> {
        let mut sink = FileSink::create(path)?;
        self.runner.execute_and_stream(false, &mut sink, &args).await?;
        sink.finish()?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for KubectlTransport {
    fn name(&self) -> &str {
        "kubernetes"
    }

    async fn execute(
        &self,
        mask: bool,
        host: &Host,
        args: &[String],
    ) -> Result<String, CollectorError> {
        let cmd = self.exec_command(host, args).await;
        self.runner.execute(mask, &cmd).await
    }

    async fn execute_and_stream(
        &self,
        mask: bool,
        host: &Host,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError> {
        let cmd = self.exec_command(host, args).await;
        self.runner.execute_and_stream(mask, sink, &cmd).await
    }

    async fn copy_from_host(
        &self,
        host: &Host,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        let container = self.container_for(host).await;
        let src = format!("{}:{}", host.identifier, source);
        let dst = destination.display().to_string();
        self.runner
            .execute(
                false,
                &argv([
                    self.kubectl(),
                    "cp",
                    "-n",
                    self.namespace(),
                    "-c",
                    container.as_str(),
                    src.as_str(),
                    dst.as_str(),
                ]),
            )
            .await
    }

    async fn copy_from_host_sudo(
        &self,
        host: &Host,
        _sudo_user: &str,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        self.copy_from_host(host, source, destination).await
    }

    async fn copy_to_host(
        &self,
        host: &Host,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        let container = self.container_for(host).await;
        let src = source.display().to_string();
        let dst = format!("{}:{}", host.identifier, destination);
        self.runner
            .execute(
                false,
                &argv([
                    self.kubectl(),
                    "cp",
                    "-n",
                    self.namespace(),
                    "-c",
                    container.as_str(),
                    src.as_str(),
                    dst.as_str(),
                ]),
            )
            .await
    }

    async fn copy_to_host_sudo(
        &self,
        host: &Host,
        _sudo_user: &str,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        self.copy_to_host(host, source, destination).await
    }

    /// Label match: `kubectl get pods -l <selector> -o name`.
    async fn find_hosts(&self, selector: &Selector) -> Result<Vec<String>, CollectorError> {
        let out = self
            .runner
            .execute(
                false,
                &argv([
                    self.kubectl(),
                    "get",
                    "pods",
                    "-n",
                    self.namespace(),
                    "-l",
                    selector.raw.trim(),
                    "-o",
                    "name",
                ]),
            )
            .await?;

        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.trim_start_matches("pod/").to_string())
            .collect())
    }

    fn help_text(&self) -> &str {
        HELP_TEXT
    }

    /// Namespace resource dumps and per-pod logs.
    async fn collect_cluster(&self, hosts: &[Host], out_dir: &Path) -> Vec<ClusterStepFailure> {
        let mut failures = Vec::new();
        info!("Collecting cluster information from namespace {}", self.namespace());

        for resource in CLUSTER_RESOURCES.iter().copied() {
            let step = format!("get {}", resource);
            let args = argv([
                self.kubectl(),
                "get",
                resource,
                "-n",
                self.namespace(),
                "-o",
                "yaml",
            ]);
            let path = out_dir.join(format!("{}.yaml", resource));
            if let Err(e) = self.dump_to_file(args, &path).await {
                failures.push((step, e));
            }
        }

        let logs_dir = out_dir.join("logs");
        for host in hosts {
            let step = format!("logs {}", host.identifier);
            let args = argv([
                self.kubectl(),
                "logs",
                "-n",
                self.namespace(),
                host.identifier.as_str(),
                "--all-containers",
            ]);
            let path = logs_dir.join(format!("{}.log", host.dir_name()));
            if let Err(e) = self.dump_to_file(args, &path).await {
                failures.push((step, e));
            }
        }

        failures
    }
}
