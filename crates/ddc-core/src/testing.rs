//! Recording doubles for `CommandRunner` and `Transport`, shared by the
//! backend crates' tests.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::CollectorError;
use crate::host::{Host, Role, Selector};
use crate::process::{CommandRunner, OutputSink};
use crate::transport::Transport;

/// Replays scripted responses in order and records every argument vector.
/// Once the script is exhausted every call succeeds with empty output.
#[derive(Default)]
pub struct MockRunner {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<String>>>,
    masks: Mutex<Vec<bool>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, &'static str>>,
    {
        let runner = Self::new();
        for r in responses {
            runner.push(r.map(String::from).map_err(String::from));
        }
        runner
    }

    pub fn push(&self, response: Result<String, String>) {
        lock(&self.responses).push_back(response);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.calls).clone()
    }

    pub fn masks(&self) -> Vec<bool> {
        lock(&self.masks).clone()
    }

    fn next(&self, mask: bool, args: &[String]) -> Result<String, CollectorError> {
        lock(&self.calls).push(args.to_vec());
        lock(&self.masks).push(mask);
        match lock(&self.responses).pop_front() {
            Some(Ok(out)) => Ok(out),
            Some(Err(e)) => Err(CollectorError::Transport(e)),
            None => Ok(String::new()),
        }
    }
}

#[async_trait::async_trait]
impl CommandRunner for MockRunner {
    async fn execute(&self, mask: bool, args: &[String]) -> Result<String, CollectorError> {
        self.next(mask, args)
    }

    async fn execute_and_stream(
        &self,
        mask: bool,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError> {
        let out = self.next(mask, args)?;
        for line in out.lines() {
            sink.write_line(line)?;
        }
        Ok(())
    }
}

/// In-memory transport: discovery returns fixed names per role, chosen
/// hosts fail every call, and every call is counted.
#[derive(Default)]
pub struct FakeTransport {
    pub coordinators: Vec<String>,
    pub executors: Vec<String>,
    pub failing: BTreeSet<String>,
    pub slow: BTreeSet<String>,
    pub slow_delay: Duration,
    pub escalate: bool,
    pub cluster_failure: Option<String>,
    pub call_delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    log: Mutex<Vec<String>>,
    cluster_hosts: Mutex<Vec<Host>>,
}

impl FakeTransport {
    pub fn new(coordinators: &[&str], executors: &[&str]) -> Self {
        Self {
            coordinators: coordinators.iter().map(|s| s.to_string()).collect(),
            executors: executors.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, host: &str) -> Self {
        self.failing.insert(host.to_string());
        self
    }

    pub fn slow_on(mut self, host: &str, delay: Duration) -> Self {
        self.slow.insert(host.to_string());
        self.slow_delay = delay;
        self
    }

    /// Every host call takes `delay`, so concurrent hosts overlap.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    /// Most host calls ever running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every recorded call as `"<op> <host>[ <detail>]"`.
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    pub fn cluster_hosts(&self) -> Vec<Host> {
        lock(&self.cluster_hosts).clone()
    }

    /// Count of calls per operation name.
    pub fn op_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for entry in self.log() {
            let op = entry.split_whitespace().next().unwrap_or_default().to_string();
            *counts.entry(op).or_insert(0) += 1;
        }
        counts
    }

    async fn touch(&self, op: &str, host: &Host, detail: &str) -> Result<(), CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let entry = if detail.is_empty() {
            format!("{} {}", op, host.identifier)
        } else {
            format!("{} {} {}", op, host.identifier, detail)
        };
        lock(&self.log).push(entry);

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.slow.contains(&host.identifier) {
            tokio::time::sleep(self.slow_delay).await;
        }
        if self.failing.contains(&host.identifier) {
            return Err(CollectorError::Transport(format!(
                "connection to {} refused",
                host.identifier
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn execute(
        &self,
        _mask: bool,
        host: &Host,
        args: &[String],
    ) -> Result<String, CollectorError> {
        self.touch("execute", host, &args.join(" ")).await?;
        Ok(String::new())
    }

    async fn execute_and_stream(
        &self,
        _mask: bool,
        host: &Host,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError> {
        self.touch("stream", host, &args.join(" ")).await?;
        sink.write_line(&format!("output from {}", host.identifier))?;
        Ok(())
    }

    async fn copy_from_host(
        &self,
        host: &Host,
        source: &str,
        _destination: &Path,
    ) -> Result<String, CollectorError> {
        self.touch("copy_from", host, source).await?;
        Ok(String::new())
    }

    async fn copy_from_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        source: &str,
        _destination: &Path,
    ) -> Result<String, CollectorError> {
        self.touch("copy_from_sudo", host, &format!("{} {}", sudo_user, source))
            .await?;
        Ok(String::new())
    }

    async fn copy_to_host(
        &self,
        host: &Host,
        _source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        self.touch("copy_to", host, destination).await?;
        Ok(String::new())
    }

    async fn copy_to_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        _source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        self.touch("copy_to_sudo", host, &format!("{} {}", sudo_user, destination))
            .await?;
        Ok(String::new())
    }

    async fn find_hosts(&self, selector: &Selector) -> Result<Vec<String>, CollectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.log).push(format!("find_hosts {}", selector.raw));
        Ok(match selector.role {
            Role::Coordinator => self.coordinators.clone(),
            Role::Executor => self.executors.clone(),
        })
    }

    fn help_text(&self) -> &str {
        "fake transport"
    }

    fn needs_escalated_copy(&self) -> bool {
        self.escalate
    }

    async fn collect_cluster(
        &self,
        hosts: &[Host],
        _out_dir: &Path,
    ) -> Vec<(String, CollectorError)> {
        lock(&self.cluster_hosts).extend(hosts.iter().cloned());
        match &self.cluster_failure {
            Some(step) => vec![(
                step.clone(),
                CollectorError::Transport(format!("{} unavailable", step)),
            )],
            None => Vec::new(),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
