use std::path::Path;

use crate::error::CollectorError;
use crate::host::{Host, Selector};
use crate::process::OutputSink;

/// Failure of one cluster-wide step, keyed by the step's name.
pub type ClusterStepFailure = (String, CollectorError);

/// Remote execution and file transfer against cluster nodes.
/// Every backend (ssh, docker, kubectl) implements this; the orchestrator
/// only ever sees `dyn Transport`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Backend name ("ssh", "docker", "kubernetes").
    fn name(&self) -> &str;

    /// Run a command on the host and return its combined output.
    async fn execute(
        &self,
        mask: bool,
        host: &Host,
        args: &[String],
    ) -> Result<String, CollectorError>;

    /// Run a command on the host, delivering output to `sink` as it arrives.
    async fn execute_and_stream(
        &self,
        mask: bool,
        host: &Host,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError>;

    async fn copy_from_host(
        &self,
        host: &Host,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError>;

    /// Copy off the host, reading `source` as `sudo_user`.
    async fn copy_from_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError>;

    async fn copy_to_host(
        &self,
        host: &Host,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError>;

    /// Copy onto the host so that `destination` ends up owned by `sudo_user`.
    async fn copy_to_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError>;

    /// Backend-specific discovery of host identifiers for the selector's role.
    async fn find_hosts(&self, selector: &Selector) -> Result<Vec<String>, CollectorError>;

    /// Guidance shown when resolution or validation fails.
    fn help_text(&self) -> &str;

    /// Whether the backend writes as a different account than the remote
    /// service runs as, so copies must go through the sudo variants.
    fn needs_escalated_copy(&self) -> bool {
        false
    }

    /// Steps that are not tied to one host. Runs after every host has finished.
    async fn collect_cluster(&self, _hosts: &[Host], _out_dir: &Path) -> Vec<ClusterStepFailure> {
        Vec::new()
    }
}

/// Shell-escape a string for safe use in remote commands.
pub fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Build an owned argument vector from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_escape_quotes_single_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
        assert_eq!(shell_escape("ps -ef"), "'ps -ef'");
    }
}
