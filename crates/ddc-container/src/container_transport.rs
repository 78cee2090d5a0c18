use ddc_core::config::DockerArgs;
use ddc_core::error::CollectorError;
use ddc_core::host::{Host, Role, Selector};
use ddc_core::process::{CommandRunner, OutputSink, SystemRunner};
use ddc_core::transport::{argv, Transport};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Owner applied to files pushed into a container.
pub const SERVICE_OWNER: &str = "dremio:dremio";

const HELP_TEXT: &str = "Make sure the names you use actually correspond to your dremio containers: try something like 'ddc --mode docker --docker-path docker --coordinator localdremioincontainer --executors localdremioincontainer-executor'. You can also run 'docker ps' to see what containers are available to use for your dremio containers";

/// Container transport: hosts are container names, commands run through
/// `<runtime> exec` and files move with `<runtime> cp`.
///
/// There is no sudo inside the containers, so the sudo copy variants take
/// the plain path. Copies into a container are followed by a `chown` run as
/// root so the service account owns them.
pub struct ContainerTransport {
    runtime: String,
    runner: Arc<dyn CommandRunner>,
}

impl ContainerTransport {
    pub fn new(args: DockerArgs) -> Self {
        Self::with_runner(args, Arc::new(SystemRunner::new()))
    }

    pub fn with_runner(args: DockerArgs, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runtime: args.docker_path,
            runner,
        }
    }

    fn exec_command(&self, host: &Host, args: &[String]) -> Vec<String> {
        let mut cmd = argv([self.runtime.as_str(), "exec", host.identifier.as_str()]);
        cmd.extend(args.iter().cloned());
        cmd
    }
}

#[async_trait::async_trait]
impl Transport for ContainerTransport {
    fn name(&self) -> &str {
        "docker"
    }

    async fn execute(
        &self,
        mask: bool,
        host: &Host,
        args: &[String],
    ) -> Result<String, CollectorError> {
        self.runner
            .execute(mask, &self.exec_command(host, args))
            .await
    }

    async fn execute_and_stream(
        &self,
        mask: bool,
        host: &Host,
        sink: &mut dyn OutputSink,
        args: &[String],
    ) -> Result<(), CollectorError> {
        self.runner
            .execute_and_stream(mask, sink, &self.exec_command(host, args))
            .await
    }

    async fn copy_from_host(
        &self,
        host: &Host,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        let src = format!("{}:{}", host.identifier, source);
        let dst = destination.display().to_string();
        self.runner
            .execute(
                false,
                &argv([self.runtime.as_str(), "cp", src.as_str(), dst.as_str()]),
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
        let src = source.display().to_string();
        let dst = format!("{}:{}", host.identifier, destination);
        self.runner
            .execute(
                false,
                &argv([self.runtime.as_str(), "cp", src.as_str(), dst.as_str()]),
            )
            .await?;

        self.runner
            .execute(
                false,
                &argv([
                    self.runtime.as_str(),
                    "exec",
                    "--user",
                    "root",
                    host.identifier.as_str(),
                    "chown",
                    SERVICE_OWNER,
                    destination,
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

    /// `ps --filter name=<term>`. A coordinator name is often a prefix of the
    /// executor names (`dremio` vs `dremio-executor`), so names are kept only
    /// when containing "executor" agrees with the requested role.
    async fn find_hosts(&self, selector: &Selector) -> Result<Vec<String>, CollectorError> {
        let filter = format!("name={}", selector.raw.trim());
        let out = self
            .runner
            .execute(
                false,
                &argv([
                    self.runtime.as_str(),
                    "ps",
                    "--filter",
                    filter.as_str(),
                    "--format",
                    "'{{.Names}}'",
                ]),
            )
            .await?;

        let want_executor = selector.role == Role::Executor;
        let containers: Vec<String> = out
            .lines()
            .map(|l| l.trim().trim_matches('\''))
            .filter(|name| !name.is_empty())
            .filter(|name| name.contains("executor") == want_executor)
            .map(String::from)
            .collect();
        debug!("{} {} container(s) matched '{}'", containers.len(), selector.role, selector.raw);
        Ok(containers)
    }

    fn help_text(&self) -> &str {
        HELP_TEXT
    }
}
