use ddc_core::config::SshArgs;
use ddc_core::error::CollectorError;
use ddc_core::host::{Host, Selector};
use ddc_core::process::{CommandRunner, OutputSink, SystemRunner};
use ddc_core::transport::{argv, shell_escape, Transport};
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const HELP_TEXT: &str = "Make sure every address passed to --coordinator and --executors is reachable with 'ssh -i <ssh-key> <ssh-user>@<host>'. Pass a comma separated list (10.0.0.20,10.0.0.21) or a last-octet range (10.0.0.20-22).";

/// SSH transport: wraps every command in an `ssh` invocation and copies
/// with `scp`. Hosts are addresses given on the command line.
pub struct SshTransport {
    args: SshArgs,
    runner: Arc<dyn CommandRunner>,
}

impl SshTransport {
    pub fn new(args: SshArgs) -> Self {
        Self::with_runner(args, Arc::new(SystemRunner::new()))
    }

    pub fn with_runner(args: SshArgs, runner: Arc<dyn CommandRunner>) -> Self {
        Self { args, runner }
    }

    fn options(&self) -> Vec<String> {
        argv([
            "-i",
            self.args.key_path.as_str(),
            "-o",
            "LogLevel=error",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "StrictHostKeyChecking=no",
        ])
    }

    fn target(&self, host: &Host) -> String {
        format!("{}@{}", self.args.user, host.identifier)
    }

    /// `ssh <opts> user@host '<arg>' '<arg>' ...`
    fn ssh_command(&self, host: &Host, args: &[String]) -> Vec<String> {
        let remote = args
            .iter()
            .map(|a| shell_escape(a))
            .collect::<Vec<_>>()
            .join(" ");
        let mut cmd = vec!["ssh".to_string()];
        cmd.extend(self.options());
        cmd.push(self.target(host));
        cmd.push(remote);
        cmd
    }

    fn scp_from(&self, host: &Host, source: &str, destination: &Path) -> Vec<String> {
        let mut cmd = argv(["scp", "-r"]);
        cmd.extend(self.options());
        cmd.push(format!("{}:{}", self.target(host), source));
        cmd.push(destination.display().to_string());
        cmd
    }

    fn scp_to(&self, host: &Host, source: &Path, destination: &str) -> Vec<String> {
        let mut cmd = argv(["scp", "-r"]);
        cmd.extend(self.options());
        cmd.push(source.display().to_string());
        cmd.push(format!("{}:{}", self.target(host), destination));
        cmd
    }

    async fn remote_shell(&self, host: &Host, script: String) -> Result<String, CollectorError> {
        self.execute(false, host, &argv(["sh", "-c", script.as_str()]))
            .await
    }
}

fn stage_path() -> String {
    format!("/tmp/ddc-{}", uuid::Uuid::new_v4())
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    fn name(&self) -> &str {
        "ssh"
    }

    async fn execute(
        &self,
        mask: bool,
        host: &Host,
        args: &[String],
    ) -> Result<String, CollectorError> {
        self.runner
            .execute(mask, &self.ssh_command(host, args))
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
            .execute_and_stream(mask, sink, &self.ssh_command(host, args))
            .await
    }

    async fn copy_from_host(
        &self,
        host: &Host,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        self.runner
            .execute(false, &self.scp_from(host, source, destination))
            .await
    }

    /// Copies `source` into a world-readable stage as `sudo_user`, pulls the
    /// stage with scp, then removes it.
    async fn copy_from_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        let stage = stage_path();
        let user = shell_escape(sudo_user);
        debug!("Staging {} on {} through {}", source, host, stage);

        self.remote_shell(
            host,
            format!(
                "sudo -u {user} cp -R {src} {stage} && sudo -u {user} chmod -R a+rX {stage}",
                user = user,
                src = shell_escape(source),
                stage = shell_escape(&stage),
            ),
        )
        .await?;

        let copied = self
            .runner
            .execute(false, &self.scp_from(host, &stage, destination))
            .await;

        let cleanup = format!("sudo -u {} rm -rf {}", user, shell_escape(&stage));
        if let Err(e) = self.remote_shell(host, cleanup).await {
            warn!("unable to remove {} on {}: {}", stage, host, e);
        }
        copied
    }

    async fn copy_to_host(
        &self,
        host: &Host,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        self.runner
            .execute(false, &self.scp_to(host, source, destination))
            .await
    }

    /// Uploads to a stage as the login user, then copies it into place as
    /// `sudo_user` so the service account owns the result.
    async fn copy_to_host_sudo(
        &self,
        host: &Host,
        sudo_user: &str,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        let stage = stage_path();
        self.runner
            .execute(false, &self.scp_to(host, source, &stage))
            .await?;

        self.remote_shell(
            host,
            format!(
                "sudo -u {user} cp -R {stage} {dst}; status=$?; rm -rf {stage}; exit $status",
                user = shell_escape(sudo_user),
                stage = shell_escape(&stage),
                dst = shell_escape(destination),
            ),
        )
        .await
    }

    /// Static passthrough: the selector already names the hosts.
    async fn find_hosts(&self, selector: &Selector) -> Result<Vec<String>, CollectorError> {
        expand_host_list(&selector.raw)
    }

    fn help_text(&self) -> &str {
        HELP_TEXT
    }

    /// The login user is rarely the account the database runs as.
    fn needs_escalated_copy(&self) -> bool {
        true
    }
}

/// Split a comma separated host list, expanding `a.b.c.X-Y` and
/// `a.b.c.X-a.b.c.Y` into every address of the range. Order is kept and
/// duplicates are dropped.
pub fn expand_host_list(raw: &str) -> Result<Vec<String>, CollectorError> {
    let mut hosts: Vec<String> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        for host in expand_entry(entry)? {
            if !hosts.contains(&host) {
                hosts.push(host);
            }
        }
    }
    Ok(hosts)
}

fn expand_entry(entry: &str) -> Result<Vec<String>, CollectorError> {
    let Some((start, end)) = entry.split_once('-') else {
        return Ok(vec![entry.to_string()]);
    };
    // hostnames such as dremio-node-1 are not ranges
    let Ok(first) = start.trim().parse::<Ipv4Addr>() else {
        return Ok(vec![entry.to_string()]);
    };

    let end = end.trim();
    let [a, b, c, from] = first.octets();
    let to = match end.parse::<u8>() {
        Ok(last) => last,
        Err(_) => {
            let last: Ipv4Addr = end.parse().map_err(|_| bad_range(entry))?;
            let [la, lb, lc, ld] = last.octets();
            if (la, lb, lc) != (a, b, c) {
                return Err(bad_range(entry));
            }
            ld
        }
    };
    if to < from {
        return Err(bad_range(entry));
    }
    Ok((from..=to)
        .map(|d| Ipv4Addr::new(a, b, c, d).to_string())
        .collect())
}

fn bad_range(entry: &str) -> CollectorError {
    CollectorError::ConfigValidation(format!(
        "'{}' is not a valid address range, use the form 10.0.0.20-22 or 10.0.0.20-10.0.0.22",
        entry
    ))
}
