use std::path::PathBuf;
use tracing::{debug, info};

use crate::config::Config;
use crate::copy::{CopyPath, CopyStrategy};
use crate::error::CollectorError;
use crate::host::{path_safe, Host};
use crate::process::FileSink;
use crate::staging::Staging;
use crate::transport::{argv, Transport};

/// One unit of work on a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionStep {
    /// `mkdir -p` on the host.
    MakeDir { path: String },
    /// Local file pushed to the host.
    Push { source: PathBuf, destination: String },
    /// Remote file or directory pulled into the staging tree.
    Pull { source: String, destination: PathBuf },
    /// Command whose output is streamed into a staging file.
    Stream {
        name: String,
        command: String,
        destination: PathBuf,
    },
}

impl CollectionStep {
    pub fn label(&self) -> String {
        match self {
            CollectionStep::MakeDir { path } => format!("mkdir {}", path),
            CollectionStep::Push { destination, .. } => format!("push {}", destination),
            CollectionStep::Pull { source, .. } => format!("pull {}", source),
            CollectionStep::Stream { name, .. } => format!("diagnostic '{}'", name),
        }
    }
}

/// The transfer dir is written into by escalated pushes, so it must be
/// owned by the same account that does the pushing.
fn make_dir_command(copy: &CopyStrategy, path: &str) -> Vec<String> {
    match copy.path() {
        CopyPath::Plain => argv(["mkdir", "-p", path]),
        CopyPath::Escalated { sudo_user } => {
            argv(["sudo", "-u", sudo_user.as_str(), "mkdir", "-p", path])
        }
    }
}

/// Steps for a single host, run in order. Never shared between hosts.
#[derive(Debug, Clone)]
pub struct CollectionTask {
    pub host: Host,
    pub steps: Vec<CollectionStep>,
}

impl CollectionTask {
    /// The standard plan: transfer dir, collection yaml, logs, conf, diagnostics.
    pub fn plan(host: Host, config: &Config, staging: &Staging) -> Self {
        let host_dir = staging.host_dir(&host);
        let transfer_dir = config.transfer_dir.trim_end_matches('/').to_string();
        let mut steps = vec![CollectionStep::MakeDir {
            path: transfer_dir.clone(),
        }];

        if config.collection_yaml.is_file() {
            steps.push(CollectionStep::Push {
                source: config.collection_yaml.clone(),
                destination: format!("{}/{}", transfer_dir, crate::config::COLLECTION_YAML),
            });
        }

        steps.push(CollectionStep::Pull {
            source: config.collection.log_dir.clone(),
            destination: host_dir.join("logs"),
        });
        steps.push(CollectionStep::Pull {
            source: config.collection.conf_dir.clone(),
            destination: host_dir.join("conf"),
        });

        for (name, command) in &config.collection.diagnostic_commands {
            steps.push(CollectionStep::Stream {
                name: name.clone(),
                command: command.clone(),
                destination: host_dir
                    .join("diag")
                    .join(format!("{}.txt", path_safe(name))),
            });
        }

        Self { host, steps }
    }

    /// Run every step in order; the first failure fails the task.
    pub async fn run(
        &self,
        transport: &dyn Transport,
        copy: &CopyStrategy,
    ) -> Result<(), CollectorError> {
        for step in &self.steps {
            debug!("{}: {}", self.host, step.label());
            self.run_step(transport, copy, step)
                .await
                .map_err(|e| CollectorError::Transport(format!("{} failed: {}", step.label(), e)))?;
        }
        info!("Collection finished on {}", self.host);
        Ok(())
    }

    async fn run_step(
        &self,
        transport: &dyn Transport,
        copy: &CopyStrategy,
        step: &CollectionStep,
    ) -> Result<(), CollectorError> {
        match step {
            CollectionStep::MakeDir { path } => {
                transport
                    .execute(false, &self.host, &make_dir_command(copy, path))
                    .await?;
            }
            CollectionStep::Push {
                source,
                destination,
            } => {
                copy.copy_to(transport, &self.host, source, destination)
                    .await?;
            }
            CollectionStep::Pull {
                source,
                destination,
            } => {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                copy.copy_from(transport, &self.host, source, destination)
                    .await?;
            }
            CollectionStep::Stream {
                command,
                destination,
                ..
            } => {
                let mut sink = FileSink::create(destination)?;
                transport
                    .execute_and_stream(
                        false,
                        &self.host,
                        &mut sink,
                        &argv(["sh", "-c", command.as_str()]),
                    )
                    .await?;
                sink.finish()?;
            }
        }
        Ok(())
    }
}
