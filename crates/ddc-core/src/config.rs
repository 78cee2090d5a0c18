use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::CollectorError;
use crate::host::{Role, Selector};
use crate::secret::{Secret, REDACTED};

/// Name of the collection settings file looked up next to the executable.
pub const COLLECTION_YAML: &str = "ddc.yaml";

/// Transport used to reach the cluster nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Ssh,
    Kubernetes,
    Docker,
}

impl TransportMode {
    /// Accepts both the long and the one-letter aliases, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ssh" | "s" => Some(Self::Ssh),
            "kubernetes" | "k" => Some(Self::Kubernetes),
            "docker" | "d" => Some(Self::Docker),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Ssh => write!(f, "ssh"),
            TransportMode::Kubernetes => write!(f, "kubernetes"),
            TransportMode::Docker => write!(f, "docker"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SshArgs {
    pub key_path: String,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct KubeArgs {
    pub namespace: String,
    pub kubectl_path: String,
    pub coordinator_containers: Vec<String>,
    pub executor_containers: Vec<String>,
}

impl Default for KubeArgs {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            kubectl_path: "kubectl".to_string(),
            coordinator_containers: split_list("dremio-master-coordinator,dremio-coordinator"),
            executor_containers: split_list("dremio-executor"),
        }
    }
}

impl KubeArgs {
    pub fn containers_for(&self, role: Role) -> &[String] {
        match role {
            Role::Coordinator => &self.coordinator_containers,
            Role::Executor => &self.executor_containers,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DockerArgs {
    pub docker_path: String,
}

impl Default for DockerArgs {
    fn default() -> Self {
        Self {
            docker_path: "docker".to_string(),
        }
    }
}

/// Settings read from the collection YAML. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_conf_dir")]
    pub conf_dir: String,
    #[serde(default = "default_diagnostic_commands")]
    pub diagnostic_commands: BTreeMap<String, String>,
    #[serde(default = "default_system_tables")]
    pub system_tables: Vec<String>,
    #[serde(default = "default_row_limit")]
    pub row_limit: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_poll_wait_secs")]
    pub max_poll_wait_secs: u64,
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    #[serde(default = "default_dremio_endpoint")]
    pub dremio_endpoint: String,
    #[serde(default)]
    pub dremio_pat_token: Option<Secret>,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            conf_dir: default_conf_dir(),
            diagnostic_commands: default_diagnostic_commands(),
            system_tables: default_system_tables(),
            row_limit: default_row_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_wait_secs: default_max_poll_wait_secs(),
            worker_limit: default_worker_limit(),
            run_timeout_secs: default_run_timeout_secs(),
            dremio_endpoint: default_dremio_endpoint(),
            dremio_pat_token: None,
        }
    }
}

fn default_log_dir() -> String {
    "/var/log/dremio".to_string()
}

fn default_conf_dir() -> String {
    "/opt/dremio/conf".to_string()
}

fn default_diagnostic_commands() -> BTreeMap<String, String> {
    [
        ("ps", "ps -eo pid,ppid,user,%cpu,%mem,rss,etime,args"),
        ("df", "df -h"),
        ("free", "free -m"),
        ("uname", "uname -a"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_system_tables() -> Vec<String> {
    [
        "\\\"tables\\\"",
        "boot",
        "fragments",
        "jobs",
        "materializations",
        "membership",
        "memory",
        "nodes",
        "options",
        "privileges",
        "reflection_dependencies",
        "reflections",
        "refreshes",
        "roles",
        "services",
        "slicing_threads",
        "table_statistics",
        "threads",
        "version",
        "views",
        "cache.datasets",
        "cache.mount_points",
        "cache.storage_plugins",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_row_limit() -> u64 {
    100_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_max_poll_wait_secs() -> u64 {
    300
}

fn default_worker_limit() -> usize {
    4
}

fn default_run_timeout_secs() -> u64 {
    1800
}

fn default_dremio_endpoint() -> String {
    "http://localhost:9047".to_string()
}

impl CollectionConfig {
    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, CollectorError> {
        let contents = std::fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CollectionConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, CollectorError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Log every parsed key. The token value is never printed.
    pub fn log_keys(&self, source: &Path) {
        info!("parsed configuration for {} follows", source.display());
        info!("yaml key 'log_dir':'{}'", self.log_dir);
        info!("yaml key 'conf_dir':'{}'", self.conf_dir);
        for (name, cmd) in &self.diagnostic_commands {
            info!("yaml key 'diagnostic_commands.{}':'{}'", name, cmd);
        }
        info!("yaml key 'system_tables':'{}'", self.system_tables.join(","));
        info!("yaml key 'row_limit':'{}'", self.row_limit);
        info!("yaml key 'poll_interval_ms':'{}'", self.poll_interval_ms);
        info!("yaml key 'max_poll_wait_secs':'{}'", self.max_poll_wait_secs);
        info!("yaml key 'worker_limit':'{}'", self.worker_limit);
        info!("yaml key 'run_timeout_secs':'{}'", self.run_timeout_secs);
        info!("yaml key 'dremio_endpoint':'{}'", self.dremio_endpoint);
        if self.dremio_pat_token.as_ref().is_some_and(|t| !t.is_empty()) {
            info!("yaml key 'dremio_pat_token':'{}'", REDACTED);
        }
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            row_limit: self.row_limit,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_secs(self.max_poll_wait_secs),
        }
    }
}

/// Knobs for the system-table export poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSettings {
    pub row_limit: u64,
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        CollectionConfig::default().export_settings()
    }
}

/// Run configuration, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// `None` when the mode flag did not name a known transport.
    pub mode: Option<TransportMode>,
    pub coordinator: String,
    pub executors: String,
    pub ssh: SshArgs,
    pub kube: KubeArgs,
    pub docker: DockerArgs,
    pub sudo_user: Option<String>,
    pub transfer_dir: String,
    pub staging_dir: PathBuf,
    pub output_file: PathBuf,
    /// Collection YAML pushed to each host when it exists locally.
    pub collection_yaml: PathBuf,
    pub collection: CollectionConfig,
    pub dremio_pat: Option<Secret>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Some(TransportMode::Ssh),
            coordinator: String::new(),
            executors: String::new(),
            ssh: SshArgs::default(),
            kube: KubeArgs::default(),
            docker: DockerArgs::default(),
            sudo_user: None,
            transfer_dir: "/tmp/ddc".to_string(),
            staging_dir: PathBuf::from("ddc-staging"),
            output_file: PathBuf::from("diag.zip"),
            collection_yaml: default_collection_yaml_path(),
            collection: CollectionConfig::default(),
            dremio_pat: None,
        }
    }
}

impl Config {
    pub fn selector(&self, role: Role) -> Selector {
        match role {
            Role::Coordinator => Selector::new(self.coordinator.clone(), role),
            Role::Executor => Selector::new(self.executors.clone(), role),
        }
    }

    /// PAT from the prompt wins over one configured in the YAML.
    pub fn pat(&self) -> Option<&Secret> {
        self.dremio_pat
            .as_ref()
            .or(self.collection.dremio_pat_token.as_ref())
            .filter(|s| !s.is_empty())
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.collection.run_timeout_secs)
    }

    /// Offline checks run before any process or network call.
    pub fn validate(&self) -> Result<TransportMode, CollectorError> {
        let mode = self.mode.ok_or_else(|| {
            invalid(
                "the mode is not correctly set, use \"k\" or \"kubernetes\", \"d\" or \"docker\", \"s\" or \"ssh\"",
            )
        })?;

        if self.coordinator.trim().is_empty() {
            return Err(invalid(match mode {
                TransportMode::Ssh => "the coordinator string was empty you must pass a single host or a comma separated lists of hosts to --coordinator or -c arguments. Example: -c 192.168.64.12,192.168.65.10",
                TransportMode::Kubernetes => "the coordinator string was empty you must pass a label that will match your coordinators --coordinator or -c arguments. Example: -c \"mylabel=coordinator\"",
                TransportMode::Docker => "the coordinator string was empty you must pass a label that will match your coordinators container name --coordinator or -c arguments. Example: -c \"coordinator\"",
            }));
        }

        if self.executors.trim().is_empty() {
            return Err(invalid(match mode {
                TransportMode::Ssh => "the executor string was empty you must pass a single host or a comma separated lists of hosts to --executors or -e arguments. Example: -e 192.168.64.12,192.168.65.10",
                TransportMode::Kubernetes => "the executor string was empty you must pass a label that will match your executors --executors or -e arguments. Example: -e \"mylabel=executor\"",
                TransportMode::Docker => "the executor string was empty you must pass a label that will match your executors container --executors or -e arguments. Example: -e \"executor\"",
            }));
        }

        if mode == TransportMode::Ssh {
            if self.ssh.key_path.trim().is_empty() {
                return Err(invalid("the ssh private key location was empty, pass --ssh-key or -s with the key to get past this error. Example --ssh-key ~/.ssh/id_rsa"));
            }
            if self.ssh.user.trim().is_empty() {
                return Err(invalid("the ssh user was empty, pass --ssh-user or -u with the user name you want to use to get past this error. Example --ssh-user ubuntu"));
            }
        }

        if self.collection.worker_limit == 0 {
            return Err(invalid("worker_limit in the collection yaml must be at least 1"));
        }
        if self.collection.row_limit == 0 {
            return Err(invalid("row_limit in the collection yaml must be at least 1"));
        }

        Ok(mode)
    }
}

fn invalid(msg: &str) -> CollectorError {
    CollectorError::ConfigValidation(msg.to_string())
}

/// Split a comma separated flag value, dropping blanks.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// `<dir of the running executable>/ddc.yaml`, or `<config dir>/ddc/ddc.yaml`
/// when the executable path cannot be resolved.
pub fn default_collection_yaml_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.join(COLLECTION_YAML)))
        .unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("/etc"))
                .join("ddc")
                .join(COLLECTION_YAML)
        })
}

/// `~/.ssh/id_rsa`, or empty when the home dir is unknown (validation reports it).
pub fn default_ssh_key() -> String {
    dirs::home_dir()
        .map(|h| h.join(".ssh").join("id_rsa").display().to_string())
        .unwrap_or_default()
}
