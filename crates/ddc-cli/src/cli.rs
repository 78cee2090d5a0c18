use clap::Parser;
use ddc_core::config::{
    default_collection_yaml_path, default_ssh_key, split_list, CollectionConfig, Config,
    DockerArgs, KubeArgs, SshArgs, TransportMode,
};
use ddc_core::CollectorError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddc")]
#[command(version)]
#[command(about = "Collect logs, configuration and diagnostics from a Dremio cluster", long_about = None)]
pub struct Cli {
    /// Transport: ssh (s), kubernetes (k) or docker (d)
    #[arg(short, long, default_value = "ssh")]
    pub mode: String,

    /// Coordinators: comma separated hosts or ranges for ssh, a label for kubernetes, a name filter for docker
    #[arg(short, long, default_value = "")]
    pub coordinator: String,

    /// Executors: comma separated hosts or ranges for ssh, a label for kubernetes, a name filter for docker
    #[arg(short, long, default_value = "")]
    pub executors: String,

    /// SSH private key (defaults to ~/.ssh/id_rsa)
    #[arg(short = 's', long)]
    pub ssh_key: Option<String>,

    /// User to log in with over ssh
    #[arg(short = 'u', long, default_value = "")]
    pub ssh_user: String,

    /// Namespace of the kubernetes pods
    #[arg(short, long, default_value = "default")]
    pub namespace: String,

    /// Where to find kubectl
    #[arg(short = 'p', long, default_value = "kubectl")]
    pub kubectl_path: String,

    /// Where to find docker (or podman)
    #[arg(short = 'd', long, default_value = "docker")]
    pub docker_path: String,

    /// User to copy files as when the ssh user cannot read them
    #[arg(short = 'b', long)]
    pub sudo_user: Option<String>,

    /// Directory on each host used to exchange files
    #[arg(long, default_value = "/tmp/ddc")]
    pub transfer_dir: String,

    /// Local directory collected files are staged in before archiving
    #[arg(long, default_value = "ddc-staging")]
    pub staging_dir: PathBuf,

    /// Archive to write the collection to
    #[arg(long, default_value = "diag.zip")]
    pub output_file: PathBuf,

    /// Collection YAML pushed to every host (defaults to ddc.yaml next to the executable)
    #[arg(long)]
    pub ddc_yaml: Option<PathBuf>,

    /// Kubernetes container names to try on coordinator pods
    #[arg(long, default_value = "dremio-master-coordinator,dremio-coordinator")]
    pub coordinator_container: String,

    /// Kubernetes container names to try on executor pods
    #[arg(long, default_value = "dremio-executor")]
    pub executors_container: String,

    /// Prompt for a Dremio personal access token to export system tables
    #[arg(short = 't', long)]
    pub dremio_pat_prompt: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Build the run configuration. The collection YAML is read here and
    /// nowhere else; a missing file yields the defaults.
    pub fn into_config(self) -> Result<Config, CollectorError> {
        let collection_yaml = self.ddc_yaml.unwrap_or_else(default_collection_yaml_path);
        let collection = CollectionConfig::load_or_default(&collection_yaml)?;
        collection.log_keys(&collection_yaml);

        Ok(Config {
            mode: TransportMode::parse(&self.mode),
            coordinator: self.coordinator,
            executors: self.executors,
            ssh: SshArgs {
                key_path: self.ssh_key.unwrap_or_else(default_ssh_key),
                user: self.ssh_user,
            },
            kube: KubeArgs {
                namespace: self.namespace,
                kubectl_path: self.kubectl_path,
                coordinator_containers: split_list(&self.coordinator_container),
                executor_containers: split_list(&self.executors_container),
            },
            docker: DockerArgs {
                docker_path: self.docker_path,
            },
            sudo_user: self.sudo_user.filter(|u| !u.trim().is_empty()),
            transfer_dir: self.transfer_dir,
            staging_dir: self.staging_dir,
            output_file: self.output_file,
            collection_yaml,
            collection,
            dremio_pat: None,
        })
    }
}
