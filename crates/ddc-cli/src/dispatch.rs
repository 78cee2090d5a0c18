use ddc_container::ContainerTransport;
use ddc_core::config::{Config, TransportMode};
use ddc_core::error::CollectorError;
use ddc_core::Transport;
use ddc_kubectl::KubectlTransport;
use ddc_ssh::SshTransport;
use std::sync::Arc;

/// Create the transport for the configured mode. The configuration is
/// validated first so no backend is built for a run that cannot start.
pub fn create_transport(config: &Config) -> Result<Arc<dyn Transport>, CollectorError> {
    let mode = config.validate()?;
    Ok(create_transport_for(mode, config))
}

pub fn create_transport_for(mode: TransportMode, config: &Config) -> Arc<dyn Transport> {
    match mode {
        TransportMode::Ssh => Arc::new(SshTransport::new(config.ssh.clone())),
        TransportMode::Kubernetes => Arc::new(KubectlTransport::new(config.kube.clone())),
        TransportMode::Docker => Arc::new(ContainerTransport::new(config.docker.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_mode_gets_its_backend() {
        let config = Config::default();
        assert_eq!(create_transport_for(TransportMode::Ssh, &config).name(), "ssh");
        assert_eq!(
            create_transport_for(TransportMode::Kubernetes, &config).name(),
            "kubernetes"
        );
        assert_eq!(create_transport_for(TransportMode::Docker, &config).name(), "docker");
    }

    #[test]
    fn invalid_config_builds_nothing() {
        let config = Config {
            mode: None,
            ..Config::default()
        };
        assert!(matches!(
            create_transport(&config),
            Err(CollectorError::ConfigValidation(_))
        ));
    }
}
