use std::path::Path;
use tracing::debug;

use crate::error::CollectorError;
use crate::host::Host;
use crate::transport::Transport;

/// Which copy call a run uses, fixed when the strategy is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyPath {
    Plain,
    Escalated { sudo_user: String },
}

/// Chooses between plain and sudo copies once per run.
#[derive(Debug, Clone)]
pub struct CopyStrategy {
    path: CopyPath,
}

impl CopyStrategy {
    /// Escalate only when the backend asks for it and a sudo user is configured.
    pub fn for_transport(transport: &dyn Transport, sudo_user: Option<&str>) -> Self {
        let path = match sudo_user.map(str::trim).filter(|u| !u.is_empty()) {
            Some(user) if transport.needs_escalated_copy() => CopyPath::Escalated {
                sudo_user: user.to_string(),
            },
            _ => CopyPath::Plain,
        };
        debug!("Copy path for {}: {:?}", transport.name(), path);
        Self { path }
    }

    pub fn path(&self) -> &CopyPath {
        &self.path
    }

    pub async fn copy_to(
        &self,
        transport: &dyn Transport,
        host: &Host,
        source: &Path,
        destination: &str,
    ) -> Result<String, CollectorError> {
        match &self.path {
            CopyPath::Plain => transport.copy_to_host(host, source, destination).await,
            CopyPath::Escalated { sudo_user } => {
                transport
                    .copy_to_host_sudo(host, sudo_user, source, destination)
                    .await
            }
        }
    }

    pub async fn copy_from(
        &self,
        transport: &dyn Transport,
        host: &Host,
        source: &str,
        destination: &Path,
    ) -> Result<String, CollectorError> {
        match &self.path {
            CopyPath::Plain => transport.copy_from_host(host, source, destination).await,
            CopyPath::Escalated { sudo_user } => {
                transport
                    .copy_from_host_sudo(host, sudo_user, source, destination)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Role;
    use crate::testing::FakeTransport;

    #[test]
    fn escalation_needs_both_backend_request_and_sudo_user() {
        let escalating = FakeTransport::new(&[], &[]).escalating();
        let plain = FakeTransport::new(&[], &[]);

        assert_eq!(
            CopyStrategy::for_transport(&escalating, Some("dremio")).path(),
            &CopyPath::Escalated {
                sudo_user: "dremio".into()
            }
        );
        assert_eq!(
            CopyStrategy::for_transport(&escalating, None).path(),
            &CopyPath::Plain
        );
        assert_eq!(
            CopyStrategy::for_transport(&escalating, Some("  ")).path(),
            &CopyPath::Plain
        );
        assert_eq!(
            CopyStrategy::for_transport(&plain, Some("dremio")).path(),
            &CopyPath::Plain
        );
    }

    #[tokio::test]
    async fn escalated_copy_to_passes_the_sudo_user() {
        let transport = FakeTransport::new(&[], &[]).escalating();
        let strategy = CopyStrategy::for_transport(&transport, Some("dremio"));
        let host = Host::new("10.0.0.1", Role::Coordinator);

        strategy
            .copy_to(&transport, &host, Path::new("ddc.yaml"), "/tmp/ddc/ddc.yaml")
            .await
            .unwrap();

        assert_eq!(
            transport.log(),
            vec!["copy_to_sudo 10.0.0.1 dremio /tmp/ddc/ddc.yaml".to_string()]
        );
    }
}
