use tracing::{debug, info};

use crate::error::CollectorError;
use crate::host::{Host, Selector};
use crate::transport::Transport;

/// Turns a selector into concrete hosts through the backend's own discovery.
pub struct HostResolver;

impl HostResolver {
    /// Resolve `selector` against `transport`.
    ///
    /// An empty selector fails before the backend is called. A discovery error
    /// and an empty (but successful) discovery are reported separately since
    /// one points at connectivity and the other at the selector.
    pub async fn resolve(
        selector: &Selector,
        transport: &dyn Transport,
    ) -> Result<Vec<Host>, CollectorError> {
        if selector.is_empty() {
            return Err(CollectorError::EmptySelector(selector.role));
        }

        debug!(
            "Resolving {} selector '{}' via {}",
            selector.role,
            selector.raw,
            transport.name()
        );
        let identifiers =
            transport
                .find_hosts(selector)
                .await
                .map_err(|e| CollectorError::DiscoveryFailed {
                    role: selector.role,
                    selector: selector.raw.clone(),
                    source: Box::new(e),
                })?;

        let mut hosts: Vec<Host> = Vec::with_capacity(identifiers.len());
        for id in identifiers {
            let id = id.trim();
            if id.is_empty() || hosts.iter().any(|h| h.identifier == id) {
                continue;
            }
            hosts.push(Host::new(id, selector.role));
        }

        if hosts.is_empty() {
            return Err(CollectorError::NoHostsFound {
                role: selector.role,
                selector: selector.raw.clone(),
            });
        }

        info!(
            "Found {} {} host(s): {}",
            hosts.len(),
            selector.role,
            hosts
                .iter()
                .map(|h| h.identifier.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(hosts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Role;
    use crate::testing::FakeTransport;

    #[tokio::test]
    async fn stamps_identifiers_with_the_requested_role() {
        let transport = FakeTransport::new(&["c1"], &["e1", "e2"]);
        let hosts = HostResolver::resolve(&Selector::new("app=exec", Role::Executor), &transport)
            .await
            .unwrap();
        assert_eq!(
            hosts,
            vec![Host::new("e1", Role::Executor), Host::new("e2", Role::Executor)]
        );
    }

    #[tokio::test]
    async fn empty_selector_is_rejected_offline() {
        let transport = FakeTransport::new(&["c1"], &["e1"]);
        let err = HostResolver::resolve(&Selector::new("", Role::Coordinator), &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::EmptySelector(Role::Coordinator)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn zero_matches_is_not_a_discovery_error() {
        let transport = FakeTransport::new(&[], &["e1"]);
        let err = HostResolver::resolve(&Selector::new("nothing", Role::Coordinator), &transport)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::NoHostsFound { .. }));
    }

    #[tokio::test]
    async fn duplicates_and_blanks_are_dropped() {
        let transport = FakeTransport::new(&["c1", " ", "c1", "c2"], &[]);
        let hosts = HostResolver::resolve(&Selector::new("c", Role::Coordinator), &transport)
            .await
            .unwrap();
        let ids: Vec<_> = hosts.iter().map(|h| h.identifier.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn resolving_twice_gives_the_same_hosts() {
        let transport = FakeTransport::new(&["c1", "c2"], &[]);
        let selector = Selector::new("c", Role::Coordinator);
        let first = HostResolver::resolve(&selector, &transport).await.unwrap();
        let second = HostResolver::resolve(&selector, &transport).await.unwrap();
        assert_eq!(first, second);
    }
}
