mod kubectl_transport;

pub use kubectl_transport::{KubectlTransport, CLUSTER_RESOURCES};
