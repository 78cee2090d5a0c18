mod container_transport;

pub use container_transport::{ContainerTransport, SERVICE_OWNER};
