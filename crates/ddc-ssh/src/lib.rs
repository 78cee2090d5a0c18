mod ssh_transport;

pub use ssh_transport::{expand_host_list, SshTransport};
