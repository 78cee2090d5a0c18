pub mod config;
pub mod copy;
pub mod error;
pub mod host;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod resolver;
pub mod secret;
pub mod staging;
pub mod task;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod ticker;
pub mod transport;

pub use config::{Config, TransportMode};
pub use copy::CopyStrategy;
pub use error::CollectorError;
pub use host::{Host, Role, Selector};
pub use orchestrator::{CollectionOrchestrator, CollectionResult, RunOutcome, RunState};
pub use process::{CommandRunner, OutputSink, SystemRunner};
pub use resolver::HostResolver;
pub use secret::Secret;
pub use staging::Staging;
pub use transport::Transport;
