pub mod client;
pub mod exporter;
pub mod job;

pub use client::{JobApi, RestClient};
pub use exporter::{select_all, ExportReport, ExportedTable, SystemTableExport, SystemTableExporter};
pub use job::{JobPhase, JobState, RemoteJob};
