use thiserror::Error;

use crate::host::Role;

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("invalid command flag detected: {0}")]
    ConfigValidation(String),

    #[error("the {0} selector was empty")]
    EmptySelector(Role),

    #[error("no {role} hosts found for selector '{selector}'")]
    NoHostsFound { role: Role, selector: String },

    #[error("unable to discover {role} hosts for selector '{selector}': {source}")]
    DiscoveryFailed {
        role: Role,
        selector: String,
        #[source]
        source: Box<CollectorError>,
    },

    #[error("{0}")]
    Transport(String),

    #[error("host {0} did not finish before the run deadline")]
    HostTimedOut(String),

    #[error("collection failed on {count} host(s): {summary}")]
    HostsFailed { count: usize, summary: String },

    #[error("unable to submit export job for sys.{table}: {reason}")]
    SubmissionFailed { table: String, reason: String },

    #[error("unable to retrieve job state for job {job_id}: {reason}")]
    JobPoll { job_id: String, reason: String },

    #[error("job {job_id} for sys.{table} was still running after {waited_ms}ms")]
    JobTimedOut {
        table: String,
        job_id: String,
        waited_ms: u128,
    },

    #[error("job {job_id} for sys.{table} ended in state {state}")]
    JobFailedState {
        table: String,
        job_id: String,
        state: String,
    },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("archive error: {0}")]
    Archive(String),
}

impl CollectorError {
    /// True for failures that abort the run before any per-host work starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectorError::ConfigValidation(_)
                | CollectorError::EmptySelector(_)
                | CollectorError::NoHostsFound { .. }
                | CollectorError::DiscoveryFailed { .. }
        )
    }
}

impl From<zip::result::ZipError> for CollectorError {
    fn from(e: zip::result::ZipError) -> Self {
        CollectorError::Archive(e.to_string())
    }
}

impl From<walkdir::Error> for CollectorError {
    fn from(e: walkdir::Error) -> Self {
        CollectorError::Archive(e.to_string())
    }
}
