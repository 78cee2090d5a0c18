use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// State reported by the job status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Still queued, planning or executing.
    Running,
    Completed,
    /// Any other terminal state, with the raw name (FAILED, CANCELED, ...).
    Terminal(String),
}

/// States the server reports before a job has produced its result.
const IN_PROGRESS: &[&str] = &[
    "NOT_SUBMITTED",
    "STARTING",
    "RUNNING",
    "ENQUEUED",
    "PLANNING",
    "PENDING",
    "METADATA_RETRIEVAL",
    "QUEUED",
    "ENGINE_START",
    "EXECUTION_PLANNING",
];

impl JobState {
    pub fn parse(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        if upper == "COMPLETED" {
            JobState::Completed
        } else if IN_PROGRESS.contains(&upper.as_str()) {
            JobState::Running
        } else {
            JobState::Terminal(upper)
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Running => write!(f, "RUNNING"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Terminal(s) => write!(f, "{}", s),
        }
    }
}

/// Lifecycle of a submitted export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Submitted,
    Running,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// A job accepted by the server. Phases only move forward, except that
/// `Running` may repeat.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub id: String,
    pub phase: JobPhase,
    pub row_limit: u64,
    pub poll_interval: Duration,
    pub polls: u32,
}

impl RemoteJob {
    pub fn submitted(id: String, row_limit: u64, poll_interval: Duration) -> Self {
        Self {
            id,
            phase: JobPhase::Submitted,
            row_limit,
            poll_interval,
            polls: 0,
        }
    }

    /// Apply a polled state. Terminal phases are sticky.
    pub fn observe(&mut self, state: &JobState) -> JobPhase {
        self.polls += 1;
        if !self.phase.is_terminal() {
            self.phase = match state {
                JobState::Running => JobPhase::Running,
                JobState::Completed => JobPhase::Completed,
                JobState::Terminal(_) => JobPhase::Failed,
            };
        }
        self.phase
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobStatusResponse {
    #[serde(rename = "jobState")]
    pub job_state: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JobDataResponse {
    #[serde(rename = "returnedRowCount")]
    pub returned_row_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_maps_states() {
        assert_eq!(JobState::parse("RUNNING"), JobState::Running);
        assert_eq!(JobState::parse("enqueued"), JobState::Running);
        assert_eq!(JobState::parse("COMPLETED"), JobState::Completed);
        assert_eq!(
            JobState::parse("CANCELED"),
            JobState::Terminal("CANCELED".into())
        );
    }

    #[test]
    fn terminal_phase_is_sticky() {
        let mut job = RemoteJob::submitted("j1".into(), 10, Duration::from_millis(1));
        assert_eq!(job.observe(&JobState::Running), JobPhase::Running);
        assert_eq!(job.observe(&JobState::Running), JobPhase::Running);
        assert_eq!(job.observe(&JobState::Completed), JobPhase::Completed);
        assert_eq!(job.observe(&JobState::Running), JobPhase::Completed);
        assert_eq!(job.polls, 4);
    }

    #[test]
    fn row_count_must_be_a_number() {
        assert!(serde_json::from_str::<JobDataResponse>(r#"{"returnedRowCount": "12"}"#).is_err());
        assert!(serde_json::from_str::<JobDataResponse>(r#"{"rows": []}"#).is_err());
        let ok: JobDataResponse =
            serde_json::from_str(r#"{"returnedRowCount": 12, "rows": []}"#).unwrap();
        assert_eq!(ok.returned_row_count, 12);
    }
}
