use std::time::Duration;

use serde::Deserialize;

/// Status of a snapshot job, mapped from the provider's vocabulary.
///
/// The provider reports a richer set ("collecting", "building", "delivering",
/// ...) but the lifecycle only needs three outcomes. Anything that is not
/// terminal maps to `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Ready,
    Failed,
}

/// Map a provider status string to a [`JobStatus`].
pub fn map_status(status: &str) -> JobStatus {
    match status {
        "ready" => JobStatus::Ready,
        "failed" | "error" => JobStatus::Failed,
        _ => JobStatus::Running,
    }
}

/// Query parameters for one snapshot trigger call: which dataset to run and
/// any discovery parameters (`type=discover_new`, `discover_by=keyword`, ...).
/// Built by the per-platform adapters; the client only forwards them.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    pub dataset_id: String,
    pub params: Vec<(String, String)>,
}

impl TriggerConfig {
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.params.push((key.to_string(), value.into()));
        self
    }
}

/// Response body from `POST /datasets/v3/trigger`.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerResponse {
    pub snapshot_id: Option<String>,
}

/// Response body from `GET /datasets/v3/progress/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressResponse {
    pub status: Option<String>,
}

/// Timing knobs for the poll and download loops. Production values match the
/// provider's pacing; tests shrink them to milliseconds.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between status checks while a job is running.
    pub poll_interval: Duration,
    /// Absolute wall-clock ceiling on polling before the job is timed out.
    pub max_wait: Duration,
    /// Maximum download attempts for a ready snapshot.
    pub download_attempts: u32,
    /// Delay between download attempts.
    pub download_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(3600),
            download_attempts: 5,
            download_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_map_to_terminal_outcomes() {
        assert_eq!(map_status("ready"), JobStatus::Ready);
        assert_eq!(map_status("failed"), JobStatus::Failed);
        assert_eq!(map_status("error"), JobStatus::Failed);
    }

    #[test]
    fn unknown_statuses_are_treated_as_running() {
        assert_eq!(map_status("running"), JobStatus::Running);
        assert_eq!(map_status("building"), JobStatus::Running);
        assert_eq!(map_status("collecting"), JobStatus::Running);
        assert_eq!(map_status("something-new"), JobStatus::Running);
    }
}
