use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Trigger response contained no snapshot_id: {0}")]
    MissingSnapshotId(String),

    #[error("Snapshot not ready yet")]
    NotReady,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cancelled by operator")]
    Cancelled,
}

impl SnapshotError {
    /// NotReady, network faults, and parse faults are transient: the
    /// provider may still be materializing the snapshot file.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SnapshotError::Network(_) | SnapshotError::NotReady | SnapshotError::Parse(_)
        )
    }
}

impl From<reqwest::Error> for SnapshotError {
    fn from(err: reqwest::Error) -> Self {
        SnapshotError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Parse(err.to_string())
    }
}
