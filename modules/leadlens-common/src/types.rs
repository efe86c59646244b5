use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platforms the collector knows how to harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    TikTok,
    Snapchat,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
            Platform::Snapchat => "snapchat",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "instagram" => Ok(Platform::Instagram),
            "tiktok" => Ok(Platform::TikTok),
            "snapchat" => Ok(Platform::Snapchat),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// A search keyword driving discovery. Claimed in the store the moment the
/// driver selects it, so concurrent or restarted runs never reuse a term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    pub platform: Platform,
    pub keyword: String,
}

impl SearchTerm {
    pub fn new(platform: Platform, keyword: impl Into<String>) -> Self {
        Self {
            platform,
            keyword: keyword.into(),
        }
    }
}

/// Lifecycle state of a snapshot job as tracked in the store. Transitions are
/// monotonic: once `Failed`, `TimedOut`, or downloaded-after-`Ready`, a job is
/// never polled again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Requested,
    Running,
    Ready,
    Failed,
    TimedOut,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Requested => "requested",
            JobState::Running => "running",
            JobState::Ready => "ready",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Ready | JobState::Failed | JobState::TimedOut)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a dedup-guarded insert. `AlreadyExists` is an expected outcome,
/// counted but never logged as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl InsertOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

/// A normalized profile. Natural key: `(platform, handle)`. First-writer-wins:
/// once stored, a profile is never overwritten by a later extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub platform: Platform,
    pub handle: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub emails: Vec<String>,
    pub followers: Option<i64>,
    pub is_verified: bool,
    pub profile_url: Option<String>,
    pub avatar_url: Option<String>,
    pub discovered_keywords: Vec<String>,
    pub snapshot_id: String,
    pub extracted_at: DateTime<Utc>,
}

impl Profile {
    pub fn has_emails(&self) -> bool {
        !self.emails.is_empty()
    }
}

/// A normalized post. Natural key: `(platform, post_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub platform: Platform,
    pub post_id: String,
    pub handle: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub comments: Option<i64>,
    pub shares: Option<i64>,
    pub views: Option<i64>,
    pub likes: Option<i64>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub hashtags: Vec<String>,
    pub snapshot_id: String,
    pub extracted_at: DateTime<Utc>,
}

/// A profile identity discovered in post data and queued for a detail scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedHandle {
    pub handle: String,
    pub profile_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trips_through_str() {
        for p in [Platform::Instagram, Platform::TikTok, Platform::Snapchat] {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn terminal_job_states() {
        assert!(!JobState::Requested.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Ready.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
    }
}
