//! Persistence layer: natural-key dedup over Postgres unique indexes.
//!
//! Every correctness guarantee for concurrent writers lives here. Used
//! search terms, queued handles, and stored entities are all enforced by
//! unique indexes plus `ON CONFLICT DO NOTHING`, never by in-memory locks.

pub mod migrate;
pub mod pg;

pub use migrate::migrate;
pub use pg::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use leadlens_common::{
    InsertOutcome, JobState, Platform, Post, Profile, QueuedHandle, SearchTerm,
};

/// Store operations the pipeline needs. `PgStore` is the production
/// implementation; tests use an in-memory mock.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a profile unless one with the same `(platform, handle)` exists.
    /// Never updates an existing row: profiles are immutable once captured.
    async fn insert_profile_if_absent(&self, profile: &Profile) -> Result<InsertOutcome>;

    /// Insert a post unless one with the same `(platform, post_id)` exists.
    async fn insert_post_if_absent(&self, post: &Post) -> Result<InsertOutcome>;

    /// Keep an audit copy of the raw provider payload for a snapshot.
    async fn record_raw_snapshot(
        &self,
        platform: Platform,
        snapshot_id: &str,
        records: &[Value],
    ) -> Result<()>;

    /// Persist a job status transition, keyed by snapshot id.
    async fn upsert_job_status(
        &self,
        platform: Platform,
        snapshot_id: &str,
        state: JobState,
    ) -> Result<()>;

    /// Stamp the moment a snapshot's payload landed.
    async fn mark_downloaded(&self, snapshot_id: &str) -> Result<()>;

    /// Atomically claim a search term. Returns false when another run (or an
    /// earlier iteration) already consumed it.
    async fn try_claim_term(&self, term: &SearchTerm) -> Result<bool>;

    /// Queue a discovered profile identity for a detail scrape. Duplicate
    /// handles collapse onto the existing queue row.
    async fn enqueue_handle(
        &self,
        platform: Platform,
        handle: &str,
        profile_url: &str,
    ) -> Result<InsertOutcome>;

    /// Claim up to `limit` unprocessed queue entries. Claimed entries are
    /// not returned to later callers, so concurrent drivers split the queue.
    async fn take_queued_handles(&self, platform: Platform, limit: i64) -> Result<Vec<QueuedHandle>>;

    /// Whether a profile with this handle is already stored.
    async fn has_profile(&self, platform: Platform, handle: &str) -> Result<bool>;

    async fn profile_count(&self, platform: Platform) -> Result<i64>;

    async fn post_count(&self, platform: Platform) -> Result<i64>;

    /// Read-all query for the exporter.
    async fn all_profiles(&self, platform: Platform) -> Result<Vec<Profile>>;
}
