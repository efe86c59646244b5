//! Snapshot lifecycle coordinator: trigger → poll → download → extract →
//! persist, with every status transition recorded in the store.
//!
//! One search term drives up to two snapshots: a keyword-discovery snapshot
//! whose posts reveal profile handles, and a follow-up profile-detail
//! snapshot for a batch of queued handles.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use brightdata_client::{download_with_retry, JobStatus, RetryPolicy, SnapshotApi};
use leadlens_common::{InsertOutcome, JobState, Profile, SearchTerm};
use leadlens_store::LeadStore;

use crate::extractor;
use crate::platform::PlatformAdapter;

/// Counters and final job state from one term's lifecycle. Returned to the
/// driver instead of mutating any shared status state.
#[derive(Debug)]
pub struct SnapshotOutcome {
    pub search_snapshot_id: String,
    pub job_state: JobState,
    pub records_seen: u32,
    pub posts_inserted: u32,
    pub posts_duplicate: u32,
    pub profiles_inserted: u32,
    pub profiles_duplicate: u32,
    pub records_rejected: u32,
    pub handles_queued: u32,
    pub discovered_keywords: BTreeSet<String>,
}

impl SnapshotOutcome {
    fn new(search_snapshot_id: String) -> Self {
        Self {
            search_snapshot_id,
            job_state: JobState::Requested,
            records_seen: 0,
            posts_inserted: 0,
            posts_duplicate: 0,
            profiles_inserted: 0,
            profiles_duplicate: 0,
            records_rejected: 0,
            handles_queued: 0,
            discovered_keywords: BTreeSet::new(),
        }
    }
}

enum PollResult {
    Payload(Vec<Value>),
    Failed,
    TimedOut,
    Stopped,
}

pub struct Coordinator {
    api: Arc<dyn SnapshotApi>,
    store: Arc<dyn LeadStore>,
    adapter: PlatformAdapter,
    policy: RetryPolicy,
    profile_batch_limit: i64,
    stop: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        api: Arc<dyn SnapshotApi>,
        store: Arc<dyn LeadStore>,
        adapter: PlatformAdapter,
        policy: RetryPolicy,
        profile_batch_limit: i64,
    ) -> Self {
        Self {
            api,
            store,
            adapter,
            policy,
            profile_batch_limit,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share an operator stop flag. Observed between polls and between
    /// download attempts, so a long-waiting snapshot is abandoned promptly
    /// instead of holding the driver until `max_wait`.
    pub fn bind_stop(&mut self, stop: Arc<AtomicBool>) {
        self.stop = stop;
    }

    /// Run the full lifecycle for one search term. A trigger that yields no
    /// snapshot id is an error for this term's iteration; everything after a
    /// successful trigger resolves to a terminal job state in the outcome.
    pub async fn run_term(&self, term: &SearchTerm) -> Result<SnapshotOutcome> {
        info!(platform = %self.adapter.platform, term = %term.keyword, "Starting search snapshot");

        let entities = self.adapter.search_entities(&term.keyword);
        let snapshot_id = self
            .api
            .trigger(&self.adapter.search_trigger(), &entities)
            .await
            .with_context(|| format!("search trigger failed for term '{}'", term.keyword))?;

        let mut outcome = SnapshotOutcome::new(snapshot_id.clone());
        match self.await_payload(&snapshot_id).await? {
            PollResult::Payload(records) => {
                outcome.job_state = JobState::Ready;
                outcome.records_seen += records.len() as u32;
                self.process_search_records(&snapshot_id, &records, &mut outcome)
                    .await;
            }
            PollResult::Failed => {
                outcome.job_state = JobState::Failed;
                return Ok(outcome);
            }
            PollResult::TimedOut => {
                outcome.job_state = JobState::TimedOut;
                return Ok(outcome);
            }
            // Leave the job in its last persisted state; it was abandoned,
            // not failed.
            PollResult::Stopped => return Ok(outcome),
        }

        self.run_profile_batch(&mut outcome).await?;
        Ok(outcome)
    }

    /// Poll a snapshot to a terminal state, then download within the retry
    /// budget. Persists every transition; never polls past a terminal state.
    async fn await_payload(&self, snapshot_id: &str) -> Result<PollResult> {
        let platform = self.adapter.platform;
        self.store
            .upsert_job_status(platform, snapshot_id, JobState::Requested)
            .await?;

        let started = Instant::now();
        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!(snapshot_id, "Stop requested, abandoning snapshot wait");
                return Ok(PollResult::Stopped);
            }
            match self.api.poll(snapshot_id).await {
                Ok(JobStatus::Ready) => break,
                Ok(JobStatus::Failed) => {
                    warn!(snapshot_id, "Snapshot failed on the provider side");
                    self.store
                        .upsert_job_status(platform, snapshot_id, JobState::Failed)
                        .await?;
                    return Ok(PollResult::Failed);
                }
                Ok(JobStatus::Running) => {
                    self.store
                        .upsert_job_status(platform, snapshot_id, JobState::Running)
                        .await?;
                }
                Err(e) => {
                    debug!(snapshot_id, error = %e, "Transient poll failure");
                }
            }
            if started.elapsed() >= self.policy.max_wait {
                warn!(
                    snapshot_id,
                    waited_secs = self.policy.max_wait.as_secs(),
                    "Snapshot polling timed out"
                );
                self.store
                    .upsert_job_status(platform, snapshot_id, JobState::TimedOut)
                    .await?;
                return Ok(PollResult::TimedOut);
            }
            tokio::time::sleep(self.policy.poll_interval).await;
        }

        self.store
            .upsert_job_status(platform, snapshot_id, JobState::Ready)
            .await?;

        let records =
            match download_with_retry(self.api.as_ref(), snapshot_id, &self.policy, &self.stop)
                .await
            {
                Ok(records) => records,
                Err(brightdata_client::SnapshotError::Cancelled) => {
                    info!(snapshot_id, "Stop requested, abandoning download");
                    return Ok(PollResult::Stopped);
                }
                Err(e) => {
                    warn!(snapshot_id, error = %e, "Download retries exhausted");
                    self.store
                        .upsert_job_status(platform, snapshot_id, JobState::Failed)
                        .await?;
                    return Ok(PollResult::Failed);
                }
            };

        self.store.mark_downloaded(snapshot_id).await?;
        if let Err(e) = self
            .store
            .record_raw_snapshot(platform, snapshot_id, &records)
            .await
        {
            warn!(snapshot_id, error = %e, "Failed to keep raw snapshot copy");
        }

        Ok(PollResult::Payload(records))
    }

    /// Walk the search payload in arrival order. Post records are stored and
    /// their authors queued for a detail scrape; bare profile records are
    /// stored directly. One bad record never aborts the batch.
    async fn process_search_records(
        &self,
        snapshot_id: &str,
        records: &[Value],
        outcome: &mut SnapshotOutcome,
    ) {
        for record in records {
            if let Some(post) = extractor::extract_post(&self.adapter, record, snapshot_id) {
                let handle = post.handle.clone();
                match self.store.insert_post_if_absent(&post).await {
                    Ok(InsertOutcome::Inserted) => outcome.posts_inserted += 1,
                    Ok(InsertOutcome::AlreadyExists) => {
                        debug!(post_id = %post.post_id, "Duplicate post");
                        outcome.posts_duplicate += 1;
                    }
                    Err(e) => {
                        warn!(post_id = %post.post_id, error = %e, "Failed to store post");
                        outcome.records_rejected += 1;
                        continue;
                    }
                }
                if let Some(handle) = handle {
                    self.queue_handle(record, &handle, outcome).await;
                }
            } else if let Some(profile) =
                extractor::extract_profile(&self.adapter, record, snapshot_id)
            {
                self.store_profile(profile, outcome).await;
            } else {
                debug!(snapshot_id, "Record with no derivable key skipped");
                outcome.records_rejected += 1;
            }
        }
    }

    async fn queue_handle(&self, record: &Value, handle: &str, outcome: &mut SnapshotOutcome) {
        match self.store.has_profile(self.adapter.platform, handle).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                warn!(handle, error = %e, "Profile lookup failed, not queueing");
                return;
            }
        }
        let url = extractor::post_profile_link(record)
            .unwrap_or_else(|| self.adapter.profile_url_for(handle));
        match self
            .store
            .enqueue_handle(self.adapter.platform, handle, &url)
            .await
        {
            Ok(InsertOutcome::Inserted) => {
                debug!(handle, "Queued profile for detail scrape");
                outcome.handles_queued += 1;
            }
            Ok(InsertOutcome::AlreadyExists) => {}
            Err(e) => warn!(handle, error = %e, "Failed to queue handle"),
        }
    }

    async fn store_profile(&self, profile: Profile, outcome: &mut SnapshotOutcome) {
        outcome
            .discovered_keywords
            .extend(profile.discovered_keywords.iter().cloned());
        match self.store.insert_profile_if_absent(&profile).await {
            Ok(InsertOutcome::Inserted) => {
                info!(
                    handle = %profile.handle,
                    emails = profile.emails.len(),
                    "Stored profile"
                );
                outcome.profiles_inserted += 1;
            }
            Ok(InsertOutcome::AlreadyExists) => {
                debug!(handle = %profile.handle, "Profile already captured");
                outcome.profiles_duplicate += 1;
            }
            Err(e) => {
                warn!(handle = %profile.handle, error = %e, "Failed to store profile");
                outcome.records_rejected += 1;
            }
        }
    }

    /// Claim a batch of queued handles and run a profile-detail snapshot for
    /// them. Failures here are logged and swallowed: the term's search phase
    /// already succeeded, and unclaimed handles stay queued for later runs.
    async fn run_profile_batch(&self, outcome: &mut SnapshotOutcome) -> Result<()> {
        let queued = self
            .store
            .take_queued_handles(self.adapter.platform, self.profile_batch_limit)
            .await?;
        if queued.is_empty() {
            return Ok(());
        }

        info!(count = queued.len(), "Fetching details for queued profiles");
        let entities = self.adapter.profile_entities(&queued);
        let snapshot_id = match self
            .api
            .trigger(&self.adapter.profile_trigger(), &entities)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Profile detail trigger failed");
                return Ok(());
            }
        };

        match self.await_payload(&snapshot_id).await? {
            PollResult::Payload(records) => {
                outcome.records_seen += records.len() as u32;
                for record in &records {
                    match extractor::extract_profile(&self.adapter, record, &snapshot_id) {
                        Some(profile) => self.store_profile(profile, outcome).await,
                        None => {
                            debug!(snapshot_id, "Profile record with no handle skipped");
                            outcome.records_rejected += 1;
                        }
                    }
                }
            }
            PollResult::Failed | PollResult::TimedOut => {
                warn!(snapshot_id, "Profile detail snapshot did not complete");
            }
            PollResult::Stopped => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::testing::{MemoryStore, MockSnapshotApi};
    use leadlens_common::Platform;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(20),
            download_attempts: 5,
            download_delay: Duration::from_millis(1),
        }
    }

    fn coordinator(
        api: Arc<MockSnapshotApi>,
        store: Arc<MemoryStore>,
        policy: RetryPolicy,
    ) -> Coordinator {
        Coordinator::new(
            api,
            store,
            PlatformAdapter::for_platform(Platform::Snapchat),
            policy,
            10,
        )
    }

    fn term(keyword: &str) -> SearchTerm {
        SearchTerm::new(Platform::Snapchat, keyword)
    }

    fn alice_record() -> Value {
        json!({"profile_handle": "alice", "bio": "reach me at a@x.com"})
    }

    #[tokio::test]
    async fn never_ready_snapshot_times_out_without_download() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-slow".to_string()));
        // No poll script: every check reports Running.
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.job_state, JobState::TimedOut);
        assert_eq!(outcome.records_seen, 0);
        assert_eq!(api.download_calls(), 0, "timed-out job must not be downloaded");
        assert_eq!(store.last_job_state("job-slow"), Some(JobState::TimedOut));
    }

    #[tokio::test]
    async fn transient_poll_errors_do_not_fail_the_job() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-flaky".to_string()));
        api.script_poll_error(brightdata_client::SnapshotError::Network(
            "connection reset".to_string(),
        ));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![alice_record()]));
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.job_state, JobState::Ready);
        assert_eq!(outcome.profiles_inserted, 1);
        assert_eq!(api.poll_calls(), 2, "errored poll is retried, not terminal");
        assert_eq!(
            store.job_states("job-flaky"),
            vec![JobState::Requested, JobState::Ready]
        );
        assert!(store.is_downloaded("job-flaky"));
    }

    #[tokio::test]
    async fn stop_flag_abandons_a_long_snapshot_wait() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-wait".to_string()));
        // No poll script: without the stop flag this job would be polled
        // until max_wait.
        let store = Arc::new(MemoryStore::new());
        let policy = RetryPolicy {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_secs(3600),
            download_attempts: 5,
            download_delay: Duration::from_millis(1),
        };
        let mut coord = coordinator(api.clone(), store.clone(), policy);
        coord.bind_stop(Arc::new(AtomicBool::new(true)));

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert!(!outcome.job_state.is_terminal(), "abandoned, not failed");
        assert_eq!(api.poll_calls(), 0);
        assert_eq!(api.download_calls(), 0);
        assert!(!store.is_downloaded("job-wait"));
    }

    #[tokio::test]
    async fn provider_failure_is_terminal_without_download() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-bad".to_string()));
        api.script_poll(&[JobStatus::Running, JobStatus::Failed]);
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.job_state, JobState::Failed);
        assert_eq!(api.download_calls(), 0);
        assert_eq!(store.last_job_state("job-bad"), Some(JobState::Failed));
    }

    #[tokio::test]
    async fn trigger_without_snapshot_id_is_an_error() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Err(brightdata_client::SnapshotError::MissingSnapshotId(
            "gd_x".to_string(),
        )));
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api, store.clone(), fast_policy());

        assert!(coord.run_term(&term("NYC")).await.is_err());
        assert!(store.job_count() == 0, "no job record without a snapshot id");
    }

    #[tokio::test]
    async fn download_succeeds_on_fifth_attempt() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-retry".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        for _ in 0..4 {
            api.script_download(Err(brightdata_client::SnapshotError::NotReady));
        }
        api.script_download(Ok(vec![alice_record()]));
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(api.download_calls(), 5);
        assert_eq!(outcome.profiles_inserted, 1);
        assert_eq!(store.profile_count_sync(Platform::Snapchat), 1);
    }

    #[tokio::test]
    async fn download_budget_exhaustion_marks_job_failed() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-never".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        // No download script: every attempt reports NotReady.
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.job_state, JobState::Failed);
        assert_eq!(api.download_calls(), 5);
        assert_eq!(store.last_job_state("job-never"), Some(JobState::Failed));
    }

    #[tokio::test]
    async fn nyc_scenario_stores_alice_once() {
        let store = Arc::new(MemoryStore::new());

        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job123".to_string()));
        api.script_poll(&[JobStatus::Running, JobStatus::Running, JobStatus::Ready]);
        api.script_download(Ok(vec![alice_record()]));
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();
        assert_eq!(outcome.profiles_inserted, 1);
        assert_eq!(outcome.profiles_duplicate, 0);
        let profiles = store.profiles_sync(Platform::Snapchat);
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].handle, "alice");
        assert_eq!(profiles[0].emails, vec!["a@x.com".to_string()]);

        // Same payload again: first-writer-wins, count stays 1.
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job124".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![alice_record()]));
        let coord = coordinator(api, store.clone(), fast_policy());

        let outcome = coord.run_term(&term("New York")).await.unwrap();
        assert_eq!(outcome.profiles_inserted, 0);
        assert_eq!(outcome.profiles_duplicate, 1);
        assert_eq!(store.profile_count_sync(Platform::Snapchat), 1);
    }

    #[tokio::test]
    async fn malformed_record_does_not_abort_the_batch() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-mixed".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![
            json!({"bio": "no key here"}),
            json!(42),
            alice_record(),
        ]));
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api, store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.records_seen, 3);
        assert_eq!(outcome.records_rejected, 2);
        assert_eq!(outcome.profiles_inserted, 1);
    }

    #[tokio::test]
    async fn post_payload_queues_handles_and_fetches_details() {
        let api = Arc::new(MockSnapshotApi::new());
        // Search snapshot with two posts by the same author, then the
        // profile-detail snapshot for the queued handle.
        api.script_trigger(Ok("job-search".to_string()));
        api.script_trigger(Ok("job-detail".to_string()));
        api.script_poll(&[JobStatus::Ready, JobStatus::Ready]);
        api.script_download(Ok(vec![
            json!({
                "post_id": "p1",
                "profile_handle": "dave",
                "profile_link": "https://www.snapchat.com/add/dave",
                "num_views": "1,000",
            }),
            json!({
                "post_id": "p2",
                "profile_handle": "dave",
                "profile_link": "https://www.snapchat.com/add/dave",
            }),
        ]));
        api.script_download(Ok(vec![json!({
            "profile_handle": "dave",
            "bio": "📍Brooklyn — dave@snap.example",
            "subscriber_count": 900,
        })]));
        let store = Arc::new(MemoryStore::new());
        let coord = coordinator(api.clone(), store.clone(), fast_policy());

        let outcome = coord.run_term(&term("NYC")).await.unwrap();

        assert_eq!(outcome.posts_inserted, 2);
        assert_eq!(outcome.handles_queued, 1, "same author queued once");
        assert_eq!(outcome.profiles_inserted, 1);
        assert_eq!(api.trigger_calls(), 2);
        assert!(outcome.discovered_keywords.contains("Brooklyn"));

        let profiles = store.profiles_sync(Platform::Snapchat);
        assert_eq!(profiles[0].emails, vec!["dave@snap.example".to_string()]);
        assert_eq!(profiles[0].followers, Some(900));
    }

    #[tokio::test]
    async fn already_stored_authors_are_not_requeued() {
        let store = Arc::new(MemoryStore::new());
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-a".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![alice_record()]));
        let coord = coordinator(api, store.clone(), fast_policy());
        coord.run_term(&term("NYC")).await.unwrap();

        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job-b".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![json!({
            "post_id": "p9",
            "profile_handle": "alice",
        })]));
        let coord = coordinator(api.clone(), store.clone(), fast_policy());
        let outcome = coord.run_term(&term("Brooklyn")).await.unwrap();

        assert_eq!(outcome.posts_inserted, 1);
        assert_eq!(outcome.handles_queued, 0, "alice is already stored");
        assert_eq!(api.trigger_calls(), 1, "no detail snapshot for empty queue");
    }
}
