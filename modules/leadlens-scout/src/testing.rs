//! Scripted doubles for the provider API and the store. Tests queue up the
//! exact responses a scenario needs; unscripted calls fall back to the
//! provider's steady-state answers (trigger succeeds, poll says running,
//! download says not ready).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use brightdata_client::{JobStatus, SnapshotApi, SnapshotError, TriggerConfig};
use leadlens_common::{InsertOutcome, JobState, Platform, Post, Profile, QueuedHandle, SearchTerm};
use leadlens_store::LeadStore;

#[derive(Default)]
pub struct MockSnapshotApi {
    trigger_script: Mutex<VecDeque<brightdata_client::Result<String>>>,
    poll_script: Mutex<VecDeque<brightdata_client::Result<JobStatus>>>,
    download_script: Mutex<VecDeque<brightdata_client::Result<Vec<Value>>>>,
    trigger_count: AtomicU32,
    poll_count: AtomicU32,
    download_count: AtomicU32,
}

impl MockSnapshotApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_trigger(&self, result: brightdata_client::Result<String>) {
        self.trigger_script.lock().unwrap().push_back(result);
    }

    pub fn script_poll(&self, statuses: &[JobStatus]) {
        let mut script = self.poll_script.lock().unwrap();
        for status in statuses {
            script.push_back(Ok(*status));
        }
    }

    pub fn script_poll_error(&self, err: SnapshotError) {
        self.poll_script.lock().unwrap().push_back(Err(err));
    }

    pub fn script_download(&self, result: brightdata_client::Result<Vec<Value>>) {
        self.download_script.lock().unwrap().push_back(result);
    }

    pub fn trigger_calls(&self) -> u32 {
        self.trigger_count.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> u32 {
        self.poll_count.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> u32 {
        self.download_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotApi for MockSnapshotApi {
    async fn trigger(
        &self,
        _config: &TriggerConfig,
        _entities: &[Value],
    ) -> brightdata_client::Result<String> {
        let n = self.trigger_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.trigger_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("snap-{n}")))
    }

    async fn poll(&self, _snapshot_id: &str) -> brightdata_client::Result<JobStatus> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);
        self.poll_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(JobStatus::Running))
    }

    async fn download(&self, _snapshot_id: &str) -> brightdata_client::Result<Vec<Value>> {
        self.download_count.fetch_add(1, Ordering::SeqCst);
        self.download_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(SnapshotError::NotReady))
    }
}

#[derive(Default)]
struct MemoryInner {
    profiles: HashMap<(Platform, String), Profile>,
    posts: HashMap<(Platform, String), Post>,
    raw: HashMap<String, Vec<Value>>,
    /// Full transition history per snapshot id, newest last.
    jobs: HashMap<String, Vec<JobState>>,
    downloaded: HashSet<String>,
    claimed_terms: HashSet<(Platform, String)>,
    queue: Vec<(Platform, QueuedHandle)>,
    queued_keys: HashSet<(Platform, String)>,
}

/// In-memory [`LeadStore`] with the same dedup semantics as Postgres unique
/// indexes. Keeps job transition history so tests can assert on lifecycles.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_job_state(&self, snapshot_id: &str) -> Option<JobState> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(snapshot_id)?.last().copied()
    }

    pub fn job_states(&self, snapshot_id: &str) -> Vec<JobState> {
        let inner = self.inner.lock().unwrap();
        inner.jobs.get(snapshot_id).cloned().unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().unwrap().jobs.len()
    }

    pub fn is_downloaded(&self, snapshot_id: &str) -> bool {
        self.inner.lock().unwrap().downloaded.contains(snapshot_id)
    }

    pub fn profile_count_sync(&self, platform: Platform) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.profiles.keys().filter(|(p, _)| *p == platform).count()
    }

    pub fn profiles_sync(&self, platform: Platform) -> Vec<Profile> {
        let inner = self.inner.lock().unwrap();
        let mut profiles: Vec<Profile> = inner
            .profiles
            .iter()
            .filter(|((p, _), _)| *p == platform)
            .map(|(_, profile)| profile.clone())
            .collect();
        profiles.sort_by(|a, b| a.handle.cmp(&b.handle));
        profiles
    }

    pub fn post_count_sync(&self, platform: Platform) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.posts.keys().filter(|(p, _)| *p == platform).count()
    }

    /// Pre-populate stored profiles, for tests that start near a target.
    pub fn seed_profiles(&self, platform: Platform, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        for i in 0..count {
            let handle = format!("seeded-{i}");
            inner.profiles.insert(
                (platform, handle.clone()),
                Profile {
                    platform,
                    handle,
                    display_name: None,
                    bio: None,
                    emails: vec![],
                    followers: None,
                    is_verified: false,
                    profile_url: None,
                    avatar_url: None,
                    discovered_keywords: vec![],
                    snapshot_id: "seed".to_string(),
                    extracted_at: chrono::Utc::now(),
                },
            );
        }
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_profile_if_absent(&self, profile: &Profile) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let key = (profile.platform, profile.handle.clone());
        if inner.profiles.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.profiles.insert(key, profile.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_post_if_absent(&self, post: &Post) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let key = (post.platform, post.post_id.clone());
        if inner.posts.contains_key(&key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.posts.insert(key, post.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn record_raw_snapshot(
        &self,
        _platform: Platform,
        snapshot_id: &str,
        records: &[Value],
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.raw.insert(snapshot_id.to_string(), records.to_vec());
        Ok(())
    }

    async fn upsert_job_status(
        &self,
        _platform: Platform,
        snapshot_id: &str,
        state: JobState,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .jobs
            .entry(snapshot_id.to_string())
            .or_default()
            .push(state);
        Ok(())
    }

    async fn mark_downloaded(&self, snapshot_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.downloaded.insert(snapshot_id.to_string());
        Ok(())
    }

    async fn try_claim_term(&self, term: &SearchTerm) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .claimed_terms
            .insert((term.platform, term.keyword.clone())))
    }

    async fn enqueue_handle(
        &self,
        platform: Platform,
        handle: &str,
        profile_url: &str,
    ) -> Result<InsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.queued_keys.insert((platform, handle.to_string())) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.queue.push((
            platform,
            QueuedHandle {
                handle: handle.to_string(),
                profile_url: profile_url.to_string(),
            },
        ));
        Ok(InsertOutcome::Inserted)
    }

    async fn take_queued_handles(
        &self,
        platform: Platform,
        limit: i64,
    ) -> Result<Vec<QueuedHandle>> {
        let mut inner = self.inner.lock().unwrap();
        let mut taken = Vec::new();
        let mut remaining = Vec::new();
        for (p, q) in inner.queue.drain(..) {
            if p == platform && (taken.len() as i64) < limit {
                taken.push(q);
            } else {
                remaining.push((p, q));
            }
        }
        inner.queue = remaining;
        Ok(taken)
    }

    async fn has_profile(&self, platform: Platform, handle: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.profiles.contains_key(&(platform, handle.to_string())))
    }

    async fn profile_count(&self, platform: Platform) -> Result<i64> {
        Ok(self.profile_count_sync(platform) as i64)
    }

    async fn post_count(&self, platform: Platform) -> Result<i64> {
        Ok(self.post_count_sync(platform) as i64)
    }

    async fn all_profiles(&self, platform: Platform) -> Result<Vec<Profile>> {
        Ok(self.profiles_sync(platform))
    }
}
