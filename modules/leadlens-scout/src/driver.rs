//! Run driver: walks the keyword queue through the coordinator until the
//! profile target is reached, the iteration cap is hit, keywords run out, or
//! a shutdown is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use leadlens_common::{JobState, Platform};
use leadlens_store::LeadStore;

use crate::coordinator::{Coordinator, SnapshotOutcome};
use crate::keywords::KeywordManager;

/// Aggregate counters for one driver run, printed once at the end.
#[derive(Debug, Default)]
pub struct RunStats {
    pub iterations: u32,
    pub terms_used: u32,
    pub terms_failed: u32,
    pub snapshots_completed: u32,
    pub snapshots_failed: u32,
    pub snapshots_timed_out: u32,
    pub records_seen: u32,
    pub posts_inserted: u32,
    pub posts_duplicate: u32,
    pub profiles_inserted: u32,
    pub profiles_duplicate: u32,
    pub records_rejected: u32,
    pub handles_queued: u32,
    pub keywords_discovered: u32,
}

impl RunStats {
    fn absorb(&mut self, outcome: &SnapshotOutcome) {
        match outcome.job_state {
            JobState::Ready => self.snapshots_completed += 1,
            JobState::Failed => self.snapshots_failed += 1,
            JobState::TimedOut => self.snapshots_timed_out += 1,
            JobState::Requested | JobState::Running => {}
        }
        self.records_seen += outcome.records_seen;
        self.posts_inserted += outcome.posts_inserted;
        self.posts_duplicate += outcome.posts_duplicate;
        self.profiles_inserted += outcome.profiles_inserted;
        self.profiles_duplicate += outcome.profiles_duplicate;
        self.records_rejected += outcome.records_rejected;
        self.handles_queued += outcome.handles_queued;
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Run Complete ===")?;
        writeln!(f, "Iterations:          {}", self.iterations)?;
        writeln!(f, "Terms used:          {}", self.terms_used)?;
        writeln!(f, "Terms failed:        {}", self.terms_failed)?;
        writeln!(f, "Snapshots completed: {}", self.snapshots_completed)?;
        writeln!(f, "Snapshots failed:    {}", self.snapshots_failed)?;
        writeln!(f, "Snapshots timed out: {}", self.snapshots_timed_out)?;
        writeln!(f, "Records seen:        {}", self.records_seen)?;
        writeln!(f, "Posts stored:        {}", self.posts_inserted)?;
        writeln!(f, "Posts deduped:       {}", self.posts_duplicate)?;
        writeln!(f, "Profiles stored:     {}", self.profiles_inserted)?;
        writeln!(f, "Profiles deduped:    {}", self.profiles_duplicate)?;
        writeln!(f, "Records rejected:    {}", self.records_rejected)?;
        writeln!(f, "Handles queued:      {}", self.handles_queued)?;
        writeln!(f, "Keywords discovered: {}", self.keywords_discovered)?;
        Ok(())
    }
}

pub struct DriverConfig {
    pub platform: Platform,
    pub target_profile_count: i64,
    pub max_iterations: u32,
    pub iteration_delay: Duration,
}

pub struct RunDriver {
    coordinator: Coordinator,
    store: Arc<dyn LeadStore>,
    keywords: KeywordManager,
    config: DriverConfig,
    stop: Arc<AtomicBool>,
}

impl RunDriver {
    pub fn new(
        mut coordinator: Coordinator,
        store: Arc<dyn LeadStore>,
        keywords: KeywordManager,
        config: DriverConfig,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        coordinator.bind_stop(stop.clone());
        Self {
            coordinator,
            store,
            keywords,
            config,
            stop,
        }
    }

    /// Flag checked between driver iterations, between polls, and between
    /// download attempts. Setting it (from a signal handler) abandons any
    /// in-flight snapshot wait and ends the run cleanly.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Run to completion. Always returns the accumulated stats, even when the
    /// run ends on a store failure, so the caller can report and export what
    /// was gathered.
    pub async fn run(mut self) -> RunStats {
        let mut stats = RunStats::default();
        let platform = self.config.platform;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                info!("Shutdown requested, ending run");
                break;
            }
            if stats.iterations >= self.config.max_iterations {
                info!(cap = self.config.max_iterations, "Iteration cap reached");
                break;
            }
            let stored = match self.store.profile_count(platform).await {
                Ok(count) => count,
                Err(e) => {
                    error!(error = %e, "Store unavailable, ending run");
                    break;
                }
            };
            if stored >= self.config.target_profile_count {
                info!(stored, target = self.config.target_profile_count, "Profile target reached");
                break;
            }

            let Some(term) = self.keywords.next_term() else {
                info!("All search terms exhausted");
                break;
            };
            stats.iterations += 1;

            match self.store.try_claim_term(&term).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(term = %term.keyword, "Term already used by an earlier run, skipping");
                    continue;
                }
                Err(e) => {
                    error!(term = %term.keyword, error = %e, "Term claim failed, ending run");
                    break;
                }
            }
            stats.terms_used += 1;

            match self.coordinator.run_term(&term).await {
                Ok(outcome) => {
                    let mined = outcome.discovered_keywords.len() as u32;
                    stats.keywords_discovered += mined;
                    stats.absorb(&outcome);
                    self.keywords
                        .absorb(outcome.discovered_keywords.into_iter());
                    info!(
                        term = %term.keyword,
                        state = %outcome.job_state,
                        profiles = outcome.profiles_inserted,
                        posts = outcome.posts_inserted,
                        keywords = mined,
                        "Iteration finished"
                    );
                }
                Err(e) => {
                    warn!(term = %term.keyword, error = %e, "Iteration failed");
                    stats.terms_failed += 1;
                }
            }

            tokio::time::sleep(self.config.iteration_delay).await;
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::coordinator::Coordinator;
    use crate::keywords::{fallback_terms, primary_terms};
    use crate::platform::PlatformAdapter;
    use crate::testing::{MemoryStore, MockSnapshotApi};
    use brightdata_client::{JobStatus, RetryPolicy, SnapshotError};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            poll_interval: Duration::from_millis(1),
            max_wait: Duration::from_millis(10),
            download_attempts: 2,
            download_delay: Duration::from_millis(1),
        }
    }

    fn driver(
        api: Arc<MockSnapshotApi>,
        store: Arc<MemoryStore>,
        config: DriverConfig,
    ) -> RunDriver {
        let platform = config.platform;
        let coordinator = Coordinator::new(
            api,
            store.clone(),
            PlatformAdapter::for_platform(platform),
            fast_policy(),
            10,
        );
        let keywords = KeywordManager::new(platform, vec![]);
        RunDriver::new(coordinator, store, keywords, config)
    }

    fn config(platform: Platform) -> DriverConfig {
        DriverConfig {
            platform,
            target_profile_count: 5000,
            max_iterations: 50,
            iteration_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn stops_when_profile_target_is_met() {
        let api = Arc::new(MockSnapshotApi::new());
        api.script_trigger(Ok("job123".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![
            json!({"profile_handle": "alice", "bio": "NYC based, a@x.com"}),
        ]));
        let store = Arc::new(MemoryStore::new());
        let mut cfg = config(Platform::Snapchat);
        cfg.target_profile_count = 1;

        let stats = driver(api, store.clone(), cfg).run().await;

        assert_eq!(stats.iterations, 1);
        assert_eq!(stats.profiles_inserted, 1);
        assert_eq!(stats.snapshots_completed, 1);
        assert_eq!(store.profile_count_sync(Platform::Snapchat), 1);
    }

    #[tokio::test]
    async fn exhausted_keywords_terminate_the_run() {
        // Every trigger fails, so no bios are mined and the keyword lists
        // drain without replenishment.
        let api = Arc::new(MockSnapshotApi::new());
        let total = primary_terms().len() + fallback_terms(Platform::TikTok).len();
        for _ in 0..total {
            api.script_trigger(Err(SnapshotError::Network("connection refused".into())));
        }
        let store = Arc::new(MemoryStore::new());

        let stats = driver(api, store, config(Platform::TikTok)).run().await;

        assert_eq!(stats.iterations as usize, total);
        assert_eq!(stats.terms_failed as usize, total);
        assert_eq!(stats.profiles_inserted, 0);
    }

    #[tokio::test]
    async fn iteration_cap_bounds_the_run() {
        let api = Arc::new(MockSnapshotApi::new());
        for _ in 0..3 {
            api.script_trigger(Err(SnapshotError::Network("down".into())));
        }
        let store = Arc::new(MemoryStore::new());
        let mut cfg = config(Platform::Snapchat);
        cfg.max_iterations = 3;

        let stats = driver(api, store, cfg).run().await;

        assert_eq!(stats.iterations, 3);
    }

    #[tokio::test]
    async fn already_seeded_store_short_circuits() {
        let api = Arc::new(MockSnapshotApi::new());
        let store = Arc::new(MemoryStore::new());
        store.seed_profiles(Platform::Snapchat, 5);
        let mut cfg = config(Platform::Snapchat);
        cfg.target_profile_count = 5;

        let stats = driver(api.clone(), store, cfg).run().await;

        assert_eq!(stats.iterations, 0);
        assert_eq!(api.trigger_calls(), 0);
    }

    #[tokio::test]
    async fn claimed_terms_are_skipped_not_failed() {
        // A previous run already claimed the whole primary list.
        let store = Arc::new(MemoryStore::new());
        for keyword in primary_terms() {
            let term = leadlens_common::SearchTerm::new(Platform::Snapchat, keyword);
            assert!(store.try_claim_term(&term).await.unwrap());
        }
        let api = Arc::new(MockSnapshotApi::new());
        let total = primary_terms().len() + fallback_terms(Platform::Snapchat).len();
        for _ in 0..total {
            api.script_trigger(Err(SnapshotError::Network("down".into())));
        }

        let stats = driver(api, store, config(Platform::Snapchat)).run().await;

        let fallback = fallback_terms(Platform::Snapchat).len();
        assert_eq!(stats.terms_used as usize, fallback);
        assert_eq!(stats.terms_failed as usize, fallback);
        assert_eq!(stats.iterations as usize, primary_terms().len() + fallback);
    }

    #[tokio::test]
    async fn stop_flag_ends_the_run_before_any_work() {
        let api = Arc::new(MockSnapshotApi::new());
        let store = Arc::new(MemoryStore::new());
        let driver = driver(api.clone(), store, config(Platform::Snapchat));
        driver.stop_handle().store(true, Ordering::SeqCst);

        let stats = driver.run().await;

        assert_eq!(stats.iterations, 0);
        assert_eq!(api.trigger_calls(), 0);
    }

    #[tokio::test]
    async fn mined_keywords_feed_later_iterations() {
        let api = Arc::new(MockSnapshotApi::new());
        // First term yields a bio that mines "Tribeca"; subsequent triggers
        // fail until the lists drain.
        api.script_trigger(Ok("job-1".to_string()));
        api.script_poll(&[JobStatus::Ready]);
        api.script_download(Ok(vec![
            json!({"profile_handle": "walker", "bio": "📍 Tribeca daily walks"}),
        ]));
        let total = primary_terms().len() + fallback_terms(Platform::Snapchat).len() + 1;
        for _ in 0..total {
            api.script_trigger(Err(SnapshotError::Network("down".into())));
        }
        let store = Arc::new(MemoryStore::new());

        let stats = driver(api, store.clone(), config(Platform::Snapchat))
            .run()
            .await;

        assert_eq!(stats.keywords_discovered, 1);
        // The mined keyword got its own iteration after the primary list.
        assert_eq!(stats.iterations as usize, total);
    }
}
