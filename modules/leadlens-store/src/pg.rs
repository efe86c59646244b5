use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Row};

use leadlens_common::{
    InsertOutcome, JobState, Platform, Post, Profile, QueuedHandle, SearchTerm,
};

use crate::LeadStore;

/// Postgres-backed store. All dedup rests on the unique indexes created by
/// [`crate::migrate`]; inserts race safely via `ON CONFLICT DO NOTHING`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn outcome(rows_affected: u64) -> InsertOutcome {
    if rows_affected > 0 {
        InsertOutcome::Inserted
    } else {
        InsertOutcome::AlreadyExists
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn insert_profile_if_absent(&self, profile: &Profile) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO profiles
                (platform, handle, display_name, bio, emails, has_emails,
                 followers, is_verified, profile_url, avatar_url,
                 discovered_keywords, snapshot_id, extracted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (platform, handle) DO NOTHING",
        )
        .bind(profile.platform.as_str())
        .bind(&profile.handle)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.emails)
        .bind(profile.has_emails())
        .bind(profile.followers)
        .bind(profile.is_verified)
        .bind(&profile.profile_url)
        .bind(&profile.avatar_url)
        .bind(&profile.discovered_keywords)
        .bind(&profile.snapshot_id)
        .bind(profile.extracted_at)
        .execute(&self.pool)
        .await?;

        Ok(outcome(result.rows_affected()))
    }

    async fn insert_post_if_absent(&self, post: &Post) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO posts
                (platform, post_id, handle, title, description, comments,
                 shares, views, likes, video_url, thumbnail_url, hashtags,
                 snapshot_id, extracted_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (platform, post_id) DO NOTHING",
        )
        .bind(post.platform.as_str())
        .bind(&post.post_id)
        .bind(&post.handle)
        .bind(&post.title)
        .bind(&post.description)
        .bind(post.comments)
        .bind(post.shares)
        .bind(post.views)
        .bind(post.likes)
        .bind(&post.video_url)
        .bind(&post.thumbnail_url)
        .bind(&post.hashtags)
        .bind(&post.snapshot_id)
        .bind(post.extracted_at)
        .execute(&self.pool)
        .await?;

        Ok(outcome(result.rows_affected()))
    }

    async fn record_raw_snapshot(
        &self,
        platform: Platform,
        snapshot_id: &str,
        records: &[Value],
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO raw_snapshots (snapshot_id, platform, payload)
             VALUES ($1, $2, $3)
             ON CONFLICT (snapshot_id) DO NOTHING",
        )
        .bind(snapshot_id)
        .bind(platform.as_str())
        .bind(Value::Array(records.to_vec()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_job_status(
        &self,
        platform: Platform,
        snapshot_id: &str,
        state: JobState,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO snapshot_jobs (snapshot_id, platform, status)
             VALUES ($1, $2, $3)
             ON CONFLICT (snapshot_id)
             DO UPDATE SET status = $3, last_checked = now()",
        )
        .bind(snapshot_id)
        .bind(platform.as_str())
        .bind(state.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_downloaded(&self, snapshot_id: &str) -> Result<()> {
        sqlx::query("UPDATE snapshot_jobs SET downloaded_at = $2 WHERE snapshot_id = $1")
            .bind(snapshot_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_claim_term(&self, term: &SearchTerm) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO search_terms (platform, keyword)
             VALUES ($1, $2)
             ON CONFLICT (platform, keyword) DO NOTHING",
        )
        .bind(term.platform.as_str())
        .bind(&term.keyword)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn enqueue_handle(
        &self,
        platform: Platform,
        handle: &str,
        profile_url: &str,
    ) -> Result<InsertOutcome> {
        let result = sqlx::query(
            "INSERT INTO lead_queue (platform, handle, profile_url)
             VALUES ($1, $2, $3)
             ON CONFLICT (platform, handle) DO NOTHING",
        )
        .bind(platform.as_str())
        .bind(handle)
        .bind(profile_url)
        .execute(&self.pool)
        .await?;
        Ok(outcome(result.rows_affected()))
    }

    async fn take_queued_handles(&self, platform: Platform, limit: i64) -> Result<Vec<QueuedHandle>> {
        // SKIP LOCKED keeps concurrent drivers from claiming the same rows.
        let rows = sqlx::query(
            "UPDATE lead_queue SET claimed_at = now()
             WHERE id IN (
                 SELECT id FROM lead_queue
                 WHERE platform = $1 AND claimed_at IS NULL
                 ORDER BY discovered_at
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING handle, profile_url",
        )
        .bind(platform.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| QueuedHandle {
                handle: row.get("handle"),
                profile_url: row.get("profile_url"),
            })
            .collect())
    }

    async fn has_profile(&self, platform: Platform, handle: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE platform = $1 AND handle = $2)",
        )
        .bind(platform.as_str())
        .bind(handle)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn profile_count(&self, platform: Platform) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM profiles WHERE platform = $1",
        )
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn post_count(&self, platform: Platform) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM posts WHERE platform = $1",
        )
        .bind(platform.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn all_profiles(&self, platform: Platform) -> Result<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT handle, display_name, bio, emails, followers, is_verified,
                    profile_url, avatar_url, discovered_keywords, snapshot_id,
                    extracted_at
             FROM profiles WHERE platform = $1
             ORDER BY extracted_at",
        )
        .bind(platform.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Profile {
                platform,
                handle: row.get("handle"),
                display_name: row.get("display_name"),
                bio: row.get("bio"),
                emails: row.get("emails"),
                followers: row.get("followers"),
                is_verified: row.get("is_verified"),
                profile_url: row.get("profile_url"),
                avatar_url: row.get("avatar_url"),
                discovered_keywords: row.get("discovered_keywords"),
                snapshot_id: row.get("snapshot_id"),
                extracted_at: row.get("extracted_at"),
            })
            .collect())
    }
}
