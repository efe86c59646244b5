use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

/// Create tables and unique indexes if they do not exist. Idempotent; runs at
/// every startup. The unique indexes are the dedup guarantee: racing writers
/// on the same natural key leave exactly one row.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS profiles (
            id BIGSERIAL PRIMARY KEY,
            platform TEXT NOT NULL,
            handle TEXT NOT NULL,
            display_name TEXT,
            bio TEXT,
            emails TEXT[] NOT NULL DEFAULT '{}',
            has_emails BOOLEAN NOT NULL DEFAULT FALSE,
            followers BIGINT,
            is_verified BOOLEAN NOT NULL DEFAULT FALSE,
            profile_url TEXT,
            avatar_url TEXT,
            discovered_keywords TEXT[] NOT NULL DEFAULT '{}',
            snapshot_id TEXT NOT NULL,
            extracted_at TIMESTAMPTZ NOT NULL
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS profiles_platform_handle
            ON profiles (platform, handle)",
        "CREATE TABLE IF NOT EXISTS posts (
            id BIGSERIAL PRIMARY KEY,
            platform TEXT NOT NULL,
            post_id TEXT NOT NULL,
            handle TEXT,
            title TEXT,
            description TEXT,
            comments BIGINT,
            shares BIGINT,
            views BIGINT,
            likes BIGINT,
            video_url TEXT,
            thumbnail_url TEXT,
            hashtags TEXT[] NOT NULL DEFAULT '{}',
            snapshot_id TEXT NOT NULL,
            extracted_at TIMESTAMPTZ NOT NULL
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS posts_platform_post_id
            ON posts (platform, post_id)",
        "CREATE TABLE IF NOT EXISTS search_terms (
            id BIGSERIAL PRIMARY KEY,
            platform TEXT NOT NULL,
            keyword TEXT NOT NULL,
            used_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS search_terms_platform_keyword
            ON search_terms (platform, keyword)",
        "CREATE TABLE IF NOT EXISTS snapshot_jobs (
            snapshot_id TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_checked TIMESTAMPTZ NOT NULL DEFAULT now(),
            downloaded_at TIMESTAMPTZ
        )",
        "CREATE TABLE IF NOT EXISTS raw_snapshots (
            id BIGSERIAL PRIMARY KEY,
            snapshot_id TEXT NOT NULL,
            platform TEXT NOT NULL,
            payload JSONB NOT NULL,
            fetched_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS raw_snapshots_snapshot_id
            ON raw_snapshots (snapshot_id)",
        "CREATE TABLE IF NOT EXISTS lead_queue (
            id BIGSERIAL PRIMARY KEY,
            platform TEXT NOT NULL,
            handle TEXT NOT NULL,
            profile_url TEXT NOT NULL,
            discovered_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            claimed_at TIMESTAMPTZ
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS lead_queue_platform_handle
            ON lead_queue (platform, handle)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    info!("Store migration complete");
    Ok(())
}
