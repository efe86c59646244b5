use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // Scraping provider
    pub brightdata_api_key: String,

    // Run control
    pub target_profile_count: i64,
    pub max_iterations: u32,
    pub iteration_delay_secs: u64,
    pub profile_batch_limit: i64,

    // Snapshot pacing
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    pub download_attempts: u32,
    pub download_delay_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            brightdata_api_key: required_env("BRIGHTDATA_API_KEY"),
            target_profile_count: env_or("TARGET_PROFILE_COUNT", 5000),
            max_iterations: env_or("MAX_ITERATIONS", 50),
            iteration_delay_secs: env_or("ITERATION_DELAY_SECS", 15),
            profile_batch_limit: env_or("PROFILE_BATCH_LIMIT", 10),
            poll_interval_secs: env_or("POLL_INTERVAL_SECS", 30),
            max_wait_secs: env_or("MAX_WAIT_SECS", 3600),
            download_attempts: env_or("DOWNLOAD_ATTEMPTS", 5),
            download_delay_secs: env_or("DOWNLOAD_DELAY_SECS", 30),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got {v:?}")),
        Err(_) => default,
    }
}
