use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use brightdata_client::{BrightDataClient, RetryPolicy};
use leadlens_common::{Config, Platform};
use leadlens_scout::coordinator::Coordinator;
use leadlens_scout::driver::{DriverConfig, RunDriver};
use leadlens_scout::keywords::KeywordManager;
use leadlens_scout::platform::PlatformAdapter;
use leadlens_store::{migrate, LeadStore, PgStore};

#[derive(Parser, Debug)]
#[command(name = "leadlens-scout", about = "Harvest creator profiles from social platforms")]
struct Args {
    /// Platform to harvest: instagram, tiktok, or snapchat
    #[arg(long, default_value = "snapchat")]
    platform: Platform,

    /// Override the profile target from the environment
    #[arg(long)]
    target: Option<i64>,

    /// Extra seed keywords, ahead of the discovered and fallback lists
    #[arg(long = "seed")]
    seeds: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("leadlens=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    info!(platform = %args.platform, "LeadLens scout starting...");

    let store = Arc::new(PgStore::connect(&config.database_url).await?);
    migrate(store.pool()).await?;

    let api = Arc::new(BrightDataClient::new(config.brightdata_api_key.clone()));
    let adapter = PlatformAdapter::for_platform(args.platform);
    let policy = RetryPolicy {
        poll_interval: Duration::from_secs(config.poll_interval_secs),
        max_wait: Duration::from_secs(config.max_wait_secs),
        download_attempts: config.download_attempts,
        download_delay: Duration::from_secs(config.download_delay_secs),
    };
    let coordinator = Coordinator::new(
        api,
        store.clone(),
        adapter,
        policy,
        config.profile_batch_limit,
    );

    let keywords = KeywordManager::new(args.platform, args.seeds);
    let driver = RunDriver::new(
        coordinator,
        store.clone(),
        keywords,
        DriverConfig {
            platform: args.platform,
            target_profile_count: args.target.unwrap_or(config.target_profile_count),
            max_iterations: config.max_iterations,
            iteration_delay: Duration::from_secs(config.iteration_delay_secs),
        },
    );

    // On Ctrl-C, abandon any in-flight snapshot wait and end the run; stats
    // and the export pass still happen below.
    let stop = driver.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping after the current step");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let stats = driver.run().await;
    info!("{stats}");

    export_profiles(store.as_ref(), args.platform).await?;
    Ok(())
}

/// Dump every stored profile for the platform to a timestamped JSON file.
async fn export_profiles(store: &dyn LeadStore, platform: Platform) -> Result<()> {
    let profiles = store.all_profiles(platform).await?;
    if profiles.is_empty() {
        info!("No profiles to export");
        return Ok(());
    }
    let with_emails = profiles.iter().filter(|p| p.has_emails()).count();
    let path = format!(
        "{}_profiles_{}.json",
        platform,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    );
    let json = serde_json::to_string_pretty(&profiles)?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("failed to write export file {path}"))?;
    info!(path = %path, total = profiles.len(), with_emails, "Exported profiles");
    Ok(())
}
