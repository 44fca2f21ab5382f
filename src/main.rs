//! airwatch: air quality monitor.
//!
//! Single-binary Tokio application that:
//! 1. Fetches monitoring locations from OpenAQ
//! 2. Normalizes every reading to an AQI value and category
//! 3. Serves repeated refreshes from a TTL cache, falling back to stale data
//!    when the provider is down
//! 4. Logs locations that cross the alert threshold

mod config;
mod report;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn};

use common::config::CacheBackendKind;
use openaq_client::OpenAqClient;
use refresh::settings::{AQI_ALERT_THRESHOLD, REFRESH_INTERVAL};
use refresh::{
    parsed_setting, CacheBackend, Clock, DiskBackend, FileSettingsStore, MemoryBackend,
    RefreshOutcome, RefreshPipeline, SettingsStore, SystemClock, TtlCache,
};

/// Air quality monitor
#[derive(Parser)]
#[command(name = "airwatch", about = "Air quality monitor over the OpenAQ feed")]
struct Cli {
    /// Run a single refresh, print the summary, then exit.
    #[arg(long)]
    once: bool,

    /// Bypass the cache for the first refresh.
    #[arg(long)]
    force: bool,

    /// Print a JSON report for one location id, then exit.
    #[arg(long, value_name = "LOCATION_ID")]
    report: Option<String>,

    /// Search provider locations by name, then exit.
    #[arg(long, value_name = "NAME")]
    search: Option<String>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const TOP_LOCATIONS: usize = 10;
const SEARCH_LIMIT: usize = 10;

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "airwatch=info,aqi=info,openaq_client=info,weather_client=info,refresh=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("AirWatch starting up...");

    // Load configuration.
    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Provider: {} (limit={}, timeout={}s)",
        cfg.openaq.base_url, cfg.openaq.fetch_limit, cfg.openaq.timeout_secs
    );
    info!(
        "Cache: {:?} ttl={}s, refresh every {}s, alert at AQI {}",
        cfg.cache.backend, cfg.cache.ttl_secs, cfg.refresh.interval_secs, cfg.refresh.aqi_alert_threshold
    );

    let settings: Arc<dyn SettingsStore> = match FileSettingsStore::open(&cfg.settings_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Settings store error: {}", e);
            std::process::exit(1);
        }
    };

    let backend: Arc<dyn CacheBackend> = match cfg.cache.backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        CacheBackendKind::Disk => match DiskBackend::open(&cfg.cache.dir) {
            Ok(b) => Arc::new(b),
            Err(e) => {
                warn!("Disk cache unavailable, using memory: {}", e);
                Arc::new(MemoryBackend::new())
            }
        },
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(TtlCache::new(backend, clock.clone()));

    let openaq = match OpenAqClient::new(&cfg.openaq, &cfg.openaq_api_key) {
        Ok(c) => c,
        Err(e) => {
            error!("OpenAQ client error: {}", e);
            std::process::exit(1);
        }
    };

    let pipeline = Arc::new(RefreshPipeline::new(
        cache.clone(),
        Arc::new(openaq.clone()),
        clock,
        cfg.openaq.fetch_limit,
        cfg.cache.ttl_secs,
    ));

    // ── Report mode ──────────────────────────────────────────────────
    if let Some(id) = cli.report.as_deref() {
        let snapshot = pipeline.refresh(cli.force).await;
        match report::build_report(&cfg, &openaq, &snapshot, id).await {
            Some(r) => match serde_json::to_string_pretty(&r) {
                Ok(json) => println!("{json}"),
                Err(e) => error!("Failed to render report: {}", e),
            },
            None => {
                error!("Location {} not found", id);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Search mode ──────────────────────────────────────────────────
    if let Some(name) = cli.search.as_deref() {
        match openaq.search_locations(name, SEARCH_LIMIT).await {
            Ok(raw) => {
                let found = aqi::normalize_batch(&raw);
                info!("{} locations match {:?}", found.len(), name);
                for loc in &found {
                    info!("  {:<10} {:<30} {} {}", loc.id, loc.name, loc.locality, loc.country_code);
                }
            }
            Err(e) => {
                error!("Search failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── One-shot mode ────────────────────────────────────────────────
    if cli.once {
        let threshold = parsed_setting(
            settings.as_ref(),
            AQI_ALERT_THRESHOLD,
            cfg.refresh.aqi_alert_threshold,
        );
        let outcome = pipeline.refresh(cli.force).await;
        print_summary(&outcome);
        log_alerts(&outcome, threshold);
        return;
    }

    // ── Spawn tasks ──────────────────────────────────────────────────
    info!("Spawning tasks...");

    // Task 1: Periodic refresh
    let rf_pipeline = pipeline.clone();
    let rf_settings = settings.clone();
    let rf_cfg = cfg.clone();
    let mut forced = cli.force;
    let refresh_handle = tokio::spawn(async move {
        loop {
            let interval_secs = parsed_setting(
                rf_settings.as_ref(),
                REFRESH_INTERVAL,
                rf_cfg.refresh.interval_secs,
            )
            .max(1);
            let threshold = parsed_setting(
                rf_settings.as_ref(),
                AQI_ALERT_THRESHOLD,
                rf_cfg.refresh.aqi_alert_threshold,
            );

            let outcome = rf_pipeline.refresh(forced).await;
            forced = false;
            log_alerts(&outcome, threshold);
            rf_pipeline.purge_cache();

            sleep(Duration::from_secs(interval_secs)).await;
        }
    });

    // Task 2: Heartbeat
    let hb_pipeline = pipeline.clone();
    let hb_cache = cache.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let snapshot = hb_pipeline.snapshot().await;
            let stats = hb_cache.stats();
            info!(
                "HEARTBEAT: stations={} countries={} source={:?} refreshed_at={} cache_entries={} expired={} backend={}",
                snapshot.station_count,
                snapshot.country_count,
                snapshot.source,
                snapshot.refreshed_at.to_rfc3339(),
                stats.entries,
                stats.expired,
                stats.backend
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("AirWatch is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = refresh_handle => {
            error!("Refresh task exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    info!("AirWatch shut down.");
}

fn print_summary(outcome: &RefreshOutcome) {
    info!(
        "Stations: {}  Countries: {}  Source: {:?}",
        outcome.station_count, outcome.country_count, outcome.source
    );
    for loc in aqi::rank_by_aqi(&outcome.locations).into_iter().take(TOP_LOCATIONS) {
        info!(
            "  {:>3} {:<30} {:<24} {} {}",
            loc.max_aqi,
            loc.max_aqi_category.label(),
            loc.name,
            loc.country_code,
            loc.dominant_pollutant.as_deref().unwrap_or("-"),
        );
    }
}

fn log_alerts(outcome: &RefreshOutcome, threshold: u16) {
    let alerts = outcome.above_threshold(threshold);
    if alerts.is_empty() {
        return;
    }
    warn!("{} locations at or above AQI {}", alerts.len(), threshold);
    for loc in alerts {
        warn!(
            "  ALERT {} ({}, {}): AQI {} {}",
            loc.name,
            loc.id,
            loc.country_code,
            loc.max_aqi,
            loc.max_aqi_category.label()
        );
    }
}
