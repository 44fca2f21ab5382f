//! Configuration loader: merges `.env`, `config.toml` and environment variables.

use common::config::{CacheBackendKind, MAX_FETCH_LIMIT, MAX_FORECAST_DAYS};
use common::{AppConfig, Error};
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_cache_backend(raw: &str) -> Result<CacheBackendKind, Error> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" | "simple" => Ok(CacheBackendKind::Memory),
        "disk" | "filesystem" => Ok(CacheBackendKind::Disk),
        _ => Err(Error::Config("CACHE_TYPE must be one of: memory, disk".into())),
    }
}

pub fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.openaq.base_url.trim().is_empty() {
        issues.push("openaq.base_url must not be empty".into());
    }
    if config.openaq.timeout_secs == 0 {
        issues.push("openaq.timeout_secs must be > 0".into());
    }
    if config.openaq.fetch_limit == 0 || config.openaq.fetch_limit > MAX_FETCH_LIMIT {
        issues.push(format!("openaq.fetch_limit must be in [1,{MAX_FETCH_LIMIT}]"));
    }
    if config.openaq.history_limit == 0 || config.openaq.history_limit > MAX_FETCH_LIMIT {
        issues.push(format!("openaq.history_limit must be in [1,{MAX_FETCH_LIMIT}]"));
    }

    if config.weather.base_url.trim().is_empty() {
        issues.push("weather.base_url must not be empty".into());
    }
    if config.weather.timeout_secs == 0 {
        issues.push("weather.timeout_secs must be > 0".into());
    }
    if config.weather.forecast_days == 0 || config.weather.forecast_days > MAX_FORECAST_DAYS {
        issues.push(format!("weather.forecast_days must be in [1,{MAX_FORECAST_DAYS}]"));
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }
    if config.cache.backend == CacheBackendKind::Disk && config.cache.dir.trim().is_empty() {
        issues.push("cache.dir is required for the disk backend".into());
    }

    if config.refresh.interval_secs == 0 {
        issues.push("refresh.interval_secs must be > 0".into());
    }
    if config.refresh.aqi_alert_threshold > aqi::AQI_MAX {
        issues.push(format!("refresh.aqi_alert_threshold must be <= {}", aqi::AQI_MAX));
    }

    if config.settings_path.trim().is_empty() {
        issues.push("settings_path must not be empty".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides through `lookup` (the process environment in
/// `load_config`, a map in tests).
fn apply_env_overrides(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(key) = lookup("OPENAQ_API_KEY") {
        config.openaq_api_key = key;
    }
    if let Some(key) = lookup("WEATHER_API_KEY") {
        config.weather_api_key = key;
    }
    if let Some(raw) = lookup("CACHE_TIMEOUT") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "CACHE_TIMEOUT")?;
    }
    if let Some(raw) = lookup("CACHE_TYPE") {
        config.cache.backend = parse_cache_backend(&raw)?;
    }
    if let Some(raw) = lookup("DATA_REFRESH_INTERVAL") {
        config.refresh.interval_secs = parse_positive_u64(&raw, "DATA_REFRESH_INTERVAL")?;
    }
    if let Some(raw) = lookup("AQI_ALERT_THRESHOLD") {
        config.refresh.aqi_alert_threshold = raw
            .trim()
            .parse::<u16>()
            .map_err(|_| Error::Config("AQI_ALERT_THRESHOLD must be an integer in [0,500]".into()))?;
    }
    if let Some(raw) = lookup("OPENAQ_FETCH_LIMIT") {
        let parsed = parse_positive_u64(&raw, "OPENAQ_FETCH_LIMIT")?;
        config.openaq.fetch_limit = usize::try_from(parsed)
            .map_err(|_| Error::Config("OPENAQ_FETCH_LIMIT is too large".into()))?;
    }
    Ok(())
}

/// Load configuration from defaults, `config.toml` and the environment.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    if config.openaq_api_key.trim().is_empty() {
        tracing::warn!("OPENAQ_API_KEY is not set; the provider may reject requests");
    }

    validate_config(&config)?;

    Ok(config)
}
