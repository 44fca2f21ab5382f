//! Application configuration types.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// OpenAQ API key (sent as `X-API-Key`).
    #[serde(default)]
    pub openaq_api_key: String,

    /// WeatherAPI key. Empty disables weather in location reports.
    #[serde(default)]
    pub weather_api_key: String,

    /// Air-quality provider settings.
    #[serde(default)]
    pub openaq: OpenAqConfig,

    /// Weather provider settings.
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Refresh loop settings.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Path of the JSON settings store.
    #[serde(default = "default_settings_path")]
    pub settings_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAqConfig {
    #[serde(default = "default_openaq_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_openaq_timeout")]
    pub timeout_secs: u64,

    /// Max locations requested per refresh.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,

    /// OpenAQ parameter ids whose bulk latest values are merged into each
    /// refreshed location set. The defaults are pm10, pm25, no2 (ppm) and
    /// o3 (ppm).
    #[serde(default = "default_latest_parameter_ids")]
    pub latest_parameter_ids: Vec<u32>,

    /// Measurement rows requested per sensor for location reports.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_weather_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,

    /// Forecast horizon in days (provider caps at 10).
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u32,
}

/// Which storage backs the TTL cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Disk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_backend")]
    pub backend: CacheBackendKind,

    /// Directory for the disk backend.
    #[serde(default = "default_cache_dir")]
    pub dir: String,

    /// TTL for the whole-dataset entry, in seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Periodic refresh interval in seconds.
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,

    /// Locations at or above this AQI are reported as alerts.
    #[serde(default = "default_alert_threshold")]
    pub aqi_alert_threshold: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────

pub const DEFAULT_FETCH_LIMIT: usize = 500;
pub const MAX_FETCH_LIMIT: usize = 1000;
pub const MAX_FORECAST_DAYS: u32 = 10;

fn default_settings_path() -> String {
    "data/settings.json".into()
}

fn default_openaq_url() -> String {
    "https://api.openaq.org/v3".into()
}
fn default_openaq_timeout() -> u64 {
    30
}
fn default_fetch_limit() -> usize {
    DEFAULT_FETCH_LIMIT
}
fn default_latest_parameter_ids() -> Vec<u32> {
    vec![1, 2, 7, 10]
}
fn default_history_limit() -> usize {
    168
}

fn default_weather_url() -> String {
    "http://api.weatherapi.com/v1".into()
}
fn default_weather_timeout() -> u64 {
    10
}
fn default_forecast_days() -> u32 {
    3
}

fn default_cache_backend() -> CacheBackendKind {
    CacheBackendKind::Disk
}
fn default_cache_dir() -> String {
    "data/cache".into()
}
fn default_cache_ttl() -> u64 {
    300
}

fn default_refresh_interval() -> u64 {
    300
}
fn default_alert_threshold() -> u16 {
    150
}

impl Default for OpenAqConfig {
    fn default() -> Self {
        Self {
            base_url: default_openaq_url(),
            timeout_secs: default_openaq_timeout(),
            fetch_limit: default_fetch_limit(),
            latest_parameter_ids: default_latest_parameter_ids(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: default_weather_url(),
            timeout_secs: default_weather_timeout(),
            forecast_days: default_forecast_days(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_cache_backend(),
            dir: default_cache_dir(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
            aqi_alert_threshold: default_alert_threshold(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openaq_api_key: String::new(),
            weather_api_key: String::new(),
            openaq: OpenAqConfig::default(),
            weather: WeatherConfig::default(),
            cache: CacheConfig::default(),
            refresh: RefreshConfig::default(),
            settings_path: default_settings_path(),
        }
    }
}
