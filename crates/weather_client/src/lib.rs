//! WeatherAPI client.
//!
//! Current conditions and daily forecast for a coordinate pair, plus a
//! rule-based read of how the weather affects pollutant dispersion. Only the
//! location report uses this; the refresh pipeline never calls it.

pub mod correlation;

pub use correlation::{analyze_correlation, CorrelationAnalysis, Impact, OverallConditions};

use std::time::Duration;

use common::config::{WeatherConfig, MAX_FORECAST_DAYS};
use common::Error;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const USER_AGENT: &str = "airwatch/0.1 (air quality dashboard)";

/// WeatherAPI client. The key travels as the `key` query parameter.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

// ── WeatherAPI response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CurrentResponse {
    #[serde(default)]
    pub current: Option<CurrentBlock>,
}

#[derive(Debug, Deserialize)]
pub struct CurrentBlock {
    pub temp_c: Option<f64>,
    pub feelslike_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_kph: Option<f64>,
    pub wind_degree: Option<f64>,
    pub wind_dir: Option<String>,
    pub pressure_mb: Option<f64>,
    pub precip_mm: Option<f64>,
    pub cloud: Option<f64>,
    pub uv: Option<f64>,
    pub vis_km: Option<f64>,
    #[serde(default)]
    pub condition: Option<Condition>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub forecast: Option<ForecastBlock>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastBlock {
    #[serde(default)]
    pub forecastday: Vec<ForecastDayRaw>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastDayRaw {
    pub date: Option<String>,
    #[serde(default)]
    pub day: Option<DayBlock>,
}

#[derive(Debug, Deserialize)]
pub struct DayBlock {
    pub maxtemp_c: Option<f64>,
    pub mintemp_c: Option<f64>,
    pub avgtemp_c: Option<f64>,
    pub maxwind_kph: Option<f64>,
    pub totalprecip_mm: Option<f64>,
    pub avghumidity: Option<f64>,
    #[serde(default)]
    pub condition: Option<Condition>,
    pub uv: Option<f64>,
}

// ── Output types ──────────────────────────────────────────────────────

/// Current conditions at a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    pub temperature_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub humidity: Option<f64>,
    pub wind_speed_kph: Option<f64>,
    pub wind_degree: Option<f64>,
    pub wind_direction: Option<String>,
    pub pressure_mb: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub uv_index: Option<f64>,
    pub visibility_km: Option<f64>,
    pub condition: Option<String>,
    pub last_updated: Option<String>,
}

/// One forecast day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastDay {
    pub date: Option<String>,
    pub max_temp_c: Option<f64>,
    pub min_temp_c: Option<f64>,
    pub avg_temp_c: Option<f64>,
    pub max_wind_kph: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub condition: Option<String>,
    pub uv_index: Option<f64>,
}

impl From<CurrentBlock> for WeatherSnapshot {
    fn from(c: CurrentBlock) -> Self {
        Self {
            temperature_c: c.temp_c,
            feels_like_c: c.feelslike_c,
            humidity: c.humidity,
            wind_speed_kph: c.wind_kph,
            wind_degree: c.wind_degree,
            wind_direction: c.wind_dir,
            pressure_mb: c.pressure_mb,
            precipitation_mm: c.precip_mm,
            cloud_cover: c.cloud,
            uv_index: c.uv,
            visibility_km: c.vis_km,
            condition: c.condition.and_then(|c| c.text),
            last_updated: c.last_updated,
        }
    }
}

impl From<ForecastDayRaw> for ForecastDay {
    fn from(raw: ForecastDayRaw) -> Self {
        let Some(day) = raw.day else {
            return Self {
                date: raw.date,
                ..Self::default()
            };
        };
        Self {
            date: raw.date,
            max_temp_c: day.maxtemp_c,
            min_temp_c: day.mintemp_c,
            avg_temp_c: day.avgtemp_c,
            max_wind_kph: day.maxwind_kph,
            total_precip_mm: day.totalprecip_mm,
            avg_humidity: day.avghumidity,
            condition: day.condition.and_then(|c| c.text),
            uv_index: day.uv,
        }
    }
}

// ── Implementation ────────────────────────────────────────────────────

impl WeatherClient {
    pub fn new(cfg: &WeatherConfig, api_key: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build WeatherAPI HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn get_text(&self, endpoint: &str, query: &[(&str, String)]) -> Result<String, Error> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("Fetching WeatherAPI {}", url);

        let resp = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(format!("WeatherAPI {endpoint}: {e}"))
                } else {
                    Error::Http(format!("WeatherAPI {endpoint}: {e}"))
                }
            })?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            warn!("WeatherAPI returned {} for {}", status, endpoint);
            return Err(Error::from_status(status, &body));
        }

        resp.text()
            .await
            .map_err(|e| Error::Http(format!("WeatherAPI {endpoint}: failed to read body: {e}")))
    }

    /// Current conditions. `Ok(None)` when the payload has no `current` block.
    pub async fn current(&self, lat: f64, lon: f64) -> Result<Option<WeatherSnapshot>, Error> {
        let body = self
            .get_text("current.json", &[("q", format!("{lat},{lon}"))])
            .await?;
        parse_current(&body)
    }

    /// Daily forecast, `days` capped at the provider's 10-day horizon.
    pub async fn forecast(&self, lat: f64, lon: f64, days: u32) -> Result<Vec<ForecastDay>, Error> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let body = self
            .get_text(
                "forecast.json",
                &[("q", format!("{lat},{lon}")), ("days", days.to_string())],
            )
            .await?;
        parse_forecast(&body)
    }
}

fn parse_current(body: &str) -> Result<Option<WeatherSnapshot>, Error> {
    let resp: CurrentResponse = serde_json::from_str(body)?;
    Ok(resp.current.map(WeatherSnapshot::from))
}

fn parse_forecast(body: &str) -> Result<Vec<ForecastDay>, Error> {
    let resp: ForecastResponse = serde_json::from_str(body)?;
    Ok(resp
        .forecast
        .map(|f| f.forecastday.into_iter().map(ForecastDay::from).collect())
        .unwrap_or_default())
}
