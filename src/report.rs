//! `--report <ID>`: one location with per-sensor AQI, health advice, the
//! dominant sensor's recent history with insights and, when a weather key is
//! configured, current weather and its read on pollutant dispersion.

use aqi::{
    calculate_aqi, detect_trend, generate_insights, health_recommendation, normalize_location,
    sensor_statistics, table_concentration, AqiReading, HealthAdvice, Statistics, Trend,
    DEFAULT_TREND_WINDOW,
};
use common::{AppConfig, Error, Location, ProviderLocationRecord, SensorMeta};
use openaq_client::{attach_latest, Measurement, OpenAqClient};
use refresh::RefreshOutcome;
use serde::Serialize;
use tracing::{debug, info, warn};
use weather_client::{
    analyze_correlation, CorrelationAnalysis, ForecastDay, WeatherClient, WeatherSnapshot,
};

#[derive(Debug, Serialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub pollutant: String,
    pub units: String,
    pub value: f64,
    pub aqi: AqiReading,
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LocationReport {
    pub location: Location,
    pub readings: Vec<SensorReading>,
    pub health: HealthAdvice,
    pub history: Option<SensorHistory>,
    pub insights: Vec<String>,
    pub weather: Option<WeatherSnapshot>,
    pub forecast: Vec<ForecastDay>,
    pub correlation: Option<CorrelationAnalysis>,
}

/// Recent measurements of one sensor, summarized.
#[derive(Debug, Serialize)]
pub struct SensorHistory {
    pub sensor_id: String,
    pub pollutant: String,
    pub units: String,
    pub samples: usize,
    pub first_utc: Option<String>,
    pub last_utc: Option<String>,
    pub statistics: Option<Statistics>,
    pub trend: Trend,
}

fn summarize_history(meta: &SensorMeta, measurements: &[Measurement]) -> SensorHistory {
    let values: Vec<f64> = measurements.iter().map(|m| m.value).collect();
    SensorHistory {
        sensor_id: meta.id.clone(),
        pollutant: meta.display_name.clone(),
        units: meta.units.clone(),
        samples: values.len(),
        first_utc: measurements.first().and_then(|m| m.utc.clone()),
        last_utc: measurements.last().and_then(|m| m.utc.clone()),
        statistics: sensor_statistics(meta, &values),
        trend: detect_trend(&values, DEFAULT_TREND_WINDOW),
    }
}

/// Sensor whose history the report follows: the one behind the dominant
/// pollutant, else the first sensor with an id.
fn history_sensor(location: &Location) -> Option<&SensorMeta> {
    let with_id = || location.sensors.iter().filter(|s| !s.id.is_empty());
    location
        .dominant_pollutant
        .as_deref()
        .and_then(|key| with_id().find(|s| s.pollutant_key == key))
        .or_else(|| with_id().next())
}

fn sensor_readings(record: &ProviderLocationRecord, location: &Location) -> Vec<SensorReading> {
    record
        .sensors
        .iter()
        .zip(&location.sensors)
        .filter_map(|(sensor, meta)| {
            let value = sensor.latest.as_ref()?.value?;
            let reading = calculate_aqi(&meta.pollutant_key, table_concentration(meta, value));
            Some(SensorReading {
                sensor_id: meta.id.clone(),
                pollutant: meta.display_name.clone(),
                units: meta.units.clone(),
                value,
                label: reading.label(),
                color: reading.color(),
                aqi: reading,
            })
        })
        .collect()
}

/// Location with fresh per-sensor values from the provider, or `None` when
/// the provider has no such location or cannot be reached.
async fn fetch_with_latest(
    client: &OpenAqClient,
    id: &str,
) -> Result<Option<(ProviderLocationRecord, Location)>, Error> {
    let Some(raw) = client.fetch_location(id).await? else {
        return Ok(None);
    };
    let mut record = ProviderLocationRecord::parse(&raw)?;

    match client.fetch_latest(id).await {
        Ok(latest) => {
            let attached = attach_latest(&mut record, &latest);
            debug!("Attached {} latest values to location {}", attached, id);
        }
        Err(e) => warn!("Latest readings for {} unavailable: {}", id, e),
    }

    let location = normalize_location(&record);
    Ok(Some((record, location)))
}

pub async fn build_report(
    cfg: &AppConfig,
    client: &OpenAqClient,
    snapshot: &RefreshOutcome,
    id: &str,
) -> Option<LocationReport> {
    let (location, readings) = match fetch_with_latest(client, id).await {
        Ok(Some((record, location))) => {
            let readings = sensor_readings(&record, &location);
            (location, readings)
        }
        Ok(None) => {
            warn!("Provider has no location {}", id);
            (snapshot.find(id)?.clone(), Vec::new())
        }
        Err(e) => {
            warn!("Location {} lookup failed, using refreshed data: {}", id, e);
            (snapshot.find(id)?.clone(), Vec::new())
        }
    };

    // Without any reading the 0/Good default says nothing about health.
    let category = location
        .dominant_pollutant
        .as_ref()
        .map(|_| location.max_aqi_category);
    let health = health_recommendation(category);

    let history = match history_sensor(&location) {
        Some(meta) => match client.fetch_measurements(&meta.id, cfg.openaq.history_limit).await {
            Ok(measurements) => Some(summarize_history(meta, &measurements)),
            Err(e) => {
                warn!("History for sensor {} unavailable: {}", meta.id, e);
                None
            }
        },
        None => None,
    };
    let insights = match &history {
        Some(h) => generate_insights(&location, h.statistics.as_ref(), &h.trend),
        None => generate_insights(&location, None, &detect_trend(&[], DEFAULT_TREND_WINDOW)),
    };

    let mut report = LocationReport {
        location,
        readings,
        health,
        history,
        insights,
        weather: None,
        forecast: Vec::new(),
        correlation: None,
    };

    if cfg.weather_api_key.trim().is_empty() {
        info!("WEATHER_API_KEY not set, skipping weather");
        return Some(report);
    }
    let Some(coords) = report.location.coordinates else {
        return Some(report);
    };

    let weather = match WeatherClient::new(&cfg.weather, &cfg.weather_api_key) {
        Ok(w) => w,
        Err(e) => {
            warn!("Weather client unavailable: {}", e);
            return Some(report);
        }
    };

    match weather.current(coords.lat, coords.lon).await {
        Ok(current) => report.weather = current,
        Err(e) => warn!("Current weather for {} failed: {}", id, e),
    }
    match weather
        .forecast(coords.lat, coords.lon, cfg.weather.forecast_days)
        .await
    {
        Ok(days) => report.forecast = days,
        Err(e) => warn!("Forecast for {} failed: {}", id, e),
    }
    report.correlation = report
        .weather
        .as_ref()
        .map(|w| analyze_correlation(w, report.location.max_aqi));

    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_readings_skip_sensors_without_values() {
        let record = ProviderLocationRecord::parse(&json!({
            "id": 42,
            "sensors": [
                {"id": 1, "parameter": {"name": "pm25", "units": "µg/m³"}, "latest": {"value": 35.5}},
                {"id": 2, "parameter": {"name": "o3", "units": "ppb"}},
                {"id": 3, "parameter": {"name": "bc", "units": "µg/m³"}, "latest": {"value": 1.2}}
            ]
        }))
        .unwrap();
        let location = normalize_location(&record);

        let readings = sensor_readings(&record, &location);
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].pollutant, "PM2.5");
        assert_eq!(readings[0].aqi.aqi, 101);
        assert_eq!(readings[0].color, "#ff7e00");
        assert_eq!(readings[1].label, "Unknown");
        assert_eq!(readings[1].color, "#cccccc");
    }

    #[test]
    fn test_history_follows_dominant_pollutant() {
        let location = normalize_location(
            &ProviderLocationRecord::parse(&json!({
                "id": 7,
                "sensors": [
                    {"id": 10, "parameter": {"name": "pm25"}, "latest": {"value": 4.0}},
                    {"id": 11, "parameter": {"name": "o3", "units": "ppm"}, "latest": {"value": 0.08}}
                ]
            }))
            .unwrap(),
        );
        assert_eq!(history_sensor(&location).map(|s| s.id.as_str()), Some("11"));

        let quiet = normalize_location(
            &ProviderLocationRecord::parse(&json!({"id": 8, "sensors": [{"parameter": {"name": "pm10"}}, {"id": 3}]}))
                .unwrap(),
        );
        assert_eq!(history_sensor(&quiet).map(|s| s.id.as_str()), Some("3"));
    }

    #[test]
    fn test_summarize_history() {
        let location = normalize_location(
            &ProviderLocationRecord::parse(&json!({
                "id": 9,
                "sensors": [{"id": 5, "parameter": {"name": "pm25", "units": "µg/m³"}}]
            }))
            .unwrap(),
        );
        let measurements: Vec<Measurement> = (0..48)
            .map(|i| Measurement {
                value: if i < 24 { 10.0 } else { 30.0 },
                utc: Some(format!("2026-10-{:02}T{:02}:00:00Z", 1 + i / 24, i % 24)),
            })
            .collect();

        let history = summarize_history(&location.sensors[0], &measurements);
        assert_eq!(history.samples, 48);
        assert_eq!(history.first_utc.as_deref(), Some("2026-10-01T00:00:00Z"));
        assert_eq!(history.last_utc.as_deref(), Some("2026-10-02T23:00:00Z"));
        assert_eq!(history.trend.direction, aqi::TrendDirection::Increasing);
        let stats = history.statistics.unwrap();
        assert_eq!(stats.mean, 20.0);
        assert!(stats.max_aqi.is_some());
    }
}
