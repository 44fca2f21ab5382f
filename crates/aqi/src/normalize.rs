//! Provider record → canonical `Location`.

use common::{Coordinates, Location, ProviderLocationRecord, ProviderSensor, SensorMeta};
use serde_json::Value;
use tracing::{debug, warn};

use crate::calculator::{aqi_category, aqi_color, normalize_pollutant_key, try_calculate_aqi};

const UNKNOWN: &str = "Unknown";

/// Provider-agnostic display name for a normalized pollutant key.
///
/// Falls back to the uppercased key for pollutants without a mapping.
pub fn pollutant_display_name(key: &str) -> String {
    match key {
        "pm25" => "PM2.5".into(),
        "pm10" => "PM10".into(),
        "no2" => "NO₂".into(),
        "o3" => "O₃".into(),
        "so2" => "SO₂".into(),
        "co" => "CO".into(),
        other => other.to_uppercase(),
    }
}

/// Conventional units, used when the provider omits them.
pub fn default_units(key: &str) -> &'static str {
    match key {
        "pm25" | "pm10" => "µg/m³",
        "no2" | "o3" | "so2" => "ppb",
        "co" => "ppm",
        _ => "",
    }
}

/// A sensor value in the units the breakpoint tables use. Gas tables are
/// in ppb, so ppm readings of no2 and o3 are scaled; everything else passes
/// through unchanged.
pub fn table_concentration(meta: &SensorMeta, value: f64) -> f64 {
    let gas = matches!(meta.pollutant_key.as_str(), "no2" | "o3");
    if gas && meta.units.trim().eq_ignore_ascii_case("ppm") {
        value * 1000.0
    } else {
        value
    }
}

fn sensor_meta(sensor: &ProviderSensor) -> SensorMeta {
    let parameter = sensor.parameter.as_ref();
    let key = parameter
        .and_then(|p| p.name.as_deref())
        .map(normalize_pollutant_key)
        .unwrap_or_default();
    let units = parameter
        .and_then(|p| p.units.clone())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| default_units(&key).to_string());

    SensorMeta {
        id: sensor.id.clone().unwrap_or_default(),
        display_name: pollutant_display_name(&key),
        pollutant_key: key,
        units,
    }
}

/// Highest AQI across sensors that carry a usable latest value.
fn max_sensor_aqi(sensors: &[ProviderSensor], metas: &[SensorMeta]) -> Option<(u16, String)> {
    let mut best: Option<(u16, String)> = None;

    for (sensor, meta) in sensors.iter().zip(metas) {
        let Some(value) = sensor.latest.as_ref().and_then(|l| l.value) else {
            continue;
        };
        match try_calculate_aqi(&meta.pollutant_key, table_concentration(meta, value)) {
            Ok(reading) => {
                if best.as_ref().map_or(true, |(aqi, _)| reading.aqi > *aqi) {
                    best = Some((reading.aqi, meta.pollutant_key.clone()));
                }
            }
            Err(e) => debug!("sensor {} skipped for max AQI: {}", meta.id, e),
        }
    }

    best
}

/// Map one parsed provider record to a `Location`.
///
/// Never fails: every absent field degrades to a default. Category and color
/// are derived from `max_aqi` through `aqi_category` / `aqi_color`, so they
/// agree regardless of which pollutant produced the value.
pub fn normalize_location(record: &ProviderLocationRecord) -> Location {
    let country = record.country.as_ref();
    let coordinates = record.coordinates.as_ref().and_then(|c| match (c.latitude, c.longitude) {
        (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
        _ => None,
    });

    let sensors: Vec<SensorMeta> = record.sensors.iter().map(sensor_meta).collect();
    let (max_aqi, dominant_pollutant) = match max_sensor_aqi(&record.sensors, &sensors) {
        Some((aqi, key)) => (aqi, Some(key)),
        None => (0, None),
    };

    Location {
        id: record.id.clone().unwrap_or_default(),
        name: record.name.clone().unwrap_or_else(|| UNKNOWN.to_string()),
        locality: record.locality.clone().unwrap_or_default(),
        country: country
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| UNKNOWN.to_string()),
        country_code: country.and_then(|c| c.code.clone()).unwrap_or_default(),
        coordinates,
        sensors,
        max_aqi,
        max_aqi_category: aqi_category(max_aqi),
        max_aqi_color: aqi_color(max_aqi).to_string(),
        dominant_pollutant,
    }
}

/// Normalize a batch of raw provider records, skipping the unusable ones.
///
/// A `null`, non-object or empty record is logged and dropped; the rest of
/// the batch is unaffected.
pub fn normalize_batch(raw: &[Value]) -> Vec<Location> {
    let mut locations = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for (index, value) in raw.iter().enumerate() {
        match ProviderLocationRecord::parse(value) {
            Ok(record) => locations.push(normalize_location(&record)),
            Err(e) => {
                skipped += 1;
                warn!("Skipping location record #{}: {}", index, e);
            }
        }
    }

    if skipped > 0 {
        debug!("Normalized {} locations, skipped {}", locations.len(), skipped);
    }
    locations
}

/// Locations sorted by `max_aqi`, worst first. Ties keep input order.
pub fn rank_by_aqi(locations: &[Location]) -> Vec<&Location> {
    let mut ranked: Vec<&Location> = locations.iter().collect();
    ranked.sort_by(|a, b| b.max_aqi.cmp(&a.max_aqi));
    ranked
}

/// Number of distinct non-empty country codes.
pub fn count_countries(locations: &[Location]) -> usize {
    locations
        .iter()
        .filter(|l| !l.country_code.is_empty())
        .map(|l| l.country_code.as_str())
        .collect::<std::collections::HashSet<_>>()
        .len()
}
