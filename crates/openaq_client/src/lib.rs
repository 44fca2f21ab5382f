//! OpenAQ v3 API client.
//!
//! Fetches monitoring locations, their latest sensor readings and sensor
//! measurement history. Location records are returned as raw JSON values;
//! normalization happens in the `aqi` crate and the raw form is what the
//! refresh cache stores.

use std::collections::HashMap;
use std::time::Duration;

use common::config::{OpenAqConfig, MAX_FETCH_LIMIT};
use common::{Error, ProviderLocationRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

const USER_AGENT: &str = "airwatch/0.1 (air quality dashboard)";

/// OpenAQ client with connection pooling and the `X-API-Key` header.
#[derive(Debug, Clone)]
pub struct OpenAqClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    latest_parameter_ids: Vec<u32>,
}

/// Envelope shared by every OpenAQ v3 list endpoint.
#[derive(Debug, Deserialize)]
pub struct ResultsEnvelope {
    #[serde(default)]
    pub results: Vec<Value>,
}

/// One row of `/locations/{id}/latest`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LatestReading {
    #[serde(rename = "sensorsId")]
    pub sensor_id: u64,
    pub value: Option<f64>,
}

/// One historical value of a sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub value: f64,
    /// End of the averaging period, when the provider reports it.
    pub utc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MeasurementRow {
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    period: Option<MeasurementPeriod>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MeasurementPeriod {
    #[serde(default)]
    datetime_from: Option<Stamp>,
    #[serde(default)]
    datetime_to: Option<Stamp>,
}

#[derive(Debug, Default, Deserialize)]
struct Stamp {
    #[serde(default)]
    utc: Option<String>,
}

impl OpenAqClient {
    pub fn new(cfg: &OpenAqConfig, api_key: &str) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build OpenAQ HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            latest_parameter_ids: cfg.latest_parameter_ids.clone(),
        })
    }

    async fn get_results(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<Value>, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Fetching OpenAQ {} {:?}", url, query);

        let mut req = self.client.get(&url).query(query);
        if !self.api_key.is_empty() {
            req = req.header("X-API-Key", &self.api_key);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("OpenAQ {path}: {e}"))
            } else {
                Error::Http(format!("OpenAQ {path}: {e}"))
            }
        })?;

        let status = resp.status().as_u16();
        if status != 200 {
            let body = resp.text().await.unwrap_or_default();
            let err = Error::from_status(status, &body);
            if err.is_auth() {
                error!("OpenAQ rejected the API key for {}: {}", path, err);
            } else {
                warn!("OpenAQ returned {} for {}", status, path);
            }
            return Err(err);
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::Http(format!("OpenAQ {path}: failed to read body: {e}")))?;
        let envelope = parse_envelope(&body)?;
        debug!("Got {} results from {}", envelope.results.len(), path);
        Ok(envelope.results)
    }

    /// Fetch up to `limit` monitoring locations (capped at the provider maximum).
    pub async fn fetch_locations(&self, limit: usize) -> Result<Vec<Value>, Error> {
        let limit = clamp_limit(limit);
        self.get_results("/locations", &[("limit", limit.to_string())])
            .await
    }

    /// Fetch a single location by id. `Ok(None)` when the provider has no such location.
    pub async fn fetch_location(&self, id: &str) -> Result<Option<Value>, Error> {
        let results = self.get_results(&format!("/locations/{id}"), &[]).await?;
        Ok(results.into_iter().next())
    }

    /// Provider-side name search.
    pub async fn search_locations(&self, name: &str, limit: usize) -> Result<Vec<Value>, Error> {
        self.get_results(
            "/locations",
            &[("name", name.to_string()), ("limit", clamp_limit(limit).to_string())],
        )
        .await
    }

    /// Latest value per sensor for one location. Rows that do not parse are dropped.
    pub async fn fetch_latest(&self, location_id: &str) -> Result<Vec<LatestReading>, Error> {
        let results = self
            .get_results(&format!("/locations/{location_id}/latest"), &[])
            .await?;
        Ok(parse_latest(results))
    }

    /// Latest value of every sensor measuring one parameter, across all
    /// locations (first page only, up to the provider maximum).
    pub async fn fetch_parameter_latest(&self, parameter_id: u32) -> Result<Vec<LatestReading>, Error> {
        let results = self
            .get_results(
                &format!("/parameters/{parameter_id}/latest"),
                &[("limit", MAX_FETCH_LIMIT.to_string())],
            )
            .await?;
        Ok(parse_latest(results))
    }

    /// `fetch_locations` with latest sensor values merged in.
    ///
    /// The locations endpoint carries no readings, so values come from the
    /// bulk latest endpoint of each configured parameter. A failed latest
    /// query is logged and leaves its sensors without values; only the
    /// locations query itself can fail the call.
    pub async fn fetch_locations_with_latest(&self, limit: usize) -> Result<Vec<Value>, Error> {
        let mut records = self.fetch_locations(limit).await?;
        if records.is_empty() || self.latest_parameter_ids.is_empty() {
            return Ok(records);
        }

        let mut latest = Vec::new();
        for &parameter_id in &self.latest_parameter_ids {
            match self.fetch_parameter_latest(parameter_id).await {
                Ok(rows) => latest.extend(rows),
                Err(e) => warn!("Latest values for parameter {} unavailable: {}", parameter_id, e),
            }
        }

        let merged = merge_latest(&mut records, &latest);
        info!(
            "Merged {} latest values into {} locations ({} rows fetched)",
            merged,
            records.len(),
            latest.len()
        );
        Ok(records)
    }

    /// Up to `limit` historical values of one sensor, oldest first.
    pub async fn fetch_measurements(&self, sensor_id: &str, limit: usize) -> Result<Vec<Measurement>, Error> {
        let results = self
            .get_results(
                &format!("/sensors/{sensor_id}/measurements"),
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(parse_measurements(results))
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_FETCH_LIMIT)
}

fn parse_envelope(body: &str) -> Result<ResultsEnvelope, Error> {
    Ok(serde_json::from_str(body)?)
}

fn parse_latest(results: Vec<Value>) -> Vec<LatestReading> {
    results
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<LatestReading>(row) {
            Ok(reading) => Some(reading),
            Err(e) => {
                debug!("Dropping unreadable latest row: {}", e);
                None
            }
        })
        .collect()
}

fn parse_measurements(results: Vec<Value>) -> Vec<Measurement> {
    let mut measurements: Vec<Measurement> = results
        .into_iter()
        .filter_map(|row| {
            let row: MeasurementRow = serde_json::from_value(row).ok()?;
            let value = row.value.filter(|v| v.is_finite())?;
            let utc = row
                .period
                .and_then(|p| p.datetime_to.or(p.datetime_from))
                .and_then(|s| s.utc);
            Some(Measurement { value, utc })
        })
        .collect();
    measurements.sort_by(|a, b| a.utc.cmp(&b.utc));
    measurements
}

fn raw_sensor_id(sensor: &Value) -> Option<String> {
    match sensor.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Write latest values into raw location records as `sensors[].latest`,
/// matched by sensor id. Returns how many sensors received a value.
pub fn merge_latest(records: &mut [Value], latest: &[LatestReading]) -> usize {
    let by_sensor: HashMap<String, f64> = latest
        .iter()
        .filter_map(|r| r.value.map(|v| (r.sensor_id.to_string(), v)))
        .collect();
    if by_sensor.is_empty() {
        return 0;
    }

    let mut merged = 0;
    for record in records.iter_mut() {
        let Some(sensors) = record.get_mut("sensors").and_then(Value::as_array_mut) else {
            continue;
        };
        for sensor in sensors {
            let Some(value) = raw_sensor_id(sensor).and_then(|id| by_sensor.get(&id)) else {
                continue;
            };
            if let Some(fields) = sensor.as_object_mut() {
                fields.insert("latest".into(), json!({ "value": value }));
                merged += 1;
            }
        }
    }
    merged
}

/// Merge latest readings into a record's sensors, matched by sensor id.
///
/// Returns how many sensors received a value.
pub fn attach_latest(record: &mut ProviderLocationRecord, latest: &[LatestReading]) -> usize {
    let mut attached = 0;
    for sensor in &mut record.sensors {
        let Some(id) = sensor.id.as_deref() else {
            continue;
        };
        let hit = latest
            .iter()
            .find(|r| r.sensor_id.to_string() == id && r.value.is_some());
        if let Some(reading) = hit {
            sensor.latest = Some(common::record::ProviderLatest {
                value: reading.value,
            });
            attached += 1;
        }
    }
    attached
}
