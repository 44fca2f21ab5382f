//! Domain types shared across the workspace.

use serde::{Deserialize, Serialize};

// ── AQI categories ────────────────────────────────────────────────────

/// EPA AQI category. Ordered from cleanest to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AqiCategory {
    Good,
    Moderate,
    UnhealthyForSensitiveGroups,
    Unhealthy,
    VeryUnhealthy,
    Hazardous,
}

impl AqiCategory {
    pub const ALL: [AqiCategory; 6] = [
        AqiCategory::Good,
        AqiCategory::Moderate,
        AqiCategory::UnhealthyForSensitiveGroups,
        AqiCategory::Unhealthy,
        AqiCategory::VeryUnhealthy,
        AqiCategory::Hazardous,
    ];

    /// Fixed AQI sub-range `(low, high)` for this category.
    pub fn aqi_range(self) -> (u16, u16) {
        match self {
            AqiCategory::Good => (0, 50),
            AqiCategory::Moderate => (51, 100),
            AqiCategory::UnhealthyForSensitiveGroups => (101, 150),
            AqiCategory::Unhealthy => (151, 200),
            AqiCategory::VeryUnhealthy => (201, 300),
            AqiCategory::Hazardous => (301, 500),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AqiCategory::Good => "Good",
            AqiCategory::Moderate => "Moderate",
            AqiCategory::UnhealthyForSensitiveGroups => "Unhealthy for Sensitive Groups",
            AqiCategory::Unhealthy => "Unhealthy",
            AqiCategory::VeryUnhealthy => "Very Unhealthy",
            AqiCategory::Hazardous => "Hazardous",
        }
    }

    /// Display color (hex) for this category.
    pub fn color(self) -> &'static str {
        match self {
            AqiCategory::Good => "#00e400",
            AqiCategory::Moderate => "#ffff00",
            AqiCategory::UnhealthyForSensitiveGroups => "#ff7e00",
            AqiCategory::Unhealthy => "#ff0000",
            AqiCategory::VeryUnhealthy => "#8f3f97",
            AqiCategory::Hazardous => "#7e0023",
        }
    }
}

impl std::fmt::Display for AqiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Label used when no category can be derived.
pub const UNKNOWN_LABEL: &str = "Unknown";
/// Neutral gray used when no category can be derived.
pub const UNKNOWN_COLOR: &str = "#cccccc";

// ── Normalized locations ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Metadata for one sensor at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMeta {
    pub id: String,
    /// Lowercased pollutant key, e.g. "pm25".
    pub pollutant_key: String,
    pub display_name: String,
    pub units: String,
}

/// A monitoring station in canonical form.
///
/// Built fresh on every normalization pass and never mutated afterwards.
/// `max_aqi_category` and `max_aqi_color` are always derived from `max_aqi`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub name: String,
    pub locality: String,
    pub country: String,
    pub country_code: String,
    pub coordinates: Option<Coordinates>,
    pub sensors: Vec<SensorMeta>,
    pub max_aqi: u16,
    pub max_aqi_category: AqiCategory,
    pub max_aqi_color: String,
    /// Pollutant key that produced `max_aqi`, if any reading was known.
    pub dominant_pollutant: Option<String>,
}
