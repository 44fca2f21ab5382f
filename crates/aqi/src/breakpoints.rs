//! Per-pollutant concentration breakpoints.
//!
//! Bands follow the EPA AQI tables the dashboard has always shipped with.
//! Published tables truncate concentrations to the instrument precision, so
//! adjacent bands leave small gaps (e.g. PM2.5 12.0 → 12.1). Lookup treats a
//! band as covering everything from its `conc_low` up to the next band's
//! `conc_low`, which makes the table contiguous over `[0, +∞)`.

use common::AqiCategory;
use common::AqiCategory::{
    Good, Hazardous, Moderate, Unhealthy, UnhealthyForSensitiveGroups, VeryUnhealthy,
};

/// One concentration band mapped to an AQI category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub conc_low: f64,
    /// Upper concentration used for interpolation. For the Hazardous band this
    /// is a nominal ceiling; see `calculator` for what happens above it.
    pub conc_high: f64,
    pub category: AqiCategory,
}

/// Breakpoint table for one pollutant, ascending by concentration.
#[derive(Debug, Clone, Copy)]
pub struct PollutantTable {
    pub key: &'static str,
    pub bands: [Breakpoint; 6],
}

const fn bp(conc_low: f64, conc_high: f64, category: AqiCategory) -> Breakpoint {
    Breakpoint {
        conc_low,
        conc_high,
        category,
    }
}

/// PM2.5, µg/m³ (24-hour).
pub const PM25: PollutantTable = PollutantTable {
    key: "pm25",
    bands: [
        bp(0.0, 12.0, Good),
        bp(12.1, 35.4, Moderate),
        bp(35.5, 55.4, UnhealthyForSensitiveGroups),
        bp(55.5, 150.4, Unhealthy),
        bp(150.5, 250.4, VeryUnhealthy),
        bp(250.5, 500.4, Hazardous),
    ],
};

/// PM10, µg/m³ (24-hour).
pub const PM10: PollutantTable = PollutantTable {
    key: "pm10",
    bands: [
        bp(0.0, 54.0, Good),
        bp(55.0, 154.0, Moderate),
        bp(155.0, 254.0, UnhealthyForSensitiveGroups),
        bp(255.0, 354.0, Unhealthy),
        bp(355.0, 424.0, VeryUnhealthy),
        bp(425.0, 604.0, Hazardous),
    ],
};

/// NO₂, ppb (1-hour).
pub const NO2: PollutantTable = PollutantTable {
    key: "no2",
    bands: [
        bp(0.0, 53.0, Good),
        bp(54.0, 100.0, Moderate),
        bp(101.0, 360.0, UnhealthyForSensitiveGroups),
        bp(361.0, 649.0, Unhealthy),
        bp(650.0, 1249.0, VeryUnhealthy),
        bp(1250.0, 2049.0, Hazardous),
    ],
};

/// O₃, ppb.
pub const O3: PollutantTable = PollutantTable {
    key: "o3",
    bands: [
        bp(0.0, 54.0, Good),
        bp(55.0, 70.0, Moderate),
        bp(71.0, 85.0, UnhealthyForSensitiveGroups),
        bp(86.0, 105.0, Unhealthy),
        bp(106.0, 200.0, VeryUnhealthy),
        bp(201.0, 604.0, Hazardous),
    ],
};

pub const TABLES: [&PollutantTable; 4] = [&PM25, &PM10, &NO2, &O3];

/// Table for a normalized (lowercase) pollutant key.
pub fn table_for(key: &str) -> Option<&'static PollutantTable> {
    TABLES.iter().copied().find(|t| t.key == key)
}

impl PollutantTable {
    /// Band containing `concentration`: the last band whose floor is at or
    /// below it. Concentrations below zero resolve to the first band.
    pub fn band_for(&self, concentration: f64) -> &Breakpoint {
        self.bands
            .iter()
            .rev()
            .find(|b| concentration >= b.conc_low)
            .unwrap_or(&self.bands[0])
    }

    pub fn top_band(&self) -> &Breakpoint {
        &self.bands[self.bands.len() - 1]
    }
}
