//! Concentration → AQI conversion.
//!
//! Within a band the AQI is the EPA piecewise-linear interpolation
//!
//! ```text
//! AQI = (I_hi - I_lo) / (C_hi - C_lo) * (C - C_lo) + I_lo
//! ```
//!
//! where `[I_lo, I_hi]` is the band's category sub-range (0–50, 51–100,
//! 101–150, 151–200, 201–300, 301–500). The result is rounded to the nearest
//! integer, so it always lands inside the band's own category.
//!
//! Overflow: the Hazardous band is interpolated up to a nominal ceiling per
//! pollutant. Concentrations above that ceiling saturate at [`AQI_MAX`], which
//! `aqi_category` still classifies as Hazardous.

use common::{AqiCategory, Error, UNKNOWN_COLOR, UNKNOWN_LABEL};
use serde::Serialize;
use tracing::debug;

use crate::breakpoints::table_for;

/// Highest AQI the calculator reports.
pub const AQI_MAX: u16 = 500;

/// Result of converting one concentration.
///
/// `category` is `None` for the "Unknown" sentinel (unsupported pollutant or
/// unusable concentration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AqiReading {
    pub aqi: u16,
    pub category: Option<AqiCategory>,
}

impl AqiReading {
    pub fn unknown() -> Self {
        Self {
            aqi: 0,
            category: None,
        }
    }

    pub fn label(&self) -> &'static str {
        self.category.map_or(UNKNOWN_LABEL, AqiCategory::label)
    }

    pub fn color(&self) -> &'static str {
        self.category.map_or(UNKNOWN_COLOR, AqiCategory::color)
    }

    pub fn is_known(&self) -> bool {
        self.category.is_some()
    }
}

/// Lowercase + trim a raw pollutant key ("PM25 " → "pm25").
pub fn normalize_pollutant_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Convert a concentration to an AQI reading.
///
/// Errors with `UnsupportedPollutant` when no breakpoint table exists for
/// the key, and `InvalidConcentration` for negative or non-finite values.
pub fn try_calculate_aqi(pollutant: &str, concentration: f64) -> Result<AqiReading, Error> {
    let key = normalize_pollutant_key(pollutant);
    let table = table_for(&key).ok_or_else(|| Error::UnsupportedPollutant(key.clone()))?;

    if !concentration.is_finite() || concentration < 0.0 {
        return Err(Error::InvalidConcentration {
            pollutant: key,
            value: concentration,
        });
    }

    let band = table.band_for(concentration);
    let (i_lo, i_hi) = band.category.aqi_range();

    if band == table.top_band() && concentration > band.conc_high {
        debug!(
            "{} concentration {} is above the top breakpoint ({}), reporting AQI {}",
            key, concentration, band.conc_high, AQI_MAX
        );
        return Ok(AqiReading {
            aqi: AQI_MAX,
            category: Some(band.category),
        });
    }

    let fraction = ((concentration - band.conc_low) / (band.conc_high - band.conc_low)).clamp(0.0, 1.0);
    let aqi = f64::from(i_lo) + fraction * f64::from(i_hi - i_lo);

    Ok(AqiReading {
        aqi: aqi.round() as u16,
        category: Some(band.category),
    })
}

/// Like [`try_calculate_aqi`] but returns the `(0, "Unknown", #cccccc)`
/// sentinel instead of an error. Bad readings are a data-quality issue, not a
/// programming error.
pub fn calculate_aqi(pollutant: &str, concentration: f64) -> AqiReading {
    match try_calculate_aqi(pollutant, concentration) {
        Ok(reading) => reading,
        Err(e) => {
            debug!("AQI unavailable: {}", e);
            AqiReading::unknown()
        }
    }
}

/// Category for an AQI value, independent of pollutant.
///
/// This is the only AQI → category mapping in the workspace.
pub fn aqi_category(aqi: u16) -> AqiCategory {
    match aqi {
        0..=50 => AqiCategory::Good,
        51..=100 => AqiCategory::Moderate,
        101..=150 => AqiCategory::UnhealthyForSensitiveGroups,
        151..=200 => AqiCategory::Unhealthy,
        201..=300 => AqiCategory::VeryUnhealthy,
        _ => AqiCategory::Hazardous,
    }
}

/// Display color for an AQI value; paired 1:1 with [`aqi_category`].
pub fn aqi_color(aqi: u16) -> &'static str {
    aqi_category(aqi).color()
}
