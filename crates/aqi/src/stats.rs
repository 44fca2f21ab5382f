//! Measurement history: descriptive statistics, trend detection and short
//! rule-based insights for a location report.

use common::{Location, SensorMeta};
use serde::Serialize;

use crate::calculator::try_calculate_aqi;
use crate::normalize::table_concentration;

/// Rolling window for `detect_trend`, in samples (a day of hourly values).
pub const DEFAULT_TREND_WINDOW: usize = 24;

/// Relative change, in percent, past which a trend is no longer stable.
pub const TREND_THRESHOLD_PERCENT: f64 = 10.0;

/// A peak is worth reporting when it exceeds the mean by this factor.
const PEAK_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation; absent below two values.
    pub std_dev: Option<f64>,
    pub avg_aqi: Option<f64>,
    pub max_aqi: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub change_percent: Option<f64>,
    pub recent_mean: Option<f64>,
    pub previous_mean: Option<f64>,
}

impl Trend {
    fn insufficient() -> Self {
        Self {
            direction: TrendDirection::InsufficientData,
            change_percent: None,
            recent_mean: None,
            previous_mean: None,
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Summary of `values`. Non-finite values are ignored; `None` when nothing
/// is left.
pub fn calculate_statistics(values: &[f64]) -> Option<Statistics> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let count = sorted.len();
    let mean = mean(&sorted);
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };
    let std_dev = (count > 1).then(|| {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    });

    Some(Statistics {
        count,
        mean,
        median,
        min: sorted[0],
        max: sorted[count - 1],
        std_dev,
        avg_aqi: None,
        max_aqi: None,
    })
}

/// `calculate_statistics` plus AQI figures for the sensor's pollutant.
/// The AQI fields stay empty when the pollutant has no breakpoint table.
pub fn sensor_statistics(meta: &SensorMeta, values: &[f64]) -> Option<Statistics> {
    let mut stats = calculate_statistics(values)?;
    let aqis: Vec<u16> = values
        .iter()
        .filter_map(|&v| try_calculate_aqi(&meta.pollutant_key, table_concentration(meta, v)).ok())
        .map(|r| r.aqi)
        .collect();
    if !aqis.is_empty() {
        stats.avg_aqi = Some(aqis.iter().map(|&a| f64::from(a)).sum::<f64>() / aqis.len() as f64);
        stats.max_aqi = aqis.iter().copied().max();
    }
    Some(stats)
}

/// Compare the mean of the last `window` rolling means with the `window`
/// before them. Values are expected oldest first.
///
/// Fewer than `window` values, no complete earlier window, or an earlier
/// mean of zero all give `InsufficientData`.
pub fn detect_trend(values: &[f64], window: usize) -> Trend {
    let n = values.len();
    if window == 0 || n < window {
        return Trend::insufficient();
    }

    // rolling[i] is the mean of the `window` values ending at i + window - 1.
    let rolling: Vec<f64> = values.windows(window).map(mean).collect();
    let first_defined = window - 1;
    let defined_mean = |from: usize, to: usize| -> Option<f64> {
        let from = from.max(first_defined);
        (from < to).then(|| mean(&rolling[from - first_defined..to - first_defined]))
    };

    let recent = defined_mean(n - window, n);
    let previous = defined_mean(n.saturating_sub(2 * window), n - window);
    let (Some(recent), Some(previous)) = (recent, previous) else {
        return Trend::insufficient();
    };
    if previous == 0.0 {
        return Trend::insufficient();
    }

    let change = (recent - previous) / previous * 100.0;
    let direction = if change > TREND_THRESHOLD_PERCENT {
        TrendDirection::Increasing
    } else if change < -TREND_THRESHOLD_PERCENT {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    };

    Trend {
        direction,
        change_percent: Some(change),
        recent_mean: Some(recent),
        previous_mean: Some(previous),
    }
}

/// One-line observations about a location and its recent history.
pub fn generate_insights(location: &Location, stats: Option<&Statistics>, trend: &Trend) -> Vec<String> {
    let label = match location.dominant_pollutant {
        Some(_) => location.max_aqi_category.label(),
        None => common::UNKNOWN_LABEL,
    };
    let mut insights = vec![format!(
        "Current air quality is {} with an AQI of {}",
        label, location.max_aqi
    )];

    if let Some(stats) = stats {
        if stats.mean > 0.0 && stats.max > stats.mean * PEAK_FACTOR {
            insights.push(format!(
                "Peak pollution levels are {:.1}, significantly higher than average",
                stats.max
            ));
        }
    }

    match (trend.direction, trend.change_percent) {
        (TrendDirection::Increasing, Some(change)) => {
            insights.push(format!("Air quality is worsening (↑{:.1}%)", change.abs()))
        }
        (TrendDirection::Decreasing, Some(change)) => {
            insights.push(format!("Air quality is improving (↓{:.1}%)", change.abs()))
        }
        (TrendDirection::Stable, _) => insights.push("Air quality has been stable recently".into()),
        _ => {}
    }

    insights
}
