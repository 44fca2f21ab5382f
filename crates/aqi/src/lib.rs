//! AQI normalization: breakpoint tables, concentration → AQI conversion,
//! category/color lookup, provider record normalization and measurement
//! history statistics.

pub mod breakpoints;
pub mod calculator;
pub mod health;
pub mod normalize;
pub mod stats;

pub use calculator::{
    aqi_category, aqi_color, calculate_aqi, try_calculate_aqi, AqiReading, AQI_MAX,
};
pub use health::{health_recommendation, HealthAdvice};
pub use normalize::{
    count_countries, normalize_batch, normalize_location, pollutant_display_name, rank_by_aqi,
    table_concentration,
};
pub use stats::{
    calculate_statistics, detect_trend, generate_insights, sensor_statistics, Statistics, Trend,
    TrendDirection, DEFAULT_TREND_WINDOW,
};
