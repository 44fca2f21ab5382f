//! Weather influence on air quality.

use serde::Serialize;

use crate::WeatherSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallConditions {
    Favorable,
    Moderate,
    Unfavorable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationAnalysis {
    pub aqi: u16,
    pub wind_impact: Impact,
    pub humidity_impact: Impact,
    pub temperature_impact: Impact,
    pub overall_conditions: OverallConditions,
    pub recommendations: Vec<&'static str>,
}

/// Rate wind, humidity and temperature for pollutant dispersion.
///
/// Missing readings count as zero, so an empty snapshot rates as calm, dry air.
pub fn analyze_correlation(weather: &WeatherSnapshot, aqi: u16) -> CorrelationAnalysis {
    let wind = weather.wind_speed_kph.unwrap_or(0.0);
    let humidity = weather.humidity.unwrap_or(0.0);
    let temperature = weather.temperature_c.unwrap_or(0.0);
    let mut recommendations = Vec::new();

    let wind_impact = if wind > 20.0 {
        recommendations.push("Strong winds help disperse pollutants");
        Impact::Positive
    } else if wind < 5.0 {
        recommendations.push("Low wind speed may trap pollutants");
        Impact::Negative
    } else {
        Impact::Neutral
    };

    let humidity_impact = if humidity > 70.0 {
        recommendations.push("High humidity can worsen air quality perception");
        Impact::Negative
    } else if humidity < 30.0 {
        recommendations.push("Low humidity may increase particle suspension");
        Impact::Negative
    } else {
        Impact::Neutral
    };

    let temperature_impact = if temperature > 30.0 {
        recommendations.push("High temperatures can increase ozone formation");
        Impact::Negative
    } else if temperature < 0.0 {
        recommendations.push("Cold air can trap pollutants near ground");
        Impact::Negative
    } else {
        Impact::Neutral
    };

    let negatives = [wind_impact, humidity_impact, temperature_impact]
        .iter()
        .filter(|i| **i == Impact::Negative)
        .count();
    let overall_conditions = match negatives {
        0 => OverallConditions::Favorable,
        1 => OverallConditions::Moderate,
        _ => OverallConditions::Unfavorable,
    };

    CorrelationAnalysis {
        aqi,
        wind_impact,
        humidity_impact,
        temperature_impact,
        overall_conditions,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(wind: f64, humidity: f64, temperature: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            wind_speed_kph: Some(wind),
            humidity: Some(humidity),
            temperature_c: Some(temperature),
            ..WeatherSnapshot::default()
        }
    }

    #[test]
    fn test_breezy_mild_day_is_favorable() {
        let analysis = analyze_correlation(&snapshot(25.0, 50.0, 18.0), 42);
        assert_eq!(analysis.wind_impact, Impact::Positive);
        assert_eq!(analysis.overall_conditions, OverallConditions::Favorable);
        assert_eq!(analysis.recommendations, vec!["Strong winds help disperse pollutants"]);
    }

    #[test]
    fn test_single_negative_is_moderate() {
        let analysis = analyze_correlation(&snapshot(10.0, 80.0, 18.0), 60);
        assert_eq!(analysis.humidity_impact, Impact::Negative);
        assert_eq!(analysis.overall_conditions, OverallConditions::Moderate);
    }

    #[test]
    fn test_stagnant_hot_day_is_unfavorable() {
        let analysis = analyze_correlation(&snapshot(2.0, 50.0, 35.0), 160);
        assert_eq!(analysis.wind_impact, Impact::Negative);
        assert_eq!(analysis.temperature_impact, Impact::Negative);
        assert_eq!(analysis.overall_conditions, OverallConditions::Unfavorable);
        assert_eq!(analysis.recommendations.len(), 2);
    }

    #[test]
    fn test_thresholds_are_exclusive() {
        let analysis = analyze_correlation(&snapshot(20.0, 70.0, 30.0), 0);
        assert_eq!(analysis.wind_impact, Impact::Neutral);
        assert_eq!(analysis.humidity_impact, Impact::Neutral);
        assert_eq!(analysis.temperature_impact, Impact::Neutral);
    }

    #[test]
    fn test_empty_snapshot_reads_as_calm_and_dry() {
        let analysis = analyze_correlation(&WeatherSnapshot::default(), 0);
        assert_eq!(analysis.wind_impact, Impact::Negative);
        assert_eq!(analysis.humidity_impact, Impact::Negative);
        assert_eq!(analysis.temperature_impact, Impact::Neutral);
        assert_eq!(analysis.overall_conditions, OverallConditions::Unfavorable);
    }
}
