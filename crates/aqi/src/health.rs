use common::{AqiCategory, UNKNOWN_LABEL};
use serde::Serialize;

/// Health guidance shown next to an AQI category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthAdvice {
    /// Category label, or "Unknown".
    pub tag: &'static str,
    pub general: &'static str,
    pub sensitive_groups: &'static str,
}

const NO_DATA: &str = "No data available";

/// Guidance for a category; `None` (the Unknown sentinel) gets "No data available".
pub fn health_recommendation(category: Option<AqiCategory>) -> HealthAdvice {
    let (general, sensitive_groups) = match category {
        Some(AqiCategory::Good) => (
            "Air quality is satisfactory, and air pollution poses little or no risk.",
            "Enjoy your outdoor activities!",
        ),
        Some(AqiCategory::Moderate) => (
            "Air quality is acceptable. However, there may be a risk for some people.",
            "Unusually sensitive people should consider limiting prolonged outdoor exertion.",
        ),
        Some(AqiCategory::UnhealthyForSensitiveGroups) => (
            "Members of sensitive groups may experience health effects.",
            "People with respiratory or heart disease, children, and older adults should limit prolonged outdoor exertion.",
        ),
        Some(AqiCategory::Unhealthy) => (
            "Some members of the general public may experience health effects.",
            "People with respiratory or heart disease, children, and older adults should avoid prolonged outdoor exertion. Everyone else should limit prolonged outdoor exertion.",
        ),
        Some(AqiCategory::VeryUnhealthy) => (
            "Health alert: The risk of health effects is increased for everyone.",
            "People with respiratory or heart disease, children, and older adults should avoid all outdoor exertion. Everyone else should limit outdoor exertion.",
        ),
        Some(AqiCategory::Hazardous) => (
            "Health warning of emergency conditions: everyone is more likely to be affected.",
            "Everyone should avoid all outdoor exertion.",
        ),
        None => (NO_DATA, NO_DATA),
    };

    HealthAdvice {
        tag: category.map_or(UNKNOWN_LABEL, AqiCategory::label),
        general,
        sensitive_groups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_has_distinct_advice() {
        let advice: Vec<_> = AqiCategory::ALL
            .iter()
            .map(|c| health_recommendation(Some(*c)))
            .collect();
        for (i, a) in advice.iter().enumerate() {
            assert_ne!(a.general, NO_DATA);
            for b in &advice[i + 1..] {
                assert_ne!(a.general, b.general);
            }
        }
    }

    #[test]
    fn test_unknown_has_no_data() {
        let advice = health_recommendation(None);
        assert_eq!(advice.general, "No data available");
        assert_eq!(advice.sensitive_groups, "No data available");
        assert_eq!(advice.tag, "Unknown");
    }
}
