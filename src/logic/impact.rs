use super::types::ImpactLevel;

const HIGH_IMPACT_PHRASES: &[&str] = &["immediate effect", "major revision", "significant change"];
const MEDIUM_IMPACT_PHRASES: &[&str] = &["modification", "amendment"];

/// Coarse impact level of a notice from keywords in its text (case-insensitive).
pub fn classify_impact(text: &str) -> ImpactLevel {
    let text = text.to_lowercase();
    if HIGH_IMPACT_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        ImpactLevel::High
    } else if MEDIUM_IMPACT_PHRASES.iter().any(|phrase| text.contains(phrase)) {
        ImpactLevel::Medium
    } else {
        ImpactLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_impact() {
        assert_eq!(classify_impact("A significant change in rates for steel"), ImpactLevel::High);
        assert_eq!(classify_impact("Effective with IMMEDIATE EFFECT"), ImpactLevel::High);
        assert_eq!(classify_impact("This is a minor amendment"), ImpactLevel::Medium);
        assert_eq!(classify_impact("Modification of exclusions"), ImpactLevel::Medium);
        assert_eq!(classify_impact("Routine notice of meeting"), ImpactLevel::Low);
    }

    #[test]
    fn test_high_wins_over_medium() {
        assert_eq!(classify_impact("major revision and amendment"), ImpactLevel::High);
    }
}
