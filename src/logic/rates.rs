use super::types::{AdditionalRate, RateValue};
use crate::utils::constants::{MATERIAL_CHANGE_THRESHOLD, STANDARD_RATE_TYPE, ZEROING_AGREEMENT_CODE};

/// Total duty rate: the base rate plus every additional rate that parses as a number.
///
/// Non-numeric additional rates contribute nothing.
pub fn compute_total_rate(base_rate: f64, additional_rates: &[AdditionalRate]) -> f64 {
    additional_rates
        .iter()
        .filter_map(|rate| rate.rate.as_numeric())
        .fold(base_rate, |total, rate| total + rate)
}

/// Additional rates that apply to imports from `country_code`
pub fn rates_for_country(additional_rates: &[AdditionalRate], country_code: &str) -> Vec<AdditionalRate> {
    additional_rates
        .iter()
        .filter(|rate| rate.applies_to(country_code))
        .cloned()
        .collect()
}

/// Apply the trade-agreement adjustment for a country's agreement code.
///
/// Only the generic FTA code has an effect: it zeroes `standard` rates. Every
/// other code, and no code at all, leaves the rates untouched.
pub fn apply_agreement(agreement_code: Option<&str>, additional_rates: Vec<AdditionalRate>) -> Vec<AdditionalRate> {
    match agreement_code {
        Some(code) if code == ZEROING_AGREEMENT_CODE => additional_rates
            .into_iter()
            .map(|mut rate| {
                if rate.rate_type.eq_ignore_ascii_case(STANDARD_RATE_TYPE) {
                    rate.rate = RateValue::zero();
                }
                rate
            })
            .collect(),
        _ => additional_rates,
    }
}

/// Whether a move from `previous` to `current` is large enough to notify watchers
pub fn is_material_change(previous: f64, current: f64) -> bool {
    (current - previous).abs() >= MATERIAL_CHANGE_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_rate_ignores_non_numeric() {
        let rates = vec![AdditionalRate::new("section_301", "2.5"), AdditionalRate::new("note", "abc")];
        assert_eq!(compute_total_rate(5.0, &rates), 7.5);
    }

    #[test]
    fn test_total_rate_without_additional_rates() {
        assert_eq!(compute_total_rate(3.2, &[]), 3.2);
    }

    #[test]
    fn test_total_rate_mixed_values() {
        let rates = vec![
            AdditionalRate::new("a", 1.0),
            AdditionalRate::new("b", "2%"),
            AdditionalRate::new("c", "Free"),
            AdditionalRate::new("d", 0.5),
        ];
        assert_eq!(compute_total_rate(0.0, &rates), 3.5);
    }

    #[test]
    fn test_fta_zeroes_standard_rates_only() {
        let rates = vec![AdditionalRate::new("standard", 4.0), AdditionalRate::new("section_232", 10.0)];
        let adjusted = apply_agreement(Some("FTA"), rates.clone());
        assert_eq!(compute_total_rate(0.0, &adjusted), 10.0);

        let untouched = apply_agreement(Some("USMCA"), rates.clone());
        assert_eq!(untouched, rates);
        assert_eq!(apply_agreement(None, rates.clone()), rates);
    }

    #[test]
    fn test_country_scoping() {
        let rates = vec![
            AdditionalRate::new("section_301", 25.0).with_countries(vec!["CN".to_string()]),
            AdditionalRate::new("standard", 1.0),
        ];
        assert_eq!(rates_for_country(&rates, "CN").len(), 2);
        assert_eq!(rates_for_country(&rates, "MX").len(), 1);
    }

    #[test]
    fn test_material_change_threshold() {
        assert!(is_material_change(10.0, 11.5));
        assert!(!is_material_change(10.0, 10.5));
        assert!(is_material_change(10.0, 9.0));
        assert!(is_material_change(10.0, 11.0));
    }
}
