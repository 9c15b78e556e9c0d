use std::time::Duration;

/// Number of chapters in the harmonized tariff schedule, enumerated by a full sync
pub const HTS_CHAPTER_COUNT: u8 = 99;

/// Products not refreshed within this window are picked up by an incremental sync
pub const STALE_AFTER: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Percentage points a per-country total must move before watchers are told
pub const MATERIAL_CHANGE_THRESHOLD: f64 = 1.0;

pub const STANDARD_RATE_TYPE: &str = "standard";

/// The only agreement code with an adjustment rule
pub const ZEROING_AGREEMENT_CODE: &str = "FTA";

/// Country (ISO alpha-2) to trade agreement code
pub const COUNTRY_AGREEMENTS: &[(&str, &str)] = &[
    ("CA", "USMCA"),
    ("MX", "USMCA"),
    ("KR", "KORUS"),
    ("AU", "FTA"),
    ("SG", "FTA"),
    ("CL", "FTA"),
    ("IL", "FTA"),
];

pub fn agreement_for_country(country_code: &str) -> Option<&'static str> {
    COUNTRY_AGREEMENTS
        .iter()
        .find(|(country, _)| country.eq_ignore_ascii_case(country_code))
        .map(|(_, agreement)| *agreement)
}

#[non_exhaustive]
pub struct SourceName;

impl SourceName {
    pub const GENERAL_RATES: &'static str = "general_rates";
    pub const SPECIAL_TARIFFS: &'static str = "special_tariffs";
    pub const RULINGS: &'static str = "rulings";
    pub const NOTICES: &'static str = "notices";
}
