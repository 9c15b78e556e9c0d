use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static HTS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}\.\d{2}\.\d{4}$").expect("valid HTS code pattern"));

static EMBEDDED_HTS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}\.\d{2}\.\d{4}\b").expect("valid HTS code pattern"));

/// `XXXX.XX.XXXX`
pub fn is_valid_hts_code(code: &str) -> bool {
    HTS_CODE.is_match(code)
}

/// Distinct HTS codes mentioned in free text, in sorted order.
pub fn extract_hts_codes(text: &str) -> Vec<String> {
    EMBEDDED_HTS_CODE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Chapter number (first two digits) of a code.
pub fn chapter_of(code: &str) -> Option<u8> {
    code.get(..2)?.parse().ok()
}
