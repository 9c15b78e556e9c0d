use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, VariantNames};
use uuid::Uuid;

pub type ProductId = i64;
pub type CountryId = i64;
pub type UserId = Uuid;

/// A single rate value as delivered by an upstream source.
///
/// Sources mix numeric rates (`2.5`) with free-form text (`"2.5%"`, `"Free"`,
/// `"see note 3"`), so the raw value is preserved and only interpreted when
/// totals are computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateValue {
    Numeric(f64),
    Text(String),
}

impl RateValue {
    /// Numeric interpretation of the rate, `None` when the value carries no number.
    pub fn as_numeric(&self) -> Option<f64> {
        let value = match self {
            RateValue::Numeric(v) => *v,
            RateValue::Text(text) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }

    pub fn zero() -> Self {
        RateValue::Numeric(0.0)
    }
}

impl From<f64> for RateValue {
    fn from(value: f64) -> Self {
        RateValue::Numeric(value)
    }
}

impl From<&str> for RateValue {
    fn from(value: &str) -> Self {
        RateValue::Text(value.to_string())
    }
}

/// Additional duty layered on top of the base rate (Section 301, 232, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalRate {
    #[serde(rename = "type")]
    pub rate_type: String,
    pub rate: RateValue,
    /// ISO country codes the rate is limited to; `None` applies everywhere
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<String>>,
}

impl AdditionalRate {
    pub fn new(rate_type: impl Into<String>, rate: impl Into<RateValue>) -> Self {
        Self {
            rate_type: rate_type.into(),
            rate: rate.into(),
            countries: None,
        }
    }

    pub fn with_countries(mut self, countries: Vec<String>) -> Self {
        self.countries = Some(countries);
        self
    }

    pub fn applies_to(&self, country_code: &str) -> bool {
        match &self.countries {
            Some(countries) => countries.iter().any(|c| c.eq_ignore_ascii_case(country_code)),
            None => true,
        }
    }
}

/// Persisted product keyed by its HTS code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub hts_code: String,
    pub description: String,
    pub category: Option<String>,
    pub base_rate: f64,
    pub additional_rates: Vec<AdditionalRate>,
    /// Trade agreement codes the product qualifies under
    pub agreements: Vec<String>,
    pub total_rate: f64,
    pub last_updated: DateTime<Utc>,
}

/// Upsert payload for a product; the store assigns or locates identity by `hts_code`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    pub hts_code: String,
    pub description: String,
    /// `None` keeps whatever category is already stored
    pub category: Option<String>,
    pub base_rate: f64,
    pub additional_rates: Vec<AdditionalRate>,
    pub agreements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialTariff {
    pub tariff_type: String,
    pub rate: RateValue,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub countries: Option<Vec<String>>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
}

impl SpecialTariff {
    pub fn to_additional_rate(&self) -> AdditionalRate {
        AdditionalRate {
            rate_type: self.tariff_type.clone(),
            rate: self.rate.clone(),
            countries: self.countries.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub exclusion_number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ruling {
    pub ruling_number: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub ruling_date: Option<NaiveDate>,
}

/// Federal notice as published upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub document_number: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl Notice {
    /// Title and abstract joined, the text keyword and code matching run over
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    /// ISO 3166-1 alpha-2
    pub code: String,
    pub name: String,
}

/// Per-country rate row, unique on (product_id, country_id, effective_date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffRate {
    pub id: i64,
    pub product_id: ProductId,
    pub country_id: CountryId,
    pub effective_date: NaiveDate,
    pub base_rate: f64,
    pub additional_rates: Vec<AdditionalRate>,
    pub total_rate: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TariffRateRecord {
    pub product_id: ProductId,
    pub country_id: CountryId,
    pub effective_date: NaiveDate,
    pub base_rate: f64,
    pub additional_rates: Vec<AdditionalRate>,
    pub total_rate: f64,
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Hash, Eq, EnumString, VariantNames, EnumIter, Deserialize, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    Products,
    Tariffs,
    Updates,
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Hash, Eq, EnumString, VariantNames, Deserialize, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncStatus::Completed | SyncStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

#[derive(Copy, Clone, Debug, Display, PartialEq, Hash, Eq, EnumString, VariantNames, Deserialize, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    RateChange,
    NewRuling,
    Exclusion,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub notify_changes: bool,
}

#[derive(
    Copy, Clone, Debug, Display, PartialEq, Hash, Eq, PartialOrd, Ord, EnumString, VariantNames, Deserialize, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

/// A notice ingested by the updates sync
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdate {
    pub id: i64,
    pub document_number: String,
    pub title: String,
    pub abstract_text: String,
    pub publication_date: Option<NaiveDate>,
    pub impact: ImpactLevel,
    pub created_at: DateTime<Utc>,
}

impl TradeUpdate {
    pub fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.abstract_text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTradeUpdate {
    pub document_number: String,
    pub title: String,
    pub abstract_text: String,
    pub publication_date: Option<NaiveDate>,
    pub impact: ImpactLevel,
}

/// The dimensions of a product that change notifications are derived from
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProductSnapshot {
    pub total_rate: f64,
    pub ruling_count: usize,
    pub exclusion_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_rate_value_numeric_parsing() {
        assert_eq!(RateValue::from(2.5).as_numeric(), Some(2.5));
        assert_eq!(RateValue::from("2.5").as_numeric(), Some(2.5));
        assert_eq!(RateValue::from(" 7.5% ").as_numeric(), Some(7.5));
        assert_eq!(RateValue::from("abc").as_numeric(), None);
        assert_eq!(RateValue::from("Free").as_numeric(), None);
        assert_eq!(RateValue::Numeric(f64::NAN).as_numeric(), None);
    }

    #[test]
    fn test_rate_value_deserializes_untagged() {
        let rates: Vec<AdditionalRate> = serde_json::from_str(
            r#"[{"type":"section_301","rate":25},{"type":"standard","rate":"abc","countries":["CN"]}]"#,
        )
        .unwrap();
        assert_eq!(rates[0].rate, RateValue::Numeric(25.0));
        assert_eq!(rates[1].rate, RateValue::Text("abc".to_string()));
        assert!(rates[1].applies_to("cn"));
        assert!(!rates[1].applies_to("MX"));
        assert!(rates[0].applies_to("MX"));
    }

    #[test]
    fn test_enum_string_forms() {
        assert_eq!(SyncType::Products.to_string(), "products");
        assert_eq!(SyncType::from_str("tariffs").unwrap(), SyncType::Tariffs);
        assert_eq!(NotificationType::RateChange.to_string(), "rate_change");
        assert_eq!(ImpactLevel::from_str("high").unwrap(), ImpactLevel::High);
        assert!(SyncStatus::Failed.is_terminal());
        assert!(!SyncStatus::Running.is_terminal());
    }
}
