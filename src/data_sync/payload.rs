//! Upstream payload shapes and their validation.
//!
//! Each source answers with loosely-typed JSON. Payloads are first decoded into
//! the DTOs below and then validated into the typed results the aggregator
//! consumes; nothing is silently defaulted past this point.

use crate::error::{SyncError, ValidationError};
use crate::logic::hts::{chapter_of, is_valid_hts_code};
use crate::logic::types::{AdditionalRate, Exclusion, Notice, RateValue, Ruling, SpecialTariff};
use crate::utils::constants::SourceName;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub fn decode<T: DeserializeOwned>(source_name: &str, body: Value) -> Result<T, SyncError> {
    serde_json::from_value(body).map_err(|e| SyncError::decode(source_name, e))
}

fn ensure_code(source_name: &str, requested: &str, returned: &str) -> Result<(), ValidationError> {
    if !is_valid_hts_code(returned) {
        return Err(ValidationError::new(source_name, format!("malformed HTS code {:?}", returned)));
    }
    if returned != requested {
        return Err(ValidationError::new(
            source_name,
            format!("asked for {} but received {}", requested, returned),
        ));
    }
    Ok(())
}

/// General (column 1) rate for one code
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralRates {
    pub hts_code: String,
    pub description: String,
    pub base_rate: f64,
    pub additional_rates: Vec<AdditionalRate>,
}

#[derive(Debug, Deserialize)]
pub struct GeneralRatesDto {
    pub hts_code: String,
    #[serde(default)]
    pub description: String,
    pub base_rate: RateValue,
    #[serde(default)]
    pub additional_rates: Vec<AdditionalRate>,
}

impl GeneralRatesDto {
    pub fn validate(self, requested: &str) -> Result<GeneralRates, ValidationError> {
        let source = SourceName::GENERAL_RATES;
        ensure_code(source, requested, &self.hts_code)?;

        let base_rate = match &self.base_rate {
            RateValue::Text(text) if text.trim().eq_ignore_ascii_case("free") => 0.0,
            value => value
                .as_numeric()
                .ok_or_else(|| ValidationError::new(source, format!("non-numeric base rate {:?}", value)))?,
        };
        if base_rate < 0.0 {
            return Err(ValidationError::new(source, format!("negative base rate {}", base_rate)));
        }
        if let Some(rate) = self.additional_rates.iter().find(|rate| rate.rate_type.trim().is_empty()) {
            return Err(ValidationError::new(source, format!("additional rate without type: {:?}", rate.rate)));
        }

        Ok(GeneralRates {
            hts_code: self.hts_code,
            description: self.description,
            base_rate,
            additional_rates: self.additional_rates,
        })
    }
}

/// Codes contained in one tariff chapter
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterListing {
    pub chapter: u8,
    pub title: String,
    pub codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChapterListingDto {
    pub chapter: u8,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub codes: Vec<String>,
}

impl ChapterListingDto {
    pub fn validate(self, requested: u8) -> Result<ChapterListing, ValidationError> {
        let source = SourceName::GENERAL_RATES;
        if self.chapter != requested {
            return Err(ValidationError::new(
                source,
                format!("asked for chapter {} but received {}", requested, self.chapter),
            ));
        }
        if let Some(code) = self.codes.iter().find(|code| !is_valid_hts_code(code)) {
            return Err(ValidationError::new(source, format!("malformed HTS code {:?} in listing", code)));
        }
        if let Some(code) = self.codes.iter().find(|code| chapter_of(code) != Some(requested)) {
            return Err(ValidationError::new(
                source,
                format!("code {} does not belong to chapter {:02}", code, requested),
            ));
        }
        let title = if self.title.trim().is_empty() {
            format!("Chapter {:02}", self.chapter)
        } else {
            self.title
        };
        Ok(ChapterListing {
            chapter: self.chapter,
            title,
            codes: self.codes,
        })
    }
}

/// Special tariffs, exclusions and agreement eligibility for one code
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpecialTariffData {
    pub special_tariffs: Vec<SpecialTariff>,
    pub exclusions: Vec<Exclusion>,
    pub agreements: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SpecialTariffDto {
    pub hts_code: String,
    #[serde(default)]
    pub special_tariffs: Vec<SpecialTariff>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
    #[serde(default)]
    pub agreements: Vec<String>,
}

impl SpecialTariffDto {
    pub fn validate(self, requested: &str) -> Result<SpecialTariffData, ValidationError> {
        let source = SourceName::SPECIAL_TARIFFS;
        ensure_code(source, requested, &self.hts_code)?;
        if self.special_tariffs.iter().any(|t| t.tariff_type.trim().is_empty()) {
            return Err(ValidationError::new(source, "special tariff without type"));
        }
        if self.exclusions.iter().any(|e| e.exclusion_number.trim().is_empty()) {
            return Err(ValidationError::new(source, "exclusion without number"));
        }
        Ok(SpecialTariffData {
            special_tariffs: self.special_tariffs,
            exclusions: self.exclusions,
            agreements: self.agreements,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct RulingsDto {
    #[serde(default)]
    pub rulings: Vec<Ruling>,
}

impl RulingsDto {
    pub fn validate(self) -> Result<Vec<Ruling>, ValidationError> {
        if self.rulings.iter().any(|r| r.ruling_number.trim().is_empty()) {
            return Err(ValidationError::new(SourceName::RULINGS, "ruling without number"));
        }
        Ok(self.rulings)
    }
}

/// Notices that passed validation, and why the others did not
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoticeBatch {
    pub notices: Vec<Notice>,
    pub rejected: Vec<ValidationError>,
}

impl NoticeBatch {
    /// Every notice, or the first rejection
    pub fn into_strict(self) -> Result<Vec<Notice>, ValidationError> {
        match self.rejected.into_iter().next() {
            Some(rejection) => Err(rejection),
            None => Ok(self.notices),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NoticesDto {
    #[serde(default)]
    pub results: Vec<Value>,
}

impl NoticesDto {
    /// Validate each entry on its own; a bad entry never hides the good ones
    pub fn validate(self) -> NoticeBatch {
        let mut batch = NoticeBatch::default();
        for entry in self.results {
            match validate_notice(entry) {
                Ok(notice) => batch.notices.push(notice),
                Err(rejection) => batch.rejected.push(rejection),
            }
        }
        batch
    }
}

fn validate_notice(entry: Value) -> Result<Notice, ValidationError> {
    let source = SourceName::NOTICES;
    let notice: Notice = serde_json::from_value(entry)
        .map_err(|e| ValidationError::new(source, format!("unreadable notice: {}", e)))?;
    if notice.document_number.trim().is_empty() {
        return Err(ValidationError::new(source, "notice without document number"));
    }
    if notice.title.trim().is_empty() {
        return Err(ValidationError::new(
            source,
            format!("notice {} without title", notice.document_number),
        ));
    }
    Ok(notice)
}
