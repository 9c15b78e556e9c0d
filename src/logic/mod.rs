/// Logic Layer - Tariff domain
///
/// Pure domain types and computations shared by the sync engine:
/// - Product, tariff-rate, sync-run and notification models
/// - Total-rate arithmetic and trade-agreement adjustment
/// - Impact classification and HTS code matching

pub mod types;
pub mod rates;
pub mod impact;
pub mod hts;

pub use types::{
    AdditionalRate, Country, CountryId, Exclusion, ImpactLevel, NewNotification, NewTradeUpdate, Notice,
    Notification, NotificationType, Product, ProductId, ProductRecord, ProductSnapshot, RateValue, Ruling,
    SpecialTariff, SyncRun, SyncStatus, SyncType, TariffRate, TariffRateRecord, TradeUpdate, UserId,
    WatchlistEntry,
};
pub use rates::{apply_agreement, compute_total_rate, is_material_change, rates_for_country};
pub use impact::classify_impact;
pub use hts::{chapter_of, extract_hts_codes, is_valid_hts_code};
