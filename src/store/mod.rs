/// Persistence Layer
///
/// The sync engine talks to storage only through [`TariffStore`]. Every write
/// is an upsert keyed by natural identity (HTS code; product + country +
/// effective date; product + ruling number; document number) so repeated delivery from
/// retries and overlapping runs converges on the same rows.

pub mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::logic::types::{
    Country, CountryId, Exclusion, NewNotification, NewTradeUpdate, Notice, Notification, Product, ProductId,
    ProductRecord, ProductSnapshot, Ruling, SpecialTariff, SyncRun, SyncStatus, SyncType, TariffRate,
    TariffRateRecord, TradeUpdate, WatchlistEntry,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TariffStore: Send + Sync {
    // Products

    /// Insert or update by `hts_code`; identity is assigned on first insert
    async fn upsert_product(&self, record: ProductRecord) -> StoreResult<Product>;

    async fn update_product_total(
        &self,
        id: ProductId,
        total_rate: f64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Product>;

    async fn product_by_code(&self, hts_code: &str) -> StoreResult<Option<Product>>;

    async fn products_by_codes(&self, hts_codes: &[String]) -> StoreResult<Vec<Product>>;

    async fn list_products(&self) -> StoreResult<Vec<Product>>;

    /// Codes last refreshed before `older_than`, oldest first
    async fn stale_product_codes(&self, older_than: DateTime<Utc>, limit: usize) -> StoreResult<Vec<String>>;

    // Dependent collections

    async fn upsert_special_tariffs(&self, product_id: ProductId, tariffs: &[SpecialTariff]) -> StoreResult<usize>;

    async fn upsert_exclusions(&self, product_id: ProductId, exclusions: &[Exclusion]) -> StoreResult<usize>;

    async fn upsert_rulings(&self, product_id: ProductId, rulings: &[Ruling]) -> StoreResult<usize>;

    async fn upsert_product_notices(&self, product_id: ProductId, notices: &[Notice]) -> StoreResult<usize>;

    async fn product_snapshot(&self, product_id: ProductId) -> StoreResult<ProductSnapshot>;

    // Countries and per-country rates

    async fn list_countries(&self) -> StoreResult<Vec<Country>>;

    /// Most recent rate row for the pair by effective date
    async fn latest_tariff_rate(&self, product_id: ProductId, country_id: CountryId) -> StoreResult<Option<TariffRate>>;

    /// Insert or replace on (product_id, country_id, effective_date)
    async fn upsert_tariff_rate(&self, record: TariffRateRecord) -> StoreResult<TariffRate>;

    // Trade updates

    /// Insert unless the document number is already present; `None` when skipped
    async fn insert_trade_update_if_absent(&self, update: NewTradeUpdate) -> StoreResult<Option<TradeUpdate>>;

    async fn trade_update_exists(&self, document_number: &str) -> StoreResult<bool>;

    async fn trade_update(&self, id: i64) -> StoreResult<Option<TradeUpdate>>;

    // Watchers and notifications

    /// Watchlist entries for the product with change notifications switched on
    async fn watchers(&self, product_id: ProductId) -> StoreResult<Vec<WatchlistEntry>>;

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification>;

    // Sync runs

    async fn create_sync_run(&self, sync_type: SyncType) -> StoreResult<SyncRun>;

    /// Move a running row to a terminal status; a row that is already terminal is a conflict
    async fn finish_sync_run(&self, id: i64, status: SyncStatus, error_message: Option<String>) -> StoreResult<SyncRun>;

    /// Newest first
    async fn recent_sync_runs(&self, limit: usize) -> StoreResult<Vec<SyncRun>>;
}
