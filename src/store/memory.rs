use super::{StoreResult, TariffStore};
use crate::error::StoreError;
use crate::logic::types::{
    Country, CountryId, Exclusion, NewNotification, NewTradeUpdate, Notice, Notification, Product, ProductId,
    ProductRecord, ProductSnapshot, Ruling, SpecialTariff, SyncRun, SyncStatus, SyncType, TariffRate,
    TariffRateRecord, TradeUpdate, WatchlistEntry,
};
use ahash::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashSet;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    next_id: i64,
    products: HashMap<ProductId, Product>,
    product_ids: HashMap<String, ProductId>,
    special_tariffs: HashMap<(ProductId, String), SpecialTariff>,
    exclusions: HashMap<(ProductId, String), Exclusion>,
    // A ruling may cover several codes, so each product keeps its own row
    rulings: HashMap<(ProductId, String), Ruling>,
    product_notices: HashMap<(ProductId, String), Notice>,
    countries: Vec<Country>,
    tariff_rates: HashMap<(ProductId, CountryId, NaiveDate), TariffRate>,
    trade_updates: Vec<TradeUpdate>,
    trade_update_ids: HashMap<String, i64>,
    watchlist: Vec<WatchlistEntry>,
    notifications: Vec<Notification>,
    sync_runs: Vec<SyncRun>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process [`TariffStore`], used by tests and the demo wiring.
///
/// Operations named through [`MemoryStore::fail_operation`] return
/// `StoreError::Unavailable` until cleared, which is how callers exercise
/// persistence outages. [`MemoryStore::fail_operation_once`] fails only the
/// next call.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: DashSet<&'static str>,
    failing_once: DashSet<&'static str>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_operation(&self, operation: &'static str) {
        self.failing.insert(operation);
    }

    pub fn fail_operation_once(&self, operation: &'static str) {
        self.failing_once.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failing.clear();
        self.failing_once.clear();
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.failing.contains(operation) || self.failing_once.remove(operation).is_some() {
            return Err(StoreError::Unavailable(format!("{} is failing", operation)));
        }
        Ok(())
    }

    pub async fn add_country(&self, code: &str, name: &str) -> Country {
        let mut tables = self.tables.write().await;
        let country = Country {
            id: tables.next_id(),
            code: code.to_string(),
            name: name.to_string(),
        };
        tables.countries.push(country.clone());
        country
    }

    /// Insert or replace the watchlist entry for (user, product)
    pub async fn add_watch(&self, entry: WatchlistEntry) {
        let mut tables = self.tables.write().await;
        tables
            .watchlist
            .retain(|existing| !(existing.user_id == entry.user_id && existing.product_id == entry.product_id));
        tables.watchlist.push(entry);
    }

    pub async fn set_last_updated(&self, hts_code: &str, last_updated: DateTime<Utc>) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let id = *tables
            .product_ids
            .get(hts_code)
            .ok_or_else(|| StoreError::not_found("product", hts_code))?;
        if let Some(product) = tables.products.get_mut(&id) {
            product.last_updated = last_updated;
        }
        Ok(())
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.tables.read().await.notifications.clone()
    }

    pub async fn trade_updates(&self) -> Vec<TradeUpdate> {
        self.tables.read().await.trade_updates.clone()
    }

    pub async fn tariff_rates(&self) -> Vec<TariffRate> {
        self.tables.read().await.tariff_rates.values().cloned().collect()
    }

    pub async fn product_notice_count(&self, product_id: ProductId) -> usize {
        let tables = self.tables.read().await;
        tables.product_notices.keys().filter(|(id, _)| *id == product_id).count()
    }

    pub async fn special_tariff_count(&self, product_id: ProductId) -> usize {
        let tables = self.tables.read().await;
        tables.special_tariffs.keys().filter(|(id, _)| *id == product_id).count()
    }
}

#[async_trait]
impl TariffStore for MemoryStore {
    async fn upsert_product(&self, record: ProductRecord) -> StoreResult<Product> {
        self.check("upsert_product")?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(id) = tables.product_ids.get(&record.hts_code).copied() {
            let product = tables
                .products
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("product", id))?;
            product.description = record.description;
            if let Some(category) = record.category {
                product.category = Some(category);
            }
            product.base_rate = record.base_rate;
            product.additional_rates = record.additional_rates;
            product.agreements = record.agreements;
            product.last_updated = now;
            return Ok(product.clone());
        }

        let id = tables.next_id();
        let product = Product {
            id,
            hts_code: record.hts_code.clone(),
            description: record.description,
            category: record.category,
            base_rate: record.base_rate,
            additional_rates: record.additional_rates,
            agreements: record.agreements,
            total_rate: record.base_rate,
            last_updated: now,
        };
        tables.product_ids.insert(record.hts_code, id);
        tables.products.insert(id, product.clone());
        Ok(product)
    }

    async fn update_product_total(
        &self,
        id: ProductId,
        total_rate: f64,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<Product> {
        self.check("update_product_total")?;
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))?;
        product.total_rate = total_rate;
        product.last_updated = updated_at;
        Ok(product.clone())
    }

    async fn product_by_code(&self, hts_code: &str) -> StoreResult<Option<Product>> {
        self.check("product_by_code")?;
        let tables = self.tables.read().await;
        Ok(tables
            .product_ids
            .get(hts_code)
            .and_then(|id| tables.products.get(id))
            .cloned())
    }

    async fn products_by_codes(&self, hts_codes: &[String]) -> StoreResult<Vec<Product>> {
        self.check("products_by_codes")?;
        let tables = self.tables.read().await;
        Ok(hts_codes
            .iter()
            .filter_map(|code| tables.product_ids.get(code))
            .filter_map(|id| tables.products.get(id))
            .cloned()
            .collect())
    }

    async fn list_products(&self) -> StoreResult<Vec<Product>> {
        self.check("list_products")?;
        let tables = self.tables.read().await;
        let mut products: Vec<Product> = tables.products.values().cloned().collect();
        products.sort_by_key(|product| product.id);
        Ok(products)
    }

    async fn stale_product_codes(&self, older_than: DateTime<Utc>, limit: usize) -> StoreResult<Vec<String>> {
        self.check("stale_product_codes")?;
        let tables = self.tables.read().await;
        let mut stale: Vec<&Product> = tables
            .products
            .values()
            .filter(|product| product.last_updated < older_than)
            .collect();
        stale.sort_by(|a, b| a.last_updated.cmp(&b.last_updated).then_with(|| a.hts_code.cmp(&b.hts_code)));
        Ok(stale
            .into_iter()
            .take(limit)
            .map(|product| product.hts_code.clone())
            .collect())
    }

    async fn upsert_special_tariffs(&self, product_id: ProductId, tariffs: &[SpecialTariff]) -> StoreResult<usize> {
        self.check("upsert_special_tariffs")?;
        let mut tables = self.tables.write().await;
        for tariff in tariffs {
            tables
                .special_tariffs
                .insert((product_id, tariff.tariff_type.clone()), tariff.clone());
        }
        Ok(tariffs.len())
    }

    async fn upsert_exclusions(&self, product_id: ProductId, exclusions: &[Exclusion]) -> StoreResult<usize> {
        self.check("upsert_exclusions")?;
        let mut tables = self.tables.write().await;
        for exclusion in exclusions {
            tables
                .exclusions
                .insert((product_id, exclusion.exclusion_number.clone()), exclusion.clone());
        }
        Ok(exclusions.len())
    }

    async fn upsert_rulings(&self, product_id: ProductId, rulings: &[Ruling]) -> StoreResult<usize> {
        self.check("upsert_rulings")?;
        let mut tables = self.tables.write().await;
        for ruling in rulings {
            tables
                .rulings
                .insert((product_id, ruling.ruling_number.clone()), ruling.clone());
        }
        Ok(rulings.len())
    }

    async fn upsert_product_notices(&self, product_id: ProductId, notices: &[Notice]) -> StoreResult<usize> {
        self.check("upsert_product_notices")?;
        let mut tables = self.tables.write().await;
        for notice in notices {
            tables
                .product_notices
                .insert((product_id, notice.document_number.clone()), notice.clone());
        }
        Ok(notices.len())
    }

    async fn product_snapshot(&self, product_id: ProductId) -> StoreResult<ProductSnapshot> {
        self.check("product_snapshot")?;
        let tables = self.tables.read().await;
        let product = tables
            .products
            .get(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        Ok(ProductSnapshot {
            total_rate: product.total_rate,
            ruling_count: tables.rulings.keys().filter(|(id, _)| *id == product_id).count(),
            exclusion_count: tables.exclusions.keys().filter(|(id, _)| *id == product_id).count(),
        })
    }

    async fn list_countries(&self) -> StoreResult<Vec<Country>> {
        self.check("list_countries")?;
        Ok(self.tables.read().await.countries.clone())
    }

    async fn latest_tariff_rate(
        &self,
        product_id: ProductId,
        country_id: CountryId,
    ) -> StoreResult<Option<TariffRate>> {
        self.check("latest_tariff_rate")?;
        let tables = self.tables.read().await;
        Ok(tables
            .tariff_rates
            .values()
            .filter(|rate| rate.product_id == product_id && rate.country_id == country_id)
            .max_by_key(|rate| rate.effective_date)
            .cloned())
    }

    async fn upsert_tariff_rate(&self, record: TariffRateRecord) -> StoreResult<TariffRate> {
        self.check("upsert_tariff_rate")?;
        let mut tables = self.tables.write().await;
        let key = (record.product_id, record.country_id, record.effective_date);
        let existing_id = tables.tariff_rates.get(&key).map(|existing| existing.id);
        let id = match existing_id {
            Some(id) => id,
            None => tables.next_id(),
        };
        let rate = TariffRate {
            id,
            product_id: record.product_id,
            country_id: record.country_id,
            effective_date: record.effective_date,
            base_rate: record.base_rate,
            additional_rates: record.additional_rates,
            total_rate: record.total_rate,
            updated_at: Utc::now(),
        };
        tables.tariff_rates.insert(key, rate.clone());
        Ok(rate)
    }

    async fn insert_trade_update_if_absent(&self, update: NewTradeUpdate) -> StoreResult<Option<TradeUpdate>> {
        self.check("insert_trade_update_if_absent")?;
        let mut tables = self.tables.write().await;
        if tables.trade_update_ids.contains_key(&update.document_number) {
            return Ok(None);
        }
        let id = tables.next_id();
        let trade_update = TradeUpdate {
            id,
            document_number: update.document_number.clone(),
            title: update.title,
            abstract_text: update.abstract_text,
            publication_date: update.publication_date,
            impact: update.impact,
            created_at: Utc::now(),
        };
        tables.trade_update_ids.insert(update.document_number, id);
        tables.trade_updates.push(trade_update.clone());
        Ok(Some(trade_update))
    }

    async fn trade_update_exists(&self, document_number: &str) -> StoreResult<bool> {
        self.check("trade_update_exists")?;
        Ok(self.tables.read().await.trade_update_ids.contains_key(document_number))
    }

    async fn trade_update(&self, id: i64) -> StoreResult<Option<TradeUpdate>> {
        self.check("trade_update")?;
        let tables = self.tables.read().await;
        Ok(tables.trade_updates.iter().find(|update| update.id == id).cloned())
    }

    async fn watchers(&self, product_id: ProductId) -> StoreResult<Vec<WatchlistEntry>> {
        self.check("watchers")?;
        let tables = self.tables.read().await;
        Ok(tables
            .watchlist
            .iter()
            .filter(|entry| entry.product_id == product_id && entry.notify_changes)
            .cloned()
            .collect())
    }

    async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
        self.check("insert_notification")?;
        let mut tables = self.tables.write().await;
        let notification = Notification {
            id: tables.next_id(),
            user_id: notification.user_id,
            title: notification.title,
            message: notification.message,
            notification_type: notification.notification_type,
            read: false,
            created_at: Utc::now(),
        };
        tables.notifications.push(notification.clone());
        Ok(notification)
    }

    async fn create_sync_run(&self, sync_type: SyncType) -> StoreResult<SyncRun> {
        self.check("create_sync_run")?;
        let mut tables = self.tables.write().await;
        let run = SyncRun {
            id: tables.next_id(),
            sync_type,
            status: SyncStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        };
        tables.sync_runs.push(run.clone());
        Ok(run)
    }

    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncStatus,
        error_message: Option<String>,
    ) -> StoreResult<SyncRun> {
        self.check("finish_sync_run")?;
        if !status.is_terminal() {
            return Err(StoreError::Conflict(format!("sync run {} cannot move to {}", id, status)));
        }
        let mut tables = self.tables.write().await;
        let run = tables
            .sync_runs
            .iter_mut()
            .find(|run| run.id == id)
            .ok_or_else(|| StoreError::not_found("sync run", id))?;
        if run.status.is_terminal() {
            return Err(StoreError::Conflict(format!("sync run {} is already {}", id, run.status)));
        }
        run.status = status;
        run.completed_at = Some(Utc::now());
        run.error_message = error_message;
        Ok(run.clone())
    }

    async fn recent_sync_runs(&self, limit: usize) -> StoreResult<Vec<SyncRun>> {
        self.check("recent_sync_runs")?;
        let tables = self.tables.read().await;
        Ok(tables.sync_runs.iter().rev().take(limit).cloned().collect())
    }
}
