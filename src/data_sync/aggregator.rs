use super::sources::SourceClients;
use crate::error::SyncResult;
use crate::logic::rates::compute_total_rate;
use crate::logic::types::{
    AdditionalRate, CountryId, Product, ProductId, ProductRecord, ProductSnapshot, TariffRate, TariffRateRecord,
};
use crate::notify::NotificationTrigger;
use crate::store::TariffStore;
use crate::utils::constants::STALE_AFTER;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What one aggregation wrote
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    pub product: Product,
    pub previous: Option<ProductSnapshot>,
    pub current: ProductSnapshot,
    pub notifications_sent: usize,
}

/// Merges the four sources for one product code into persisted state.
///
/// Aggregation is all-or-nothing on the fetch side: if any source fails,
/// nothing is written and the error goes back to the caller (normally the
/// retry queue, which re-runs the whole aggregation). Writes are upserts, so
/// a re-run after a partial write converges.
pub struct Aggregator {
    sources: Arc<SourceClients>,
    store: Arc<dyn TariffStore>,
    notifier: Arc<NotificationTrigger>,
}

impl Aggregator {
    pub fn new(sources: Arc<SourceClients>, store: Arc<dyn TariffStore>, notifier: Arc<NotificationTrigger>) -> Self {
        Self {
            sources,
            store,
            notifier,
        }
    }

    /// Fetch, merge and persist one product, notifying watchers of material changes.
    ///
    /// `category` of `None` keeps the stored category.
    pub async fn aggregate(&self, hts_code: &str, category: Option<&str>) -> SyncResult<AggregateOutcome> {
        let start_time = Instant::now();
        debug!("Aggregating {}", hts_code);

        let (general, special, rulings, notices) = tokio::try_join!(
            self.sources.general_rates.fetch_rates(hts_code),
            self.sources.special_tariffs.fetch_special(hts_code),
            self.sources.rulings.fetch_rulings(hts_code),
            self.sources.notices.fetch_for_code(hts_code),
        )?;
        let fetch_elapsed = start_time.elapsed();

        let previous = match self.store.product_by_code(hts_code).await? {
            Some(existing) => Some(self.store.product_snapshot(existing.id).await?),
            None => None,
        };

        let additional_rates: Vec<AdditionalRate> = general
            .additional_rates
            .iter()
            .cloned()
            .chain(special.special_tariffs.iter().map(|tariff| tariff.to_additional_rate()))
            .collect();

        let product = self
            .store
            .upsert_product(ProductRecord {
                hts_code: hts_code.to_string(),
                description: general.description,
                category: category.map(str::to_string),
                base_rate: general.base_rate,
                additional_rates,
                agreements: special.agreements,
            })
            .await?;

        self.store.upsert_special_tariffs(product.id, &special.special_tariffs).await?;
        self.store.upsert_exclusions(product.id, &special.exclusions).await?;
        self.store.upsert_rulings(product.id, &rulings).await?;
        self.store.upsert_product_notices(product.id, &notices).await?;

        let total_rate = compute_total_rate(product.base_rate, &product.additional_rates);
        let product = self.store.update_product_total(product.id, total_rate, Utc::now()).await?;
        let current = self.store.product_snapshot(product.id).await?;

        // Notification failures never undo a completed write
        let notifications_sent = match &previous {
            Some(previous) => match self.notifier.diff_and_notify(product.id, previous, &current).await {
                Ok(sent) => sent,
                Err(e) => {
                    warn!("Failed to notify watchers of {}: {}", hts_code, e);
                    0
                }
            },
            None => 0,
        };

        info!(
            "Aggregated {}: total rate {:.2}% ({} rulings, {} exclusions, {} notices) in {:?} (fetch {:?})",
            hts_code,
            product.total_rate,
            rulings.len(),
            special.exclusions.len(),
            notices.len(),
            start_time.elapsed(),
            fetch_elapsed
        );

        Ok(AggregateOutcome {
            product,
            previous,
            current,
            notifications_sent,
        })
    }

    /// Codes not refreshed within the freshness window, oldest first
    pub async fn find_stale(&self, limit: usize) -> SyncResult<Vec<String>> {
        let window = chrono::Duration::from_std(STALE_AFTER).unwrap_or_else(|_| chrono::Duration::days(7));
        let cutoff = Utc::now() - window;
        Ok(self.store.stale_product_codes(cutoff, limit).await?)
    }

    /// Upsert the per-country rate row, recomputing its total from the given inputs.
    pub async fn update_tariff_rate(
        &self,
        product_id: ProductId,
        country_id: CountryId,
        base_rate: f64,
        additional_rates: Vec<AdditionalRate>,
        effective_date: NaiveDate,
    ) -> SyncResult<TariffRate> {
        let total_rate = compute_total_rate(base_rate, &additional_rates);
        let rate = self
            .store
            .upsert_tariff_rate(TariffRateRecord {
                product_id,
                country_id,
                effective_date,
                base_rate,
                additional_rates,
                total_rate,
            })
            .await?;
        Ok(rate)
    }

    pub fn notifier(&self) -> &Arc<NotificationTrigger> {
        &self.notifier
    }

    pub fn store(&self) -> &Arc<dyn TariffStore> {
        &self.store
    }

    pub fn sources(&self) -> &Arc<SourceClients> {
        &self.sources
    }
}
