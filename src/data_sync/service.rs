use crate::data_sync::{
    aggregator::Aggregator,
    config::SyncConfig,
    context::SyncContext,
    lease::SyncLeases,
    retry_queue::{QueueStats, RetryPolicy, RetryQueue},
    sources::SourceTransports,
};
use crate::error::{SyncError, SyncResult};
use crate::logic::impact::classify_impact;
use crate::logic::rates::{apply_agreement, is_material_change, rates_for_country};
use crate::logic::types::{Country, NewTradeUpdate, Notice, NotificationType, Product, SyncRun, SyncStatus, SyncType};
use crate::store::{MemoryStore, TariffStore};
use crate::utils::cache::{CacheTier, TieredCacheStats};
use crate::utils::constants::{HTS_CHAPTER_COUNT, agreement_for_country};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info, warn};

/// Summary of one finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRunReport {
    pub run_id: i64,
    pub sync_type: SyncType,
    pub status: SyncStatus,
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    /// Rows written by successful items
    pub written: usize,
    /// Items that were already up to date
    pub skipped: usize,
    /// Upstream entries dropped by validation before they were queued
    pub rejected: usize,
    pub notifications: usize,
}

#[derive(Debug, Default)]
struct RunCounters {
    written: AtomicUsize,
    skipped: AtomicUsize,
    rejected: AtomicUsize,
    notifications: AtomicUsize,
}

impl RunCounters {
    fn add_written(&self, n: usize) {
        self.written.fetch_add(n, Ordering::Relaxed);
    }

    fn add_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    fn add_rejected(&self, n: usize) {
        self.rejected.fetch_add(n, Ordering::Relaxed);
    }

    fn add_notifications(&self, n: usize) {
        self.notifications.fetch_add(n, Ordering::Relaxed);
    }
}

/// Runs the three sync types against the shared context.
///
/// Each run takes a per-type lease, records a `SyncRun` row, fans its items
/// out to a fresh retry queue and waits for the queue to go idle. Per-item
/// failures are absorbed by the queue; only setup failures fail the run.
pub struct SyncService {
    context: Arc<SyncContext>,
    aggregator: Arc<Aggregator>,
    leases: SyncLeases,
}

impl SyncService {
    pub fn new(context: Arc<SyncContext>) -> Self {
        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(context.sources()),
            Arc::clone(context.store()),
            Arc::clone(context.notifier()),
        ));
        Self {
            context,
            aggregator,
            leases: SyncLeases::new(),
        }
    }

    /// Refresh products, either every code in every chapter or only the stale ones
    pub async fn run_product_sync(&self, full: bool) -> SyncResult<SyncRunReport> {
        let aggregator = Arc::clone(&self.aggregator);
        let batch_size = self.context.config().batch_size;

        self.execute(SyncType::Products, move |queue, counters| async move {
            if full {
                info!("Enumerating {} chapters", HTS_CHAPTER_COUNT);
                for chapter in 1..=HTS_CHAPTER_COUNT {
                    submit_chapter(&queue, &aggregator, chapter, &counters);
                }
            } else {
                let stale = aggregator.find_stale(batch_size).await?;
                info!("Refreshing {} stale products", stale.len());
                for code in stale {
                    submit_aggregate(&queue, &aggregator, code, None, &counters);
                }
            }
            Ok(())
        })
        .await
    }

    /// Recompute per-country rates for every product
    pub async fn run_tariff_sync(&self) -> SyncResult<SyncRunReport> {
        let aggregator = Arc::clone(&self.aggregator);
        let store = Arc::clone(self.context.store());

        self.execute(SyncType::Tariffs, move |queue, counters| async move {
            let products = store.list_products().await?;
            let countries = store.list_countries().await?;
            let effective_date = Utc::now().date_naive();
            info!(
                "Computing tariff rates for {} products x {} countries",
                products.len(),
                countries.len()
            );

            let countries: Vec<Arc<Country>> = countries.into_iter().map(Arc::new).collect();
            for product in products {
                let product = Arc::new(product);
                for country in &countries {
                    submit_tariff(&queue, &aggregator, &product, country, effective_date, &counters);
                }
            }
            Ok(())
        })
        .await
    }

    /// Ingest recent notices as trade updates
    pub async fn run_update_sync(&self) -> SyncResult<SyncRunReport> {
        let aggregator = Arc::clone(&self.aggregator);

        self.execute(SyncType::Updates, move |queue, counters| async move {
            let batch = aggregator.sources().notices.fetch_recent().await?;
            info!(
                "Fetched {} recent notices, {} rejected",
                batch.notices.len(),
                batch.rejected.len()
            );
            for rejection in &batch.rejected {
                warn!("Skipping notice: {}", rejection);
            }
            counters.add_rejected(batch.rejected.len());
            for notice in batch.notices {
                submit_notice(&queue, &aggregator, notice, &counters);
            }
            Ok(())
        })
        .await
    }

    pub fn cache_stats(&self) -> TieredCacheStats {
        self.context.cache().stats()
    }

    pub fn clear_cache(&self, tier: Option<CacheTier>) {
        self.context.cache().clear(tier);
    }

    /// Most recent runs across all types, newest first
    pub async fn sync_status(&self, limit: usize) -> SyncResult<Vec<SyncRun>> {
        Ok(self.context.store().recent_sync_runs(limit).await?)
    }

    pub fn is_running(&self, sync_type: SyncType) -> bool {
        self.leases.is_held(sync_type)
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.context
    }

    pub fn aggregator(&self) -> &Arc<Aggregator> {
        &self.aggregator
    }

    fn new_queue(&self, sync_type: SyncType) -> RetryQueue {
        let config = self.context.config();
        RetryQueue::new(
            format!("{}-sync", sync_type),
            config.concurrency,
            RetryPolicy::new(config.retries, config.retry_base_delay(), config.retry_max_delay()),
        )
    }

    async fn execute<F, Fut>(&self, sync_type: SyncType, setup: F) -> SyncResult<SyncRunReport>
    where
        F: FnOnce(RetryQueue, Arc<RunCounters>) -> Fut,
        Fut: Future<Output = SyncResult<()>>,
    {
        let _lease = self.leases.acquire(sync_type)?;
        let store = self.context.store();
        let run = store.create_sync_run(sync_type).await?;
        info!("Starting {} sync (run {})", sync_type, run.id);

        let queue = self.new_queue(sync_type);
        let counters = Arc::new(RunCounters::default());
        let setup_result = setup(queue.clone(), Arc::clone(&counters)).await;

        // Items already submitted still settle before the lease is released
        queue.on_idle().await;
        let stats = queue.stats();

        match setup_result {
            Ok(()) => {
                if let Err(e) = store.finish_sync_run(run.id, SyncStatus::Completed, None).await {
                    error!("Failed to mark run {} as completed: {}", run.id, e);
                    // Never leave the row running once the lease is released
                    let marked = store.finish_sync_run(run.id, SyncStatus::Failed, Some(e.to_string())).await;
                    if let Err(finish_err) = marked {
                        error!("Failed to mark run {} as failed: {}", run.id, finish_err);
                    }
                    return Err(e.into());
                }
                let report = build_report(run.id, sync_type, SyncStatus::Completed, stats, &counters);
                info!(
                    "{} sync (run {}) completed: {} succeeded, {} failed, {} written, {} skipped, {} notifications",
                    sync_type,
                    run.id,
                    report.succeeded,
                    report.failed,
                    report.written,
                    report.skipped,
                    report.notifications
                );
                Ok(report)
            }
            Err(e) => {
                error!("{} sync (run {}) failed: {}", sync_type, run.id, e);
                if let Err(finish_err) = store.finish_sync_run(run.id, SyncStatus::Failed, Some(e.to_string())).await {
                    error!("Failed to mark run {} as failed: {}", run.id, finish_err);
                }
                Err(e)
            }
        }
    }
}

fn build_report(
    run_id: i64,
    sync_type: SyncType,
    status: SyncStatus,
    stats: QueueStats,
    counters: &RunCounters,
) -> SyncRunReport {
    let rejected = counters.rejected.load(Ordering::Relaxed);
    SyncRunReport {
        run_id,
        sync_type,
        status,
        submitted: stats.submitted,
        succeeded: stats.succeeded,
        // Rejected entries count as per-item failures
        failed: stats.failed + rejected as u64,
        retried: stats.retried,
        written: counters.written.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
        rejected,
        notifications: counters.notifications.load(Ordering::Relaxed),
    }
}

/// List a chapter and queue an aggregation for each code in it
fn submit_chapter(queue: &RetryQueue, aggregator: &Arc<Aggregator>, chapter: u8, counters: &Arc<RunCounters>) {
    let inner_queue = queue.clone();
    let aggregator = Arc::clone(aggregator);
    let counters = Arc::clone(counters);

    queue.submit(format!("chapter {:02}", chapter), move || {
        let queue = inner_queue.clone();
        let aggregator = Arc::clone(&aggregator);
        let counters = Arc::clone(&counters);
        async move {
            let listing = aggregator.sources().general_rates.list_chapter(chapter).await?;
            debug!("Chapter {:02} lists {} codes", chapter, listing.codes.len());
            let count = listing.codes.len();
            for code in listing.codes {
                submit_aggregate(&queue, &aggregator, code, Some(listing.title.clone()), &counters);
            }
            Ok::<_, SyncError>(count)
        }
    });
}

fn submit_aggregate(
    queue: &RetryQueue,
    aggregator: &Arc<Aggregator>,
    hts_code: String,
    category: Option<String>,
    counters: &Arc<RunCounters>,
) {
    let aggregator = Arc::clone(aggregator);
    let counters = Arc::clone(counters);

    queue.submit(format!("aggregate {}", hts_code), move || {
        let aggregator = Arc::clone(&aggregator);
        let counters = Arc::clone(&counters);
        let hts_code = hts_code.clone();
        let category = category.clone();
        async move {
            let outcome = aggregator.aggregate(&hts_code, category.as_deref()).await?;
            counters.add_written(1);
            counters.add_notifications(outcome.notifications_sent);
            Ok::<_, SyncError>(())
        }
    });
}

fn submit_tariff(
    queue: &RetryQueue,
    aggregator: &Arc<Aggregator>,
    product: &Arc<Product>,
    country: &Arc<Country>,
    effective_date: NaiveDate,
    counters: &Arc<RunCounters>,
) {
    let aggregator = Arc::clone(aggregator);
    let product = Arc::clone(product);
    let country = Arc::clone(country);
    let counters = Arc::clone(counters);

    queue.submit(format!("tariff {}/{}", product.hts_code, country.code), move || {
        let aggregator = Arc::clone(&aggregator);
        let product = Arc::clone(&product);
        let country = Arc::clone(&country);
        let counters = Arc::clone(&counters);
        async move {
            let applicable = rates_for_country(&product.additional_rates, &country.code);
            let adjusted = apply_agreement(agreement_for_country(&country.code), applicable);

            let previous = aggregator.store().latest_tariff_rate(product.id, country.id).await?;
            let rate = aggregator
                .update_tariff_rate(product.id, country.id, product.base_rate, adjusted, effective_date)
                .await?;
            counters.add_written(1);

            let Some(previous) = previous else {
                return Ok::<_, SyncError>(());
            };
            if !is_material_change(previous.total_rate, rate.total_rate) {
                return Ok(());
            }

            let message = format!(
                "Rate for {} from {} changed from {:.2}% to {:.2}%",
                product.hts_code, country.name, previous.total_rate, rate.total_rate
            );
            match aggregator
                .notifier()
                .notify_watchers(product.id, "Tariff rate change", &message, NotificationType::RateChange)
                .await
            {
                Ok(sent) => counters.add_notifications(sent),
                Err(e) => warn!("Failed to notify watchers of {}: {}", product.hts_code, e),
            }
            Ok(())
        }
    });
}

fn submit_notice(queue: &RetryQueue, aggregator: &Arc<Aggregator>, notice: Notice, counters: &Arc<RunCounters>) {
    let aggregator = Arc::clone(aggregator);
    let counters = Arc::clone(counters);

    queue.submit(format!("notice {}", notice.document_number), move || {
        let aggregator = Arc::clone(&aggregator);
        let counters = Arc::clone(&counters);
        let notice = notice.clone();
        async move {
            let store = aggregator.store();
            if store.trade_update_exists(&notice.document_number).await? {
                debug!("Notice {} already ingested", notice.document_number);
                counters.add_skipped();
                return Ok::<_, SyncError>(());
            }

            let impact = classify_impact(&notice.searchable_text());
            let inserted = store
                .insert_trade_update_if_absent(NewTradeUpdate {
                    document_number: notice.document_number.clone(),
                    title: notice.title.clone(),
                    abstract_text: notice.abstract_text.clone(),
                    publication_date: notice.publication_date,
                    impact,
                })
                .await?;

            let Some(update) = inserted else {
                counters.add_skipped();
                return Ok(());
            };
            counters.add_written(1);
            info!("Ingested notice {} ({} impact)", update.document_number, update.impact);

            match aggregator.notifier().on_trade_update_ingested(update.id).await {
                Ok(sent) => counters.add_notifications(sent),
                Err(e) => warn!("Failed to notify watchers of update {}: {}", update.id, e),
            }
            Ok(())
        }
    });
}

/// Builder for SyncService to make creation more ergonomic
pub struct SyncServiceBuilder {
    config: Option<SyncConfig>,
    store: Option<Arc<dyn TariffStore>>,
    transports: Option<SourceTransports>,
}

impl SyncServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            store: None,
            transports: None,
        }
    }

    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TariffStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the HTTP transports built from configuration
    pub fn with_transports(mut self, transports: SourceTransports) -> Self {
        self.transports = Some(transports);
        self
    }

    pub fn build(self) -> SyncResult<SyncService> {
        let config = match self.config {
            Some(config) => config,
            None => SyncConfig::from_env()?,
        };
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));

        let context = match self.transports {
            Some(transports) => {
                config.validate()?;
                SyncContext::new(config, store, transports)
            }
            None => SyncContext::from_config(config, store)?,
        };
        Ok(SyncService::new(Arc::new(context)))
    }
}

impl Default for SyncServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
