use super::config::SyncConfig;
use super::sources::{SourceClients, SourceLimiters, SourceTransports};
use super::transport::HttpTransport;
use crate::error::SyncResult;
use crate::notify::NotificationTrigger;
use crate::store::TariffStore;
use crate::utils::cache::TieredCache;
use crate::utils::constants::SourceName;
use crate::utils::rate_limiter::RateLimiter;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Process-wide services shared by every sync run.
///
/// Built once at startup; caches and rate limiters live exactly as long as
/// the context, so overlapping runs see the same budgets and cached data.
pub struct SyncContext {
    config: SyncConfig,
    store: Arc<dyn TariffStore>,
    cache: Arc<TieredCache<Value>>,
    limiters: SourceLimiters,
    sources: Arc<SourceClients>,
    notifier: Arc<NotificationTrigger>,
}

impl SyncContext {
    pub fn new(config: SyncConfig, store: Arc<dyn TariffStore>, transports: SourceTransports) -> Self {
        let cache = Arc::new(TieredCache::new(
            Duration::from_secs(config.cache.short_ttl_secs),
            Duration::from_secs(config.cache.default_ttl_secs),
            Duration::from_secs(config.cache.long_ttl_secs),
        ));

        let buffer = config.rate_limit_buffer();
        let limiter = |source: &super::config::SourceConfig| Arc::new(RateLimiter::new(source.rate_limit(), buffer));
        let limiters = SourceLimiters {
            general_rates: limiter(&config.sources.general_rates),
            special_tariffs: limiter(&config.sources.special_tariffs),
            rulings: limiter(&config.sources.rulings),
            notices: limiter(&config.sources.notices),
        };

        let sources = Arc::new(SourceClients::new(transports, &limiters, &cache));
        let notifier = Arc::new(NotificationTrigger::new(Arc::clone(&store)));

        info!(
            "Sync context ready: concurrency={}, retries={}, batch_size={}",
            config.concurrency, config.retries, config.batch_size
        );

        Self {
            config,
            store,
            cache,
            limiters,
            sources,
            notifier,
        }
    }

    /// Context talking to the configured upstream URLs over HTTP
    pub fn from_config(config: SyncConfig, store: Arc<dyn TariffStore>) -> SyncResult<Self> {
        config.validate()?;
        let timeout = config.http_timeout();
        let sources = &config.sources;
        let transports = SourceTransports {
            general_rates: Arc::new(HttpTransport::new(SourceName::GENERAL_RATES, &sources.general_rates, timeout)?),
            special_tariffs: Arc::new(HttpTransport::new(
                SourceName::SPECIAL_TARIFFS,
                &sources.special_tariffs,
                timeout,
            )?),
            rulings: Arc::new(HttpTransport::new(SourceName::RULINGS, &sources.rulings, timeout)?),
            notices: Arc::new(HttpTransport::new(SourceName::NOTICES, &sources.notices, timeout)?),
        };
        Ok(Self::new(config, store, transports))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TariffStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<TieredCache<Value>> {
        &self.cache
    }

    pub fn limiters(&self) -> &SourceLimiters {
        &self.limiters
    }

    pub fn sources(&self) -> &Arc<SourceClients> {
        &self.sources
    }

    pub fn notifier(&self) -> &Arc<NotificationTrigger> {
        &self.notifier
    }
}
