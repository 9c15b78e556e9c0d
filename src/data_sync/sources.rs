//! Typed clients for the four upstream sources.
//!
//! Every client reads through its cache tier first and only then spends rate
//! limiter budget on the network. Raw bodies are cached only after they pass
//! validation.

use super::payload::{
    ChapterListing, ChapterListingDto, GeneralRates, GeneralRatesDto, NoticeBatch, NoticesDto, RulingsDto,
    SpecialTariffData, SpecialTariffDto, decode,
};
use super::transport::SourceTransport;
use crate::error::SyncResult;
use crate::logic::types::{Notice, Ruling};
use crate::utils::cache::{CacheTier, TieredCache};
use crate::utils::constants::SourceName;
use crate::utils::rate_limiter::RateLimiter;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Cache-then-throttle-then-fetch access shared by the typed clients
pub struct CachedSource {
    name: &'static str,
    transport: Arc<dyn SourceTransport>,
    limiter: Arc<RateLimiter>,
    cache: Arc<TieredCache<Value>>,
}

impl CachedSource {
    pub fn new(
        name: &'static str,
        transport: Arc<dyn SourceTransport>,
        limiter: Arc<RateLimiter>,
        cache: Arc<TieredCache<Value>>,
    ) -> Self {
        Self {
            name,
            transport,
            limiter,
            cache,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch<T>(&self, tier: CacheTier, path: &str, parse: impl Fn(Value) -> SyncResult<T>) -> SyncResult<T> {
        let key = format!("{}:{}", self.name, path);
        let cache = self.cache.tier(tier);

        if let Some(body) = cache.get(&key) {
            debug!("Cache hit for {}", key);
            return parse(body);
        }

        self.limiter.throttle(self.name).await;
        let body = self.transport.get_json(path).await?;
        let parsed = parse(body.clone())?;
        cache.set(key, body, None);
        Ok(parsed)
    }
}

pub struct GeneralRatesClient {
    source: CachedSource,
}

impl GeneralRatesClient {
    pub fn new(source: CachedSource) -> Self {
        Self { source }
    }

    pub async fn fetch_rates(&self, hts_code: &str) -> SyncResult<GeneralRates> {
        let path = format!("/rates/{}", hts_code);
        self.source
            .fetch(CacheTier::Default, &path, |body| {
                let dto: GeneralRatesDto = decode(self.source.name(), body)?;
                Ok(dto.validate(hts_code)?)
            })
            .await
    }

    /// Codes contained in a chapter; listings change rarely and use the long tier
    pub async fn list_chapter(&self, chapter: u8) -> SyncResult<ChapterListing> {
        let path = format!("/chapters/{:02}", chapter);
        self.source
            .fetch(CacheTier::Long, &path, |body| {
                let dto: ChapterListingDto = decode(self.source.name(), body)?;
                Ok(dto.validate(chapter)?)
            })
            .await
    }
}

pub struct SpecialTariffsClient {
    source: CachedSource,
}

impl SpecialTariffsClient {
    pub fn new(source: CachedSource) -> Self {
        Self { source }
    }

    pub async fn fetch_special(&self, hts_code: &str) -> SyncResult<SpecialTariffData> {
        let path = format!("/special/{}", hts_code);
        self.source
            .fetch(CacheTier::Default, &path, |body| {
                let dto: SpecialTariffDto = decode(self.source.name(), body)?;
                Ok(dto.validate(hts_code)?)
            })
            .await
    }
}

pub struct RulingsClient {
    source: CachedSource,
}

impl RulingsClient {
    pub fn new(source: CachedSource) -> Self {
        Self { source }
    }

    pub async fn fetch_rulings(&self, hts_code: &str) -> SyncResult<Vec<Ruling>> {
        let path = format!("/rulings/{}", hts_code);
        self.source
            .fetch(CacheTier::Long, &path, |body| {
                let dto: RulingsDto = decode(self.source.name(), body)?;
                Ok(dto.validate()?)
            })
            .await
    }
}

pub struct NoticesClient {
    source: CachedSource,
}

impl NoticesClient {
    pub fn new(source: CachedSource) -> Self {
        Self { source }
    }

    /// Notices mentioning one code; any malformed entry fails the fetch
    pub async fn fetch_for_code(&self, hts_code: &str) -> SyncResult<Vec<Notice>> {
        let path = format!("/notices/search/{}", hts_code);
        let batch = self.fetch_notices(&path).await?;
        Ok(batch.into_strict()?)
    }

    /// Most recently published tariff notices, with malformed entries set aside
    pub async fn fetch_recent(&self) -> SyncResult<NoticeBatch> {
        self.fetch_notices("/notices/recent").await
    }

    async fn fetch_notices(&self, path: &str) -> SyncResult<NoticeBatch> {
        self.source
            .fetch(CacheTier::Short, path, |body| {
                let dto: NoticesDto = decode(self.source.name(), body)?;
                Ok(dto.validate())
            })
            .await
    }
}

/// The four upstream clients, shared by every sync run
pub struct SourceClients {
    pub general_rates: GeneralRatesClient,
    pub special_tariffs: SpecialTariffsClient,
    pub rulings: RulingsClient,
    pub notices: NoticesClient,
}

/// One transport per source, in the order the clients are built
pub struct SourceTransports {
    pub general_rates: Arc<dyn SourceTransport>,
    pub special_tariffs: Arc<dyn SourceTransport>,
    pub rulings: Arc<dyn SourceTransport>,
    pub notices: Arc<dyn SourceTransport>,
}

/// One limiter per source
pub struct SourceLimiters {
    pub general_rates: Arc<RateLimiter>,
    pub special_tariffs: Arc<RateLimiter>,
    pub rulings: Arc<RateLimiter>,
    pub notices: Arc<RateLimiter>,
}

impl SourceClients {
    pub fn new(transports: SourceTransports, limiters: &SourceLimiters, cache: &Arc<TieredCache<Value>>) -> Self {
        let source = |name, transport, limiter: &Arc<RateLimiter>| {
            CachedSource::new(name, transport, Arc::clone(limiter), Arc::clone(cache))
        };
        Self {
            general_rates: GeneralRatesClient::new(source(
                SourceName::GENERAL_RATES,
                transports.general_rates,
                &limiters.general_rates,
            )),
            special_tariffs: SpecialTariffsClient::new(source(
                SourceName::SPECIAL_TARIFFS,
                transports.special_tariffs,
                &limiters.special_tariffs,
            )),
            rulings: RulingsClient::new(source(SourceName::RULINGS, transports.rulings, &limiters.rulings)),
            notices: NoticesClient::new(source(SourceName::NOTICES, transports.notices, &limiters.notices)),
        }
    }
}
