use crate::utils::config_loader::{
    LoadConfigError, SectionLoader, SectionLoaderSync, load_from_file, load_from_file_sync,
};
use crate::utils::rate_limiter::RateLimitPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Access settings for one upstream API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub base_url: String,
    /// Sent as `X-Api-Key` when present
    #[serde(default)]
    pub api_key: Option<String>,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
    /// Requests allowed per window
    pub max_requests: u32,
}

impl SourceConfig {
    pub fn new(base_url: &str, window_ms: u64, max_requests: u32) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: None,
            window_ms,
            max_requests,
        }
    }

    pub fn rate_limit(&self) -> RateLimitPolicy {
        RateLimitPolicy::new(Duration::from_millis(self.window_ms), self.max_requests)
    }

    pub fn url(&self) -> Result<Url, LoadConfigError> {
        Url::parse(&self.base_url).map_err(|e| LoadConfigError::invalid("base_url", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    pub general_rates: SourceConfig,
    pub special_tariffs: SourceConfig,
    pub rulings: SourceConfig,
    pub notices: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            general_rates: SourceConfig::new("https://hts.usitc.gov/reststop", 60_000, 60),
            special_tariffs: SourceConfig::new("https://api.trade.gov/tariffs", 60_000, 30),
            rulings: SourceConfig::new("https://rulings.cbp.gov/api", 60_000, 20),
            notices: SourceConfig::new("https://www.federalregister.gov/api/v1", 60_000, 60),
        }
    }
}

/// TTLs of the three cache tiers, in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub short_ttl_secs: u64,
    pub default_ttl_secs: u64,
    pub long_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            short_ttl_secs: 300,
            default_ttl_secs: 3_600,
            long_ttl_secs: 86_400,
        }
    }
}

/// Intervals of the periodic sync jobs, in seconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub products_interval_secs: u64,
    pub tariffs_interval_secs: u64,
    pub updates_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            products_interval_secs: 6 * 3_600,
            tariffs_interval_secs: 24 * 3_600,
            updates_interval_secs: 3_600,
        }
    }
}

#[derive(Clone, Deserialize, Debug)]
pub struct SyncConfigRoot {
    pub sync: SyncConfig,
}

/// Configuration for the synchronization engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Queue tasks running at once
    pub concurrency: usize,
    /// Attempts per queued task before it is abandoned
    pub retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Stale products refreshed per incremental run
    pub batch_size: usize,
    pub http_timeout_secs: u64,
    pub rate_limit_buffer_ms: u64,
    pub cache: CacheConfig,
    pub sources: SourcesConfig,
    pub schedule: ScheduleConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            batch_size: 50,
            http_timeout_secs: 30,
            rate_limit_buffer_ms: 50,
            cache: CacheConfig::default(),
            sources: SourcesConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self, LoadConfigError> {
        let mut config = Self::default();

        if let Some(v) = env_parse("SYNC_CONCURRENCY")? {
            config.concurrency = v;
        }
        if let Some(v) = env_parse("SYNC_RETRIES")? {
            config.retries = v;
        }
        if let Some(v) = env_parse("SYNC_BATCH_SIZE")? {
            config.batch_size = v;
        }
        if let Some(v) = env_parse("HTTP_TIMEOUT_SECS")? {
            config.http_timeout_secs = v;
        }

        let sources = [
            ("GENERAL_RATES", &mut config.sources.general_rates),
            ("SPECIAL_TARIFFS", &mut config.sources.special_tariffs),
            ("RULINGS", &mut config.sources.rulings),
            ("NOTICES", &mut config.sources.notices),
        ];
        for (prefix, source) in sources {
            if let Ok(url) = std::env::var(format!("{}_API_URL", prefix)) {
                Url::parse(&url).map_err(|e| LoadConfigError::invalid(format!("{}_API_URL", prefix), e))?;
                source.base_url = url;
            }
            if let Ok(key) = std::env::var(format!("{}_API_KEY", prefix)) {
                source.api_key = Some(key);
            }
            if let Some(v) = env_parse(&format!("{}_WINDOW_MS", prefix))? {
                source.window_ms = v;
            }
            if let Some(v) = env_parse(&format!("{}_MAX_REQUESTS", prefix))? {
                source.max_requests = v;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), LoadConfigError> {
        if self.concurrency == 0 {
            return Err(LoadConfigError::invalid("concurrency", "must be at least 1"));
        }
        if self.retries == 0 {
            return Err(LoadConfigError::invalid("retries", "must be at least 1"));
        }
        for source in [
            &self.sources.general_rates,
            &self.sources.special_tariffs,
            &self.sources.rulings,
            &self.sources.notices,
        ] {
            source.url()?;
            if source.window_ms == 0 || source.max_requests == 0 {
                return Err(LoadConfigError::invalid(
                    source.base_url.clone(),
                    "rate limit window and budget must be positive",
                ));
            }
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn rate_limit_buffer(&self) -> Duration {
        Duration::from_millis(self.rate_limit_buffer_ms)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>, LoadConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map(Some).map_err(|e| LoadConfigError::invalid(key, e)),
        Err(_) => Ok(None),
    }
}

#[async_trait]
impl SectionLoader for SyncConfig {
    async fn load_section_from_file(file_name: &Path) -> Result<Self, LoadConfigError> {
        let root: SyncConfigRoot = load_from_file(file_name).await?;
        root.sync.validate()?;
        Ok(root.sync)
    }
}

impl SectionLoaderSync for SyncConfig {
    fn load_section_from_file_sync(file_name: &Path) -> Result<Self, LoadConfigError> {
        let root: SyncConfigRoot = load_from_file_sync(file_name)?;
        root.sync.validate()?;
        Ok(root.sync)
    }
}
