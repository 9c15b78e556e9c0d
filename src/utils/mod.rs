pub mod cache;
pub mod config_loader;
pub mod constants;
pub mod rate_limiter;

pub use cache::{CacheStats, CacheTier, TieredCache, TieredCacheStats, TtlCache};
pub use config_loader::{LoadConfigError, SectionLoader, SectionLoaderSync, load_from_file, load_from_file_sync};
pub use constants::*;
pub use rate_limiter::{RateLimitPolicy, RateLimiter};
