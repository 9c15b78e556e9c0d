// Three-Layer Architecture
pub mod data_sync; // Data Layer: source clients, aggregation, sync runs, scheduling
pub mod logic; // Logic Layer: tariff models, rate arithmetic, classification
pub mod notify; // Watcher notifications
pub mod store; // Persistence boundary

// Common utilities and types
pub mod error;
pub mod utils;

// Re-export key components from each layer
pub use data_sync::{
    Aggregator, SyncConfig, SyncContext, SyncRunReport, SyncScheduler, SyncService, SyncServiceBuilder,
};
pub use error::{StoreError, SyncError, SyncResult, ValidationError};
pub use logic::{ImpactLevel, NotificationType, Product, SyncStatus, SyncType, TariffRate};
pub use notify::NotificationTrigger;
pub use store::{MemoryStore, TariffStore};
pub use utils::{CacheTier, RateLimiter, TieredCache, TtlCache};
