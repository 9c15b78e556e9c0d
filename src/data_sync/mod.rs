/// Data Synchronization Layer
///
/// Pulls tariff data from the four upstream sources and reconciles it into
/// the store. It provides:
///
/// - Rate-limited, cached source clients with payload validation
/// - All-or-nothing per-product aggregation
/// - A bounded retry queue that isolates per-item failures
/// - Product, tariff and update sync runs with per-type leases
/// - A periodic scheduler for the three sync types

// Core data sync components
pub mod config;
pub mod transport;
pub mod payload;
pub mod sources;
pub mod context;
pub mod retry_queue;
pub mod aggregator;
pub mod lease;
pub mod service;
pub mod scheduler;

// Tests
#[cfg(test)]
mod tests;

// Re-export main components for easy usage
pub use aggregator::{AggregateOutcome, Aggregator};
pub use config::{CacheConfig, ScheduleConfig, SourceConfig, SourcesConfig, SyncConfig};
pub use context::SyncContext;
pub use lease::{SyncLease, SyncLeases};
pub use retry_queue::{QueueStats, RetryPolicy, RetryQueue, TaskHandle, TaskOutcome};
pub use scheduler::{JobFn, SyncScheduler};
pub use service::{SyncRunReport, SyncService, SyncServiceBuilder};
pub use sources::{
    GeneralRatesClient, NoticesClient, RulingsClient, SourceClients, SourceLimiters, SourceTransports,
    SpecialTariffsClient,
};
pub use transport::{HttpTransport, SourceTransport, StaticTransport};
