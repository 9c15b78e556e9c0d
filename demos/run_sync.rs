//! Runs each sync type once against canned upstream data and an in-memory store.
//!
//! `RUST_LOG=debug cargo run --example run_sync`

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tariff_sync::data_sync::{SourceTransports, StaticTransport, SyncScheduler};
use tariff_sync::logic::WatchlistEntry;
use tariff_sync::utils::SourceName;
use tariff_sync::{MemoryStore, SyncConfig, SyncServiceBuilder, TariffStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CODES: [&str; 2] = ["8471.30.0100", "7208.10.1500"];

fn canned_transports() -> SourceTransports {
    let general = StaticTransport::new(SourceName::GENERAL_RATES);
    let special = StaticTransport::new(SourceName::SPECIAL_TARIFFS);
    let rulings = StaticTransport::new(SourceName::RULINGS);
    let notices = StaticTransport::new(SourceName::NOTICES);

    for (i, code) in CODES.iter().enumerate() {
        general.respond(
            &format!("/rates/{}", code),
            json!({
                "hts_code": code,
                "description": format!("Demo product {}", i + 1),
                "base_rate": 2.5 * (i as f64 + 1.0),
                "additional_rates": [{"type": "standard", "rate": "5%"}],
            }),
        );
        special.respond(
            &format!("/special/{}", code),
            json!({
                "hts_code": code,
                "special_tariffs": [{"tariff_type": "section_301", "rate": "25", "countries": ["CN"]}],
            }),
        );
        rulings.respond(&format!("/rulings/{}", code), json!({"rulings": []}));
        notices.respond(&format!("/notices/search/{}", code), json!({"results": []}));
    }
    notices.respond(
        "/notices/recent",
        json!({"results": [{
            "document_number": "2024-12345",
            "title": "Modification of duties",
            "abstract": format!("Rates on {} take immediate effect", CODES[0]),
        }]}),
    );

    SourceTransports {
        general_rates: Arc::new(general),
        special_tariffs: Arc::new(special),
        rulings: Arc::new(rulings),
        notices: Arc::new(notices),
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = Arc::new(MemoryStore::new());
    for (code, name) in [("CN", "China"), ("DE", "Germany"), ("AU", "Australia")] {
        store.add_country(code, name).await;
    }

    let service = Arc::new(
        SyncServiceBuilder::new()
            .with_config(SyncConfig::default())
            .with_store(Arc::clone(&store) as Arc<dyn TariffStore>)
            .with_transports(canned_transports())
            .build()?,
    );

    for code in CODES {
        let outcome = service.aggregator().aggregate(code, Some("Demo")).await?;
        store
            .add_watch(WatchlistEntry {
                user_id: uuid::Uuid::new_v4(),
                product_id: outcome.product.id,
                notify_changes: true,
            })
            .await;
    }

    let report = service.run_tariff_sync().await?;
    info!("Tariff sync: {}", serde_json::to_string(&report)?);
    let report = service.run_update_sync().await?;
    info!("Update sync: {}", serde_json::to_string(&report)?);
    let report = service.run_product_sync(false).await?;
    info!("Product sync: {}", serde_json::to_string(&report)?);

    info!("Cache: {:?}", service.cache_stats());
    for run in service.sync_status(10).await? {
        info!("Run {} ({}): {}", run.id, run.sync_type, run.status);
    }
    for notification in store.notifications().await {
        info!("Notification for {}: {}", notification.user_id, notification.message);
    }

    let mut scheduler = SyncScheduler::for_service(Arc::clone(&service), &Default::default());
    scheduler.start().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    scheduler.stop().await?;

    Ok(())
}
