/// Integration tests for the data synchronization layer
///
/// These tests drive whole sync runs against canned upstream payloads and the
/// in-memory store, following a run from enumeration through aggregation to
/// persisted rows and notifications.

#[cfg(test)]
mod integration_tests {
    use super::super::*;
    use crate::error::{StoreError, SyncError};
    use crate::logic::types::{ImpactLevel, NotificationType, SyncStatus, SyncType, TariffRateRecord, WatchlistEntry};
    use crate::store::{MemoryStore, TariffStore};
    use crate::utils::cache::CacheTier;
    use crate::utils::constants::SourceName;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::time::Duration;
    use uuid::Uuid;

    const LAPTOPS: &str = "8471.30.0100";
    const STEEL: &str = "7208.10.1500";

    struct Fixture {
        store: Arc<MemoryStore>,
        general: Arc<StaticTransport>,
        special: Arc<StaticTransport>,
        rulings: Arc<StaticTransport>,
        notices: Arc<StaticTransport>,
        service: Arc<SyncService>,
    }

    fn test_config() -> SyncConfig {
        let source = |url: &str| SourceConfig::new(url, 1_000, 1_000);
        SyncConfig {
            retries: 3,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 100,
            sources: SourcesConfig {
                general_rates: source("https://rates.test"),
                special_tariffs: source("https://special.test"),
                rulings: source("https://rulings.test"),
                notices: source("https://notices.test"),
            },
            ..SyncConfig::default()
        }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let general = Arc::new(StaticTransport::new(SourceName::GENERAL_RATES));
        let special = Arc::new(StaticTransport::new(SourceName::SPECIAL_TARIFFS));
        let rulings = Arc::new(StaticTransport::new(SourceName::RULINGS));
        let notices = Arc::new(StaticTransport::new(SourceName::NOTICES));

        let transports = SourceTransports {
            general_rates: Arc::clone(&general) as Arc<dyn SourceTransport>,
            special_tariffs: Arc::clone(&special) as Arc<dyn SourceTransport>,
            rulings: Arc::clone(&rulings) as Arc<dyn SourceTransport>,
            notices: Arc::clone(&notices) as Arc<dyn SourceTransport>,
        };
        let context = SyncContext::new(test_config(), Arc::clone(&store) as Arc<dyn TariffStore>, transports);

        Fixture {
            store,
            general,
            special,
            rulings,
            notices,
            service: Arc::new(SyncService::new(Arc::new(context))),
        }
    }

    impl Fixture {
        fn serve_product(&self, code: &str, base_rate: Value, additional_rates: Value) {
            self.general.respond(
                &format!("/rates/{}", code),
                json!({
                    "hts_code": code,
                    "description": format!("Product {}", code),
                    "base_rate": base_rate,
                    "additional_rates": additional_rates,
                }),
            );
            self.special.respond(&format!("/special/{}", code), json!({"hts_code": code}));
            self.rulings.respond(&format!("/rulings/{}", code), json!({"rulings": []}));
            self.notices.respond(&format!("/notices/search/{}", code), json!({"results": []}));
        }

        fn serve_recent_notices(&self, notices: Value) {
            self.notices.respond("/notices/recent", json!({ "results": notices }));
        }

        async fn watch(&self, product_id: i64) -> Uuid {
            let user_id = Uuid::new_v4();
            self.store
                .add_watch(WatchlistEntry {
                    user_id,
                    product_id,
                    notify_changes: true,
                })
                .await;
            user_id
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_sums_numeric_additional_rates() {
        let f = fixture();
        f.serve_product(
            LAPTOPS,
            json!(5.0),
            json!([{"type": "section_301", "rate": "2.5"}, {"type": "surcharge", "rate": "abc"}]),
        );

        let outcome = f.service.aggregator().aggregate(LAPTOPS, Some("Machinery")).await.unwrap();

        assert_eq!(outcome.product.total_rate, 7.5);
        assert!(outcome.previous.is_none());
        let stored = f.store.product_by_code(LAPTOPS).await.unwrap().unwrap();
        assert_eq!(stored.total_rate, 7.5);
        assert_eq!(stored.category.as_deref(), Some("Machinery"));
        assert_eq!(stored.additional_rates.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregate_writes_nothing_when_one_source_fails() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(5.0), json!([]));
        f.rulings.fail_next(&format!("/rulings/{}", LAPTOPS), 1);

        let result = f.service.aggregator().aggregate(LAPTOPS, None).await;

        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert!(f.store.product_by_code(LAPTOPS).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_special_tariffs_feed_the_total_and_are_persisted() {
        let f = fixture();
        f.serve_product(STEEL, json!("Free"), json!([]));
        f.special.respond(
            &format!("/special/{}", STEEL),
            json!({
                "hts_code": STEEL,
                "special_tariffs": [{"tariff_type": "section_232", "rate": "25%"}],
                "exclusions": [{"exclusion_number": "EX-1"}],
                "agreements": ["USMCA"],
            }),
        );

        let outcome = f.service.aggregator().aggregate(STEEL, None).await.unwrap();

        assert_eq!(outcome.product.total_rate, 25.0);
        assert_eq!(outcome.product.agreements, vec!["USMCA".to_string()]);
        assert_eq!(outcome.current.exclusion_count, 1);
        assert_eq!(f.store.special_tariff_count(outcome.product.id).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaggregation_notifies_watchers_of_new_rulings() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(5.0), json!([]));
        let first = f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap();
        f.watch(first.product.id).await;

        f.rulings.respond(
            &format!("/rulings/{}", LAPTOPS),
            json!({"rulings": [{"ruling_number": "N312345", "subject": "Laptop classification"}]}),
        );
        f.service.clear_cache(None);
        let second = f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap();

        assert_eq!(second.notifications_sent, 1);
        let notifications = f.store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::NewRuling);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tariff_sync_notifies_only_on_material_change() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(11.5), json!([]));
        f.serve_product(STEEL, json!(10.5), json!([]));
        let laptops = f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap().product;
        let steel = f.service.aggregator().aggregate(STEEL, None).await.unwrap().product;
        let germany = f.store.add_country("DE", "Germany").await;
        f.watch(laptops.id).await;
        f.watch(steel.id).await;

        let yesterday = Utc::now().date_naive() - ChronoDuration::days(1);
        for product_id in [laptops.id, steel.id] {
            f.store
                .upsert_tariff_rate(TariffRateRecord {
                    product_id,
                    country_id: germany.id,
                    effective_date: yesterday,
                    base_rate: 10.0,
                    additional_rates: vec![],
                    total_rate: 10.0,
                })
                .await
                .unwrap();
        }

        let report = f.service.run_tariff_sync().await.unwrap();

        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.written, 2);
        assert_eq!(report.notifications, 1);
        let notifications = f.store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].notification_type, NotificationType::RateChange);
        assert!(notifications[0].message.contains(LAPTOPS));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tariff_sync_applies_agreements_and_country_scoping() {
        let f = fixture();
        f.serve_product(
            STEEL,
            json!(2.0),
            json!([
                {"type": "standard", "rate": "5"},
                {"type": "section_301", "rate": "7.5", "countries": ["CN"]},
            ]),
        );
        f.service.aggregator().aggregate(STEEL, None).await.unwrap();
        let australia = f.store.add_country("AU", "Australia").await;
        let germany = f.store.add_country("DE", "Germany").await;
        let china = f.store.add_country("CN", "China").await;

        let report = f.service.run_tariff_sync().await.unwrap();
        assert_eq!(report.written, 3);
        assert_eq!(report.notifications, 0);

        let rates = f.store.tariff_rates().await;
        let total_for = |country_id: i64| {
            rates
                .iter()
                .find(|rate| rate.country_id == country_id)
                .map(|rate| rate.total_rate)
                .unwrap()
        };
        assert_eq!(total_for(australia.id), 2.0);
        assert_eq!(total_for(germany.id), 7.0);
        assert_eq!(total_for(china.id), 14.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sync_classifies_impact() {
        let f = fixture();
        f.serve_recent_notices(json!([
            {"document_number": "2024-00001", "title": "Tariff notice", "abstract": "A significant change in rates"},
            {"document_number": "2024-00002", "title": "Tariff notice", "abstract": "A minor amendment"},
            {"document_number": "2024-00003", "title": "Tariff notice", "abstract": "Routine publication"},
        ]));

        let report = f.service.run_update_sync().await.unwrap();
        assert_eq!(report.written, 3);

        let impact_of = |updates: &[crate::logic::types::TradeUpdate], number: &str| {
            updates
                .iter()
                .find(|update| update.document_number == number)
                .map(|update| update.impact)
        };
        let updates = f.store.trade_updates().await;
        assert_eq!(impact_of(&updates, "2024-00001"), Some(ImpactLevel::High));
        assert_eq!(impact_of(&updates, "2024-00002"), Some(ImpactLevel::Medium));
        assert_eq!(impact_of(&updates, "2024-00003"), Some(ImpactLevel::Low));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_notice_is_skipped_on_second_pass() {
        let f = fixture();
        f.serve_recent_notices(json!([
            {"document_number": "2024-12345", "title": "Duty modification", "abstract": "Adjusts rates"},
        ]));

        let first = f.service.run_update_sync().await.unwrap();
        assert_eq!(first.written, 1);

        let second = f.service.run_update_sync().await.unwrap();
        assert_eq!(second.status, SyncStatus::Completed);
        assert_eq!(second.written, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(f.store.trade_updates().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sync_notifies_watchers_of_mentioned_products() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(0.0), json!([]));
        let product = f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap().product;
        let watcher = f.watch(product.id).await;
        f.serve_recent_notices(json!([
            {
                "document_number": "2024-20000",
                "title": "Notice of action",
                "abstract": format!("Rates for {} take immediate effect", LAPTOPS),
            },
        ]));

        let report = f.service.run_update_sync().await.unwrap();

        assert_eq!(report.notifications, 1);
        let notifications = f.store.notifications().await;
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, watcher);
        assert_eq!(notifications[0].notification_type, NotificationType::System);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_product_sync_walks_every_chapter() {
        let f = fixture();
        f.general.respond(
            "/chapters/72",
            json!({"chapter": 72, "title": "Iron and steel", "codes": [STEEL]}),
        );
        f.general.respond(
            "/chapters/84",
            json!({"chapter": 84, "title": "Machinery", "codes": [LAPTOPS, "8471.41.0150"]}),
        );
        f.serve_product(STEEL, json!(0.0), json!([]));
        f.serve_product(LAPTOPS, json!(0.0), json!([]));
        f.serve_product("8471.41.0150", json!(0.0), json!([]));

        let report = f.service.run_product_sync(true).await.unwrap();

        assert_eq!(report.status, SyncStatus::Completed);
        // 99 chapter listings plus one aggregation per listed code
        assert_eq!(report.submitted, 102);
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, 97);
        assert_eq!(report.written, 3);

        let steel = f.store.product_by_code(STEEL).await.unwrap().unwrap();
        assert_eq!(steel.category.as_deref(), Some("Iron and steel"));
        assert_eq!(f.store.list_products().await.unwrap().len(), 3);
        assert_eq!(f.general.calls("/chapters/01"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incremental_sync_refreshes_only_stale_products() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(1.0), json!([]));
        f.serve_product(STEEL, json!(1.0), json!([]));
        f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap();
        f.service.aggregator().aggregate(STEEL, None).await.unwrap();

        let long_ago = Utc::now() - ChronoDuration::days(10);
        f.store.set_last_updated(STEEL, long_ago).await.unwrap();
        assert_eq!(f.service.aggregator().find_stale(10).await.unwrap(), vec![STEEL.to_string()]);

        let report = f.service.run_product_sync(false).await.unwrap();

        assert_eq!(report.submitted, 1);
        assert_eq!(report.written, 1);
        let steel = f.store.product_by_code(STEEL).await.unwrap().unwrap();
        assert!(steel.last_updated > long_ago);
        assert!(f.service.aggregator().find_stale(10).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried_within_a_run() {
        let f = fixture();
        f.serve_product(STEEL, json!(1.0), json!([]));
        f.service.aggregator().aggregate(STEEL, None).await.unwrap();
        f.store
            .set_last_updated(STEEL, Utc::now() - ChronoDuration::days(30))
            .await
            .unwrap();
        f.service.clear_cache(None);
        f.general.fail_next(&format!("/rates/{}", STEEL), 2);

        let report = f.service.run_product_sync(false).await.unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.retried, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_failure_marks_run_failed() {
        let f = fixture();
        f.store.fail_operation("list_countries");

        let result = f.service.run_tariff_sync().await;

        assert!(matches!(result, Err(SyncError::Store(StoreError::Unavailable(_)))));
        let runs = f.service.sync_status(1).await.unwrap();
        assert_eq!(runs[0].sync_type, SyncType::Tariffs);
        assert_eq!(runs[0].status, SyncStatus::Failed);
        assert!(runs[0].completed_at.is_some());
        assert!(runs[0].error_message.as_deref().unwrap_or_default().contains("list_countries"));
        assert!(!f.service.is_running(SyncType::Tariffs));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_run_of_same_type_is_rejected() {
        let f = fixture();
        f.serve_product(STEEL, json!(1.0), json!([]));
        f.service.aggregator().aggregate(STEEL, None).await.unwrap();
        f.store.add_country("DE", "Germany").await;
        f.store.fail_operation("upsert_tariff_rate");

        let service = Arc::clone(&f.service);
        let running = tokio::spawn(async move { service.run_tariff_sync().await });

        // The single item is now backing off after its first failed attempt
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(f.service.is_running(SyncType::Tariffs));
        assert!(matches!(
            f.service.run_tariff_sync().await,
            Err(SyncError::RunInProgress(SyncType::Tariffs))
        ));

        f.store.clear_failures();
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.retried, 1);
        assert!(!f.service.is_running(SyncType::Tariffs));
        assert_eq!(f.service.sync_status(10).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_stats_and_clear_by_tier() {
        let f = fixture();
        f.serve_product(LAPTOPS, json!(1.0), json!([]));
        f.service.aggregator().aggregate(LAPTOPS, None).await.unwrap();

        let stats = f.service.cache_stats();
        assert_eq!(stats.default.key_count, 2);
        assert_eq!(stats.long.key_count, 1);
        assert_eq!(stats.short.key_count, 1);

        f.service.clear_cache(Some(CacheTier::Long));
        let stats = f.service.cache_stats();
        assert_eq!(stats.long.key_count, 0);
        assert_eq!(stats.default.key_count, 2);

        f.service.clear_cache(None);
        let stats = f.service.cache_stats();
        assert_eq!(stats.short.key_count + stats.default.key_count + stats.long.key_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_status_lists_runs_newest_first() {
        let f = fixture();
        f.serve_recent_notices(json!([]));

        let first = f.service.run_update_sync().await.unwrap();
        let second = f.service.run_product_sync(false).await.unwrap();

        let runs = f.service.sync_status(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.run_id);
        assert_eq!(runs[0].sync_type, SyncType::Products);
        assert_eq!(runs[1].id, first.run_id);
        assert!(runs.iter().all(|run| run.status == SyncStatus::Completed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_setup_failure_leaves_no_rows() {
        let f = fixture();

        let result = f.service.run_update_sync().await;

        assert!(matches!(result, Err(SyncError::UpstreamStatus { status: 404, .. })));
        assert!(f.store.trade_updates().await.is_empty());
        let runs = f.service.sync_status(1).await.unwrap();
        assert_eq!(runs[0].status, SyncStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ruling_shared_by_two_codes_is_counted_for_each() {
        let f = fixture();
        let shared = json!({"rulings": [{"ruling_number": "N300001", "subject": "Composite goods"}]});
        let mut product_ids = Vec::new();
        for code in [LAPTOPS, STEEL] {
            f.serve_product(code, json!(1.0), json!([]));
            f.rulings.respond(&format!("/rulings/{}", code), shared.clone());
            let product = f.service.aggregator().aggregate(code, None).await.unwrap().product;
            f.watch(product.id).await;
            product_ids.push(product.id);
        }

        for _ in 0..3 {
            f.service.clear_cache(None);
            for code in [LAPTOPS, STEEL] {
                let outcome = f.service.aggregator().aggregate(code, None).await.unwrap();
                assert_eq!(outcome.notifications_sent, 0);
            }
        }

        assert!(f.store.notifications().await.is_empty());
        for product_id in product_ids {
            let snapshot = f.store.product_snapshot(product_id).await.unwrap();
            assert_eq!(snapshot.ruling_count, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_sync_keeps_valid_notices_from_a_mixed_batch() {
        let f = fixture();
        f.serve_recent_notices(json!([
            {"document_number": "2024-30000", "title": "Duty modification", "abstract": "Adjusts rates"},
            {"document_number": "2024-30001", "title": ""},
        ]));

        let report = f.service.run_update_sync().await.unwrap();

        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.written, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.failed, 1);
        let updates = f.store.trade_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].document_number, "2024-30000");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_is_marked_failed_when_completion_cannot_be_recorded() {
        let f = fixture();
        f.serve_recent_notices(json!([]));
        f.store.fail_operation_once("finish_sync_run");

        let result = f.service.run_update_sync().await;

        assert!(matches!(result, Err(SyncError::Store(StoreError::Unavailable(_)))));
        let runs = f.service.sync_status(1).await.unwrap();
        assert_eq!(runs[0].status, SyncStatus::Failed);
        assert!(runs[0].error_message.as_deref().unwrap_or_default().contains("finish_sync_run"));
        assert!(!f.service.is_running(SyncType::Updates));
    }
}
