use crate::error::StoreError;
use crate::logic::hts::extract_hts_codes;
use crate::logic::types::{NewNotification, NotificationType, ProductId, ProductSnapshot};
use crate::store::TariffStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fans product changes out to the users watching them.
///
/// Delivery is at-most-once per call: a notification insert that fails is
/// logged and skipped so the remaining watchers are still told.
pub struct NotificationTrigger {
    store: Arc<dyn TariffStore>,
}

impl NotificationTrigger {
    pub fn new(store: Arc<dyn TariffStore>) -> Self {
        Self { store }
    }

    /// Insert one notification per watcher of `product_id` with change notifications on.
    ///
    /// Returns how many notifications were created.
    pub async fn notify_watchers(
        &self,
        product_id: ProductId,
        title: &str,
        message: &str,
        notification_type: NotificationType,
    ) -> Result<usize, StoreError> {
        let watchers = self.store.watchers(product_id).await?;
        if watchers.is_empty() {
            debug!("No watchers for product {}, skipping {}", product_id, notification_type);
            return Ok(0);
        }

        let mut created = 0;
        for watcher in watchers {
            let notification = NewNotification {
                user_id: watcher.user_id,
                title: title.to_string(),
                message: message.to_string(),
                notification_type,
            };
            match self.store.insert_notification(notification).await {
                Ok(_) => created += 1,
                Err(e) => warn!("Failed to notify user {} about product {}: {}", watcher.user_id, product_id, e),
            }
        }

        info!("Sent {} {} notification(s) for product {}", created, notification_type, product_id);
        Ok(created)
    }

    /// Notify watchers of every product whose code appears in the update's text.
    pub async fn on_trade_update_ingested(&self, update_id: i64) -> Result<usize, StoreError> {
        let update = self
            .store
            .trade_update(update_id)
            .await?
            .ok_or_else(|| StoreError::not_found("trade update", update_id))?;

        let codes = extract_hts_codes(&update.searchable_text());
        if codes.is_empty() {
            debug!("Trade update {} mentions no product codes", update.document_number);
            return Ok(0);
        }

        let products = self.store.products_by_codes(&codes).await?;
        let title = format!("Trade update: {}", update.title);
        let mut created = 0;
        for product in products {
            let message = format!(
                "{} ({} impact) affects {}",
                update.document_number, update.impact, product.hts_code
            );
            created += self
                .notify_watchers(product.id, &title, &message, NotificationType::System)
                .await?;
        }
        Ok(created)
    }

    /// Compare two snapshots of a product and emit one notification per changed dimension.
    ///
    /// Any change of the total rate counts; rulings and exclusions only count when they grow.
    pub async fn diff_and_notify(
        &self,
        product_id: ProductId,
        old: &ProductSnapshot,
        new: &ProductSnapshot,
    ) -> Result<usize, StoreError> {
        let mut created = 0;

        if (new.total_rate - old.total_rate).abs() > f64::EPSILON {
            let message = format!(
                "Total rate changed from {:.2}% to {:.2}%",
                old.total_rate, new.total_rate
            );
            created += self
                .notify_watchers(product_id, "Tariff rate changed", &message, NotificationType::RateChange)
                .await?;
        }

        if new.ruling_count > old.ruling_count {
            let message = format!("{} new ruling(s) published", new.ruling_count - old.ruling_count);
            created += self
                .notify_watchers(product_id, "New customs ruling", &message, NotificationType::NewRuling)
                .await?;
        }

        if new.exclusion_count > old.exclusion_count {
            let message = format!("{} new exclusion(s) granted", new.exclusion_count - old.exclusion_count);
            created += self
                .notify_watchers(product_id, "New tariff exclusion", &message, NotificationType::Exclusion)
                .await?;
        }

        Ok(created)
    }
}
