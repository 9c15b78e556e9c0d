/// Notification fan-out for product changes and ingested trade updates

pub mod trigger;

pub use trigger::NotificationTrigger;
