//! Subscription matching and notification delivery.

pub mod format;
pub mod matcher;
pub mod notifier;
pub mod worker;

pub use matcher::matches;
pub use notifier::{DeliveryError, LogNotifier, Notifier, TelegramNotifier};
pub use worker::{DispatchReport, NotificationWorker};
