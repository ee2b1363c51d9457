//! Notification port.

use kizuna_types::proactive::{NotificationChannel, NotificationResult};

/// Trait for delivering out-of-band notifications about proactive
/// messages. Never fails loudly: delivery problems come back as
/// `NotificationResult { sent: false, error }`.
pub trait Notifier: Send + Sync {
    fn send(
        &self,
        channel: NotificationChannel,
        target: &str,
        content: &str,
        user_id: &str,
    ) -> impl std::future::Future<Output = NotificationResult> + Send;
}
