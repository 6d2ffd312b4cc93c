use async_trait::async_trait;

/// Delivers short text messages (run summaries, fatal failures)
///
/// Notification failures never change the outcome of a run; callers log them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), crate::Error>;

    fn notifier_name(&self) -> &'static str;
}
