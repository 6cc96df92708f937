use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// User-visible progress sent through the channel while a turn runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    Typing,
    Text(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notice: Notice) -> Result<(), NotifyError>;
}

#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notice: Notice) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Sends `notice`, logging and swallowing any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, notice: Notice) {
    if let Err(error) = notifier.notify(notice).await {
        warn!(event_name = "agent.notify.failed", error = %error, "notification dropped");
    }
}
