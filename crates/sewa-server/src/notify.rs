//! Best-effort SMS notifications.
//!
//! Booking mutations hand a list of [`Notice`]s to the
//! [`NotificationDispatcher`], which delivers them on background tasks.
//! Delivery failures are logged and dropped; nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("SMS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("SMS provider returned {0}")]
    Rejected(u16),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError>;
}

/// One message to one phone number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub phone: String,
    pub text: String,
}

impl Notice {
    pub fn new(phone: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sparrow SMS
// ---------------------------------------------------------------------------

pub struct SparrowSmsNotifier {
    client: reqwest::Client,
    url: String,
    token: String,
    sender: String,
}

impl SparrowSmsNotifier {
    pub fn new(url: String, token: String, sender: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            url,
            token,
            sender,
        })
    }
}

/// Local numbers are sent with the `98` country prefix.
fn international(phone: &str) -> String {
    format!("98{}", phone.trim())
}

#[async_trait]
impl Notifier for SparrowSmsNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
        let to = international(phone);
        let form = [
            ("token", self.token.as_str()),
            ("from", self.sender.as_str()),
            ("to", to.as_str()),
            ("text", text),
        ];

        let response = self.client.post(&self.url).form(&form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }

        debug!(to = %to, "SMS accepted by provider");
        Ok(())
    }
}

/// Used when no SMS key is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
        info!(to = %phone, text = %text, "SMS fallback (no provider configured)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Fire one background delivery per notice and return immediately.
    pub fn dispatch(&self, notices: Vec<Notice>) {
        for notice in notices {
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.send(&notice.phone, &notice.text).await {
                    warn!(to = %notice.phone, error = %e, "Notification failed");
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::sync::mpsc;

    /// Records every notice it is asked to send.
    pub(crate) struct RecordingNotifier {
        tx: mpsc::UnboundedSender<Notice>,
    }

    impl RecordingNotifier {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notice>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Arc::new(Self { tx }), rx)
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, phone: &str, text: &str) -> Result<(), NotifyError> {
            let _ = self.tx.send(Notice::new(phone, text));
            Ok(())
        }
    }

    pub(crate) struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn send(&self, _phone: &str, _text: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected(503))
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_each_notice() {
        let (notifier, mut rx) = RecordingNotifier::new();
        let dispatcher = NotificationDispatcher::new(notifier);

        dispatcher.dispatch(vec![
            Notice::new("9800000001", "Booking sent for Logo design"),
            Notice::new("9800000002", "New booking from sita"),
        ]);

        let mut texts = vec![rx.recv().await.unwrap().text, rx.recv().await.unwrap().text];
        texts.sort();
        assert_eq!(texts, vec!["Booking sent for Logo design", "New booking from sita"]);
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let dispatcher = NotificationDispatcher::new(Arc::new(FailingNotifier));
        dispatcher.dispatch(vec![Notice::new("9800000001", "hello")]);
        tokio::task::yield_now().await;
    }

    #[test]
    fn test_international_prefix() {
        assert_eq!(international(" 9812345678 "), "989812345678");
    }
}
