use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::error::DeliveryError;
use crate::normalize::Postings;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
}

/// Outbound delivery. Best effort; callers only log failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// Discord-compatible incoming webhook.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: Url,
    username: String,
    avatar_url: Option<String>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
}

impl DiscordWebhook {
    /// `timeout` bounds connect, send and response together.
    pub fn new(
        url: Url,
        username: impl Into<String>,
        avatar_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            username: username.into(),
            avatar_url: avatar_url.filter(|a| !a.trim().is_empty()),
        })
    }

    fn payload<'a>(&'a self, message: &'a Message) -> WebhookPayload<'a> {
        WebhookPayload {
            content: &message.content,
            username: &self.username,
            avatar_url: self.avatar_url.as_deref(),
        }
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&self.payload(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status));
        }
        Ok(())
    }
}

/// What the dispatcher did for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing new.
    Skipped,
    /// First run with bootstrap notifications turned off.
    Suppressed,
    /// No webhook configured.
    Disabled,
    Delivered,
    Failed,
}

/// One message for the whole set: a header line, then `• [identity](url)` per posting.
pub fn compose(label: &str, postings: &Postings) -> Message {
    let mut content = format!("🚀 **New Job Postings Detected @ {}**\n\n", label);
    for (identity, url) in postings {
        content.push_str(&format!("• [{}]({})\n", identity, url));
    }
    Message { content }
}

/// Send at most one message for `new`. Never fails the caller.
pub async fn dispatch(notifier: Option<&dyn Notifier>, label: &str, new: &Postings) -> Dispatch {
    if new.is_empty() {
        return Dispatch::Skipped;
    }
    let Some(notifier) = notifier else {
        info!("{} new postings for {} but no webhook configured", new.len(), label);
        return Dispatch::Disabled;
    };

    match notifier.send(&compose(label, new)).await {
        Ok(()) => {
            info!("Notified {} new postings for {}", new.len(), label);
            Dispatch::Delivered
        }
        Err(e) => {
            warn!("Failed to send notification for {}: {}", label, e);
            Dispatch::Failed
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use super::*;

    /// Records every message; optionally rejects them all.
    #[derive(Default)]
    pub struct RecordingNotifier {
        pub sent: Mutex<Vec<Message>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(DeliveryError::Status(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(())
        }
    }
}
