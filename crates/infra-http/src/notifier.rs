// Notifier adapters: chat/email relay webhook and a log-only fallback

use crate::error::{check_status, map_reqwest_error};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};
use tunekeeper_core::error::Result;
use tunekeeper_core::port::{Notification, Notifier, Outcome};

/// Render the human-readable line sent with every notification
pub fn render_message(n: &Notification) -> String {
    match (n.outcome, n.permanent) {
        (Outcome::Succeeded, _) => format!(
            "Fine-tune of \"{}\" finished: {}",
            n.snapshot_name,
            n.message.as_deref().unwrap_or("model ready")
        ),
        (Outcome::Failed, true) => format!(
            "Fine-tune of \"{}\" failed permanently (no retries left): {}",
            n.snapshot_name,
            n.message.as_deref().unwrap_or("unknown error")
        ),
        (Outcome::Failed, false) => format!(
            "Fine-tune of \"{}\" failed: {}",
            n.snapshot_name,
            n.message.as_deref().unwrap_or("unknown error")
        ),
    }
}

#[derive(Debug, Serialize)]
struct WebhookBody<'a> {
    text: String,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs each notification as JSON to a configured URL
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let body = WebhookBody {
            text: render_message(notification),
            notification,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_reqwest_error("notify", e))?;
        check_status("notify", response).await?;

        info!(
            user_id = %notification.user_id,
            snapshot_id = %notification.snapshot_id,
            outcome = ?notification.outcome,
            "Notification delivered"
        );
        Ok(())
    }
}

/// Writes notifications to the log; used when no webhook is configured
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let text = render_message(notification);
        match notification.outcome {
            Outcome::Succeeded => info!(
                user_id = %notification.user_id,
                job_id = %notification.job_id,
                snapshot_id = %notification.snapshot_id,
                "{}", text
            ),
            Outcome::Failed => warn!(
                user_id = %notification.user_id,
                job_id = %notification.job_id,
                snapshot_id = %notification.snapshot_id,
                permanent = notification.permanent,
                "{}", text
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(outcome: Outcome, permanent: bool) -> Notification {
        Notification {
            user_id: "therapist-7".to_string(),
            outcome,
            job_id: "ftjob-1".to_string(),
            snapshot_id: "snap-1".to_string(),
            snapshot_name: "weekly".to_string(),
            permanent,
            message: Some("invalid file".to_string()),
        }
    }

    #[test]
    fn test_render_permanent_failure() {
        let text = render_message(&notification(Outcome::Failed, true));
        assert!(text.contains("permanently"));
        assert!(text.contains("invalid file"));
    }

    #[test]
    fn test_webhook_body_flattens_notification() {
        let n = notification(Outcome::Succeeded, false);
        let body = WebhookBody {
            text: render_message(&n),
            notification: &n,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["snapshot_id"], "snap-1");
        assert_eq!(json["outcome"], "succeeded");
        assert!(json["text"].as_str().unwrap().starts_with("Fine-tune of \"weekly\""));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        LogNotifier
            .notify(&notification(Outcome::Failed, false))
            .await
            .unwrap();
    }
}
