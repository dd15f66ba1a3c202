//! Mentor alerts for check-ins that need review.
//!
//! Delivery is best effort: at most once, no retry, and never on the
//! critical path of a state transition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::models::StudentState;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub student_id: Uuid,
    pub quiz_score: i32,
    pub focus_minutes: i32,
    pub state: StudentState,
    pub name: String,
    /// RFC 3339 time of the check-in.
    pub timestamp: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}

/// Upper bound on one webhook delivery, connect through response body.
pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts payloads as JSON to a mentor webhook.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self, NotifyError> {
        Self::with_timeout(webhook_url, WEBHOOK_TIMEOUT)
    }

    pub fn with_timeout(
        webhook_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!(student_id = %payload.student_id, "mentor webhook accepted");
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Used when no webhook is configured. Logs the alert and succeeds.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn notify(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        info!(
            student_id = %payload.student_id,
            state = %payload.state,
            "mentor webhook not configured, skipping alert"
        );
        Ok(())
    }
}

/// Send `payload` on a detached task. Failures are logged and dropped.
pub fn dispatch(notifier: Arc<dyn Notifier>, payload: NotificationPayload) {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify(&payload).await {
            warn!(
                student_id = %payload.student_id,
                error = %e,
                "failed to deliver mentor alert"
            );
        }
    });
}


#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::testing::RecordingNotifier;
    use super::*;

    fn sample_payload() -> NotificationPayload {
        NotificationPayload {
            student_id: Uuid::new_v4(),
            quiz_score: 5,
            focus_minutes: 30,
            state: StudentState::Locked,
            name: "Ada".to_string(),
            timestamp: "2026-10-18T09:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn payload_serializes_with_webhook_field_names() {
        let payload = sample_payload();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["state"], "locked");
        assert_eq!(value["name"], "Ada");
        assert_eq!(value["quiz_score"], 5);
        assert_eq!(value["focus_minutes"], 30);
        assert_eq!(value["student_id"], payload.student_id.to_string());
        assert!(value.get("timestamp").is_some());
    }

    #[tokio::test]
    async fn dispatch_swallows_delivery_failures() {
        let (notifier, mut receiver) = RecordingNotifier::failing();
        dispatch(Arc::new(notifier), sample_payload());

        let delivered = tokio::time::timeout(Duration::from_secs(1), receiver.recv())
            .await
            .unwrap();
        assert!(delivered.is_some());
    }

    #[tokio::test]
    async fn disabled_notifier_always_succeeds() {
        assert!(DisabledNotifier.notify(&sample_payload()).await.is_ok());
    }

    #[tokio::test]
    async fn hung_webhook_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let notifier =
            WebhookNotifier::with_timeout(format!("http://{addr}/hook"), Duration::from_millis(100))
                .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), notifier.notify(&sample_payload()))
            .await
            .expect("webhook call outlived its timeout");
        assert!(matches!(result, Err(NotifyError::Transport(_))));

        server.abort();
    }
}
