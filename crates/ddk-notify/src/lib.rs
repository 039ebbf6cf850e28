//! ddk-notify
//!
//! Best-effort participant notifications for lifecycle transitions.
//!
//! Contract: notifications are fire-and-forget background tasks spawned
//! OUTSIDE any database transaction. A failed notification is logged and
//! dropped — it never rolls back, fails, or delays the transition that
//! triggered it. Requests carry a hard timeout so a slow webhook endpoint
//! cannot pile up tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, recipient: Uuid, event: &str, detail: Value) -> Result<()>;
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// POSTs one JSON document per notification to a configured endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .context("build notification http client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, recipient: Uuid, event: &str, detail: Value) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&json!({
                "recipient": recipient,
                "event": event,
                "detail": detail,
            }))
            .send()
            .await
            .context("notification POST failed")?;

        resp.error_for_status()
            .context("notification endpoint returned an error status")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

/// Default when no webhook is configured: the notification is only a debug
/// log line. Keeps every call site identical across environments.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, recipient: Uuid, event: &str, detail: Value) -> Result<()> {
        debug!(%recipient, %event, %detail, "notification (log only)");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fire-and-forget spawn
// ---------------------------------------------------------------------------

/// Notify each recipient on a detached task. Failures are logged per
/// recipient and swallowed.
pub fn spawn_notifications(
    notifier: Arc<dyn Notifier>,
    recipients: Vec<Uuid>,
    event: String,
    detail: Value,
) {
    tokio::spawn(async move {
        for recipient in recipients {
            if let Err(e) = notifier.notify(recipient, &event, detail.clone()).await {
                warn!(%recipient, event = %event, error = %e, "notification failed (dropped)");
            }
        }
    });
}
