//! Report notification through the mail relay.
//!
//! Delivery is fire-and-forget: [`Notifier::dispatch`] spawns the request and
//! returns immediately. Failures are logged, never retried, and never change
//! the outcome of the run.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::report::Document;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("notification request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification endpoint returned HTTP {0}")]
    Status(u16),
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    subject: &'a str,
    html: &'a str,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    client: Client,
    url: String,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(NotifyError::Client)?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver `document` and wait for the relay's answer.
    pub async fn send(&self, document: &Document) -> Result<(), NotifyError> {
        let payload = MailPayload {
            subject: &document.subject,
            html: &document.html,
        };
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }

    /// Send in the background. The handle is only useful for letting the
    /// request finish before the process exits.
    pub fn dispatch(&self, document: Document) -> JoinHandle<()> {
        let notifier = self.clone();
        tokio::spawn(async move {
            match notifier.send(&document).await {
                Ok(()) => info!(url = %notifier.url, subject = %document.subject, "Notification sent"),
                Err(e) => warn!(url = %notifier.url, error = %e, "Notification failed"),
            }
        })
    }
}

/// Give a pending dispatch up to `grace` to finish.
pub async fn settle(handle: JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, handle).await.is_err() {
        warn!(grace_secs = grace.as_secs(), "Notification still pending at exit, abandoning it");
    }
}
