//! Slack alerts for ear operators.
//!
//! Warnings go out through an incoming webhook. Operators can silence
//! warnings during maintenance by creating the silencer file; recoveries are
//! always sent.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Upper bound on one webhook request.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Kinds of warnings an ear raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EarWarningType {
    /// The ear has stopped running its periodic jobs.
    EarAppearsDead,
    /// The ear heard nothing for a whole hour.
    EarHeardNoMessagesForAnHour,
}

impl std::fmt::Display for EarWarningType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EarAppearsDead => write!(f, "EarAppearsDead"),
            Self::EarHeardNoMessagesForAnHour => write!(f, "EarHeardNoMessagesForAnHour"),
        }
    }
}

/// Sends warnings and recoveries to a Slack webhook.
#[derive(Debug, Clone)]
pub struct SlackNotifier {
    http: reqwest::Client,
    web_hook_url: String,
    silencer_file: PathBuf,
}

impl SlackNotifier {
    /// Create a notifier. An empty URL disables sending.
    #[must_use]
    pub fn new(web_hook_url: impl Into<String>, silencer_file: impl Into<PathBuf>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(WEBHOOK_TIMEOUT)
                .build()
                .unwrap_or_default(),
            web_hook_url: web_hook_url.into(),
            silencer_file: silencer_file.into(),
        }
    }

    /// Whether a webhook is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.web_hook_url.trim().is_empty()
    }

    /// Whether warnings are currently silenced.
    #[must_use]
    pub fn is_silenced(&self) -> bool {
        self.silencer_file.exists()
    }

    /// Send a warning.
    ///
    /// Returns the webhook's HTTP status, or `None` when alerts are disabled
    /// or silenced.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn send_warning(
        &self,
        warning_type: EarWarningType,
        warning_message: &str,
    ) -> Result<Option<u16>> {
        if self.is_silenced() {
            info!(
                "Warnings silenced by {}; not sending {}",
                self.silencer_file.display(),
                warning_type
            );
            return Ok(None);
        }
        self.post(&format!(
            "*S3 Ear Warning!:*\n {warning_type}: {warning_message}"
        ))
        .await
    }

    /// Send a recovery notice for an earlier warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent.
    pub async fn send_recovery(
        &self,
        warning_type: EarWarningType,
        recovery_message: &str,
    ) -> Result<Option<u16>> {
        self.post(&format!(
            "*S3 Ear Recovery!:*\n {warning_type}: {recovery_message}"
        ))
        .await
    }

    async fn post(&self, text: &str) -> Result<Option<u16>> {
        if !self.is_enabled() {
            debug!("No Slack webhook configured; skipping alert");
            return Ok(None);
        }

        let response = self
            .http
            .post(&self.web_hook_url)
            .json(&slack_payload(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Slack webhook answered {}", status);
        }
        Ok(Some(status.as_u16()))
    }
}

/// Webhook body with a single markdown section.
fn slack_payload(text: &str) -> serde_json::Value {
    json!({
        "text": "fallback",
        "blocks": [
            {
                "type": "section",
                "text": {
                    "type": "mrkdwn",
                    "text": text,
                }
            }
        ]
    })
}
