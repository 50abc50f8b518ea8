use log::{info, warn};
use serde_json::json;
use url::Url;

use crate::error::{OpsweepError, Result};
use crate::report::BatchReport;

/// Posts batch summaries to a chat webhook.
///
/// Best effort only: the batch already happened, so a broken webhook is
/// logged and never fails the run.
#[derive(Debug)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<Url>,
}

impl Notifier {
    pub fn new(webhook_url: Option<&str>) -> Result<Self> {
        let webhook_url = webhook_url
            .map(|raw| {
                Url::parse(raw)
                    .map_err(|e| OpsweepError::Config(format!("Invalid webhook URL: {e}")))
            })
            .transpose()?;

        let client = reqwest::Client::builder()
            .user_agent("opsweep/0.3")
            .build()
            .map_err(|e| OpsweepError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Announce a lifecycle batch, if a webhook is configured and the
    /// batch actually changed something.
    pub async fn announce(&self, report: &BatchReport) {
        let Some(url) = &self.webhook_url else {
            return;
        };
        let Some(text) = batch_message(report) else {
            return;
        };

        let result = self
            .client
            .post(url.clone())
            .json(&json!({ "text": text }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("Posted {} summary to webhook", report.action);
            }
            Ok(response) => {
                warn!(
                    "Webhook rejected {} summary (status {})",
                    report.action,
                    response.status()
                );
            }
            Err(e) => warn!("Webhook post failed: {e}"),
        }
    }
}

/// Text summary of a batch, or `None` when no action was applied (nobody
/// wants a message about a run that did nothing).
fn batch_message(report: &BatchReport) -> Option<String> {
    let applied = report.applied_names();
    if applied.is_empty() {
        return None;
    }

    Some(format!(
        "Environments {}d automatically at {}:\n{}",
        report.action,
        report.started_at.format("%Y-%m-%d %H:%M UTC"),
        applied.join(", "),
    ))
}
