use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::CONFIG;
use crate::error::DrowsewatchError;
use crate::messages::telemetry::StatusUpdate;

use super::TelemetryService;

/// Generic JSON push for backends without a dedicated integration.
#[derive(Clone)]
pub struct WebhookService {
    client: Client,
}

impl Default for WebhookService {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl TelemetryService for WebhookService {
    async fn publish(&self, update: &StatusUpdate) -> Result<(), DrowsewatchError> {
        let url = &CONFIG.telemetry.webhook.url;
        if url.is_empty() {
            return Err(DrowsewatchError::Other(
                "Webhook URL is not configured".to_string(),
            ));
        }

        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "status": update.status,
            "total_confirmed": update.total_confirmed,
            "note": update.note,
        });

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        debug!("Published status {} to webhook", update.status);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Webhook"
    }
}
