use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::CONFIG;
use crate::error::DrowsewatchError;
use crate::messages::telemetry::StatusUpdate;

use super::TelemetryService;

/// Pushes status to the Blynk cloud over its HTTP API: one batch update
/// for the LED and status virtual pins, plus a terminal line per
/// detection note.
#[derive(Clone)]
pub struct BlynkService {
    client: Client,
}

impl Default for BlynkService {
    fn default() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl TelemetryService for BlynkService {
    async fn publish(&self, update: &StatusUpdate) -> Result<(), DrowsewatchError> {
        let blynk = &CONFIG.telemetry.blynk;
        if blynk.token.is_empty() {
            return Err(DrowsewatchError::Other(
                "Blynk token is not configured".to_string(),
            ));
        }

        let led_value = match update.status {
            crate::alert::AlertStatus::Alert => "255",
            crate::alert::AlertStatus::Normal => "0",
        };

        let url = format!("{}/external/api/batch/update", blynk.host);
        let query = vec![
            ("token".to_string(), blynk.token.clone()),
            (format!("V{}", blynk.vpin_led), led_value.to_string()),
            (format!("V{}", blynk.vpin_status), update.status.to_string()),
        ];
        self.client
            .get(&url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?;

        if let Some(note) = &update.note {
            let url = format!("{}/external/api/update", blynk.host);
            let query = vec![
                ("token".to_string(), blynk.token.clone()),
                (format!("V{}", blynk.vpin_terminal), note.clone()),
            ];
            self.client
                .get(&url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?;
        }

        debug!("Published status {} to Blynk", update.status);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Blynk"
    }
}
