use async_trait::async_trait;
use enum_dispatch::enum_dispatch;
use tracing::info;

use crate::config::{TelemetryBackend, CONFIG};
use crate::error::DrowsewatchError;
use crate::messages::telemetry::StatusUpdate;

use super::{BlynkService, WebhookService};

#[cfg(test)]
use std::sync::Arc;

#[async_trait]
#[enum_dispatch(TelemetryChannel)]
pub trait TelemetryService {
    async fn publish(&self, update: &StatusUpdate) -> Result<(), DrowsewatchError>;

    fn name(&self) -> &'static str;
}

#[enum_dispatch]
#[derive(Clone)]
pub enum TelemetryChannel {
    BlynkService(BlynkService),
    WebhookService(WebhookService),
    #[cfg(test)]
    MockedService(Arc<test_mocks::MockTelemetryService>),
}

/// Builds one channel per configured backend, mirroring the `[telemetry]`
/// services list.
pub fn channels_from_config() -> Vec<TelemetryChannel> {
    let mut channels: Vec<TelemetryChannel> = vec![];
    for backend in &CONFIG.telemetry.services {
        match backend {
            TelemetryBackend::Blynk => {
                info!("Adding Blynk telemetry channel");
                channels.push(BlynkService::default().into());
            }
            TelemetryBackend::Webhook => {
                info!("Adding webhook telemetry channel");
                channels.push(WebhookService::default().into());
            }
        }
    }
    info!("Total telemetry channels configured: {}", channels.len());
    channels
}

#[cfg(test)]
#[async_trait]
impl TelemetryService for Arc<test_mocks::MockTelemetryService> {
    async fn publish(&self, update: &StatusUpdate) -> Result<(), DrowsewatchError> {
        (**self).publish(update).await
    }

    fn name(&self) -> &'static str {
        "Mock"
    }
}

#[cfg(test)]
pub mod test_mocks {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use crate::error::DrowsewatchError;
    use crate::messages::telemetry::StatusUpdate;

    #[derive(Debug, Default)]
    pub struct MockTelemetryService {
        pub published: Mutex<Vec<StatusUpdate>>,
        pub should_fail: AtomicBool,
    }

    impl MockTelemetryService {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failure(&self, should_fail: bool) {
            self.should_fail.store(should_fail, Ordering::SeqCst);
        }

        pub fn publish_count(&self) -> usize {
            self.published.lock().unwrap().len()
        }

        pub fn last_update(&self) -> Option<StatusUpdate> {
            self.published.lock().unwrap().last().cloned()
        }

        pub async fn publish(&self, update: &StatusUpdate) -> Result<(), DrowsewatchError> {
            if self.should_fail.load(Ordering::SeqCst) {
                return Err(DrowsewatchError::Other("Mock publish failure".to_string()));
            }
            self.published.lock().unwrap().push(update.clone());
            Ok(())
        }
    }
}
