pub mod blynk;
pub mod generic;
pub mod webhook;

pub use blynk::BlynkService;
pub use generic::{TelemetryChannel, TelemetryService};
pub use webhook::WebhookService;
