use actix::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alert::AlertStatus;

/// Messages for TelemetryActor

/// Snapshot pushed to the remote monitoring backends. Best effort, latest
/// wins; there is no delivery-order guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: AlertStatus,
    pub total_confirmed: u64,
    /// Human-readable terminal line, present on detection frames.
    pub note: Option<String>,
}

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct PublishStatus {
    pub update: StatusUpdate,
}
