use actix::prelude::*;
use serde::{Deserialize, Serialize};

use crate::alert::AlertStatus;
use crate::messages::capture::CapturedFrame;

/// Messages for DetectionActor

#[derive(Message)]
#[rtype(result = "Result<(), crate::error::DrowsewatchError>")]
pub struct ProcessFrame {
    pub frame: CapturedFrame,
    pub reply_to: Addr<crate::actors::CaptureActor>,
}

#[derive(Message)]
#[rtype(result = "Result<MonitorStats, crate::error::DrowsewatchError>")]
pub struct GetMonitorStats;

/// Clears the event store and resets the episode counter. Routed through
/// the DetectionActor so all state mutation stays on one writer.
#[derive(Message)]
#[rtype(result = "Result<(), crate::error::DrowsewatchError>")]
pub struct ClearHistory;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStats {
    pub total_confirmed: u64,
    pub status: AlertStatus,
    pub frames_processed: u64,
    pub last_detection_time: i64,
}
