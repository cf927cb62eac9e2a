use actix::prelude::*;
use chrono::{DateTime, Utc};

use crate::error::DrowsewatchError;

/// Messages for CaptureActor

/// One decoded frame, packed RGB24. Moves by value from the capture task
/// into the detection pipeline; nothing else ever holds it.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: DateTime<Utc>,
    pub frame_index: u64,
}

#[derive(Message)]
#[rtype(result = "Result<(), crate::error::DrowsewatchError>")]
pub struct StartCapture {
    pub source: String,
}

#[derive(Message)]
#[rtype(result = "Result<(), crate::error::DrowsewatchError>")]
pub struct StopCapture;

/// Sent from the capture task to the CaptureActor itself.
#[derive(Message)]
#[rtype(result = "()")]
pub struct LatestFrameAvailable {
    pub frame: CapturedFrame,
}

/// Sent from DetectionActor to CaptureActor when it's ready for a new frame.
#[derive(Message)]
#[rtype(result = "()")]
pub struct DetectorReady;

#[derive(Message)]
#[rtype(result = "()")]
pub struct InternalProcessingComplete {
    pub result: Result<(), DrowsewatchError>,
}
