// Common test utilities shared by the integration test crates.

use chrono::{TimeZone, Utc};
use drowsewatch_service::messages::capture::CapturedFrame;

// Common test setup
pub fn init_test_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new("debug"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// Test helper functions
pub fn create_test_frame(index: u64, millis: i64) -> CapturedFrame {
    CapturedFrame {
        data: vec![96u8; 64 * 48 * 3],
        width: 64,
        height: 48,
        timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + millis).unwrap(),
        frame_index: index,
    }
}

#[test]
fn test_frames_are_well_formed() {
    let frame = create_test_frame(3, 300);
    assert_eq!(frame.data.len(), (frame.width * frame.height * 3) as usize);
    assert_eq!(frame.frame_index, 3);
}
