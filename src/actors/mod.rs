pub mod alarm;
pub mod capture;
pub mod detection;
pub mod supervisor;
pub mod telemetry;

pub use alarm::AlarmActor;
pub use capture::CaptureActor;
pub use detection::DetectionActor;
pub use supervisor::SupervisorActor;
pub use telemetry::TelemetryActor;
