pub mod alarm;
pub mod capture;
pub mod detection;
pub mod supervisor;
pub mod system;
pub mod telemetry;

pub use alarm::*;
pub use capture::*;
pub use detection::*;
pub use system::*;
pub use telemetry::*;
