use actix::prelude::*;

/// Messages for AlarmActor

/// Idempotent alarm command; the actuator tolerates repeats of the same
/// level.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
#[rtype(result = "Result<(), crate::error::DrowsewatchError>")]
pub struct SetAlarm {
    pub on: bool,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct GetAlarmEngaged;
