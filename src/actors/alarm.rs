use actix::prelude::*;
use tracing::{error, info};

use crate::actuator::{Actuator, ActuatorKind};
use crate::error::DrowsewatchError;
use crate::messages::{GetAlarmEngaged, SetAlarm};

/// AlarmActor owns the hardware alarm; nothing else touches the pins.
pub struct AlarmActor {
    actuator: ActuatorKind,
    engaged: bool,
}

impl Actor for AlarmActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("AlarmActor started with {} driver", self.actuator.name());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Leave the hardware quiet on the way out.
        if self.engaged {
            if let Err(err) = self.actuator.set_alarm(false) {
                error!("Failed to lower alarm on shutdown: {}", err);
            }
        }
        info!("AlarmActor stopped");
    }
}

impl AlarmActor {
    pub fn new(actuator: ActuatorKind) -> Self {
        Self {
            actuator,
            engaged: false,
        }
    }
}

impl Handler<SetAlarm> for AlarmActor {
    type Result = Result<(), DrowsewatchError>;

    fn handle(&mut self, msg: SetAlarm, _ctx: &mut Self::Context) -> Self::Result {
        self.actuator.set_alarm(msg.on)?;
        self.engaged = msg.on;
        Ok(())
    }
}

impl Handler<GetAlarmEngaged> for AlarmActor {
    type Result = bool;

    fn handle(&mut self, _msg: GetAlarmEngaged, _ctx: &mut Self::Context) -> Self::Result {
        self.engaged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ConsoleActuator;

    fn alarm_actor() -> Addr<AlarmActor> {
        AlarmActor::new(ConsoleActuator::default().into()).start()
    }

    #[actix::test]
    async fn alarm_starts_disengaged() {
        let actor = alarm_actor();
        assert!(!actor.send(GetAlarmEngaged).await.unwrap());
    }

    #[actix::test]
    async fn alarm_raises_and_lowers() {
        let actor = alarm_actor();
        actor.send(SetAlarm { on: true }).await.unwrap().unwrap();
        assert!(actor.send(GetAlarmEngaged).await.unwrap());
        actor.send(SetAlarm { on: false }).await.unwrap().unwrap();
        assert!(!actor.send(GetAlarmEngaged).await.unwrap());
    }

    #[actix::test]
    async fn repeated_commands_are_idempotent() {
        let actor = alarm_actor();
        for _ in 0..3 {
            actor.send(SetAlarm { on: true }).await.unwrap().unwrap();
        }
        assert!(actor.send(GetAlarmEngaged).await.unwrap());
    }
}
