use enum_dispatch::enum_dispatch;
use rppal::gpio::{Gpio, OutputPin};
use tracing::{info, warn};

use crate::config::{AlarmDriver, CONFIG};
use crate::error::DrowsewatchError;

/// Binary interface to the physical alarm. Implementations are idempotent:
/// repeating the current level is a no-op at the hardware.
#[enum_dispatch(ActuatorKind)]
pub trait Actuator {
    fn set_alarm(&mut self, on: bool) -> Result<(), DrowsewatchError>;

    fn name(&self) -> &'static str;
}

#[enum_dispatch]
pub enum ActuatorKind {
    GpioActuator(GpioActuator),
    ConsoleActuator(ConsoleActuator),
}

/// Builds the configured driver. A GPIO setup failure (non-Pi host,
/// missing permissions) degrades to the console driver so the monitor
/// still runs.
pub fn from_config() -> ActuatorKind {
    match CONFIG.alarm.driver {
        AlarmDriver::Gpio => match GpioActuator::new(CONFIG.alarm.led_pin, CONFIG.alarm.buzzer_pin)
        {
            Ok(actuator) => actuator.into(),
            Err(err) => {
                warn!("GPIO alarm unavailable ({}), falling back to console", err);
                ConsoleActuator::default().into()
            }
        },
        AlarmDriver::Console => ConsoleActuator::default().into(),
    }
}

/// Drives the red LED and the buzzer together.
pub struct GpioActuator {
    led: OutputPin,
    buzzer: OutputPin,
}

impl GpioActuator {
    pub fn new(led_pin: u8, buzzer_pin: u8) -> Result<Self, DrowsewatchError> {
        let gpio = Gpio::new()?;
        let led = gpio.get(led_pin)?.into_output_low();
        let buzzer = gpio.get(buzzer_pin)?.into_output_low();
        Ok(Self { led, buzzer })
    }
}

impl Actuator for GpioActuator {
    fn set_alarm(&mut self, on: bool) -> Result<(), DrowsewatchError> {
        if on {
            self.led.set_high();
            self.buzzer.set_high();
        } else {
            self.led.set_low();
            self.buzzer.set_low();
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Gpio"
    }
}

/// No hardware attached: log level changes instead.
#[derive(Default)]
pub struct ConsoleActuator {
    engaged: bool,
}

impl Actuator for ConsoleActuator {
    fn set_alarm(&mut self, on: bool) -> Result<(), DrowsewatchError> {
        if on != self.engaged {
            info!(target: "alarm", "Alarm {}", if on { "raised" } else { "lowered" });
            self.engaged = on;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Console"
    }
}
