//! 风扇

use crate::output::Motor;
use crate::worker::{Controller, TickContext};
use stacker_hal::TelemetrySink;
use stacker_protocol::{FanCommand, ReplyTo, Subsystem};
use stacker_tools::FanConfig;

/// 风扇状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FanStatus {
    pub blowing: bool,
    pub output: f64,
}

/// 风扇控制器
pub struct Fan {
    motor: Motor,
    config: FanConfig,
    blowing: bool,
}

impl Fan {
    pub fn new(motor: Motor, config: FanConfig) -> Self {
        Self {
            motor,
            config,
            blowing: false,
        }
    }

    fn apply(&mut self) {
        if self.blowing {
            self.motor.set(self.config.power);
        } else {
            self.motor.stop();
        }
    }
}

impl Controller for Fan {
    type Command = FanCommand;
    type Status = FanStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Fan;

    fn handle(&mut self, command: FanCommand, _reply: &mut Option<ReplyTo>, _ctx: &TickContext) {
        self.blowing = match command {
            FanCommand::Start => true,
            FanCommand::Stop => false,
            FanCommand::Toggle => !self.blowing,
        };
        self.apply();
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.blowing = false;
        self.apply();
    }

    fn tick(&mut self, _ctx: &TickContext) {}

    fn is_active(&self) -> bool {
        false
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.blowing = false;
        self.apply();
    }

    fn status(&self) -> FanStatus {
        FanStatus {
            blowing: self.blowing,
            output: self.motor.output(),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        sink.publish("Fan Blowing", self.blowing.into());
    }
}
