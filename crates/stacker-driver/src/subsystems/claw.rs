//! 夹爪
//!
//! 每次开/合最多驱动 `action_time_limit` 秒；电流达到 `current_max` 立即停机（夹紧即停）。

use crate::output::Motor;
use crate::worker::{Controller, TickContext};
use stacker_hal::TelemetrySink;
use stacker_protocol::{ClawCommand, ReplyTo, Subsystem};
use stacker_tools::ClawConfig;
use std::time::Duration;
use tracing::debug;

/// 夹爪状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClawStatus {
    pub output: f64,
    pub current: f64,
    pub moving: bool,
}

/// 夹爪控制器
pub struct Claw {
    motor: Motor,
    config: ClawConfig,
    /// 本次动作开始时刻
    action_start: Option<Duration>,
}

impl Claw {
    pub fn new(motor: Motor, config: ClawConfig) -> Self {
        Self {
            motor,
            config,
            action_start: None,
        }
    }

    fn drive(&mut self, value: f64, ctx: &TickContext) {
        self.action_start = Some(ctx.now);
        if self.motor.current() < self.config.current_max {
            self.motor.set(value);
        } else {
            debug!("claw: current {:.1}A at limit, not driving", self.motor.current());
            self.halt();
        }
    }

    fn halt(&mut self) {
        self.motor.stop();
        self.action_start = None;
    }
}

impl Controller for Claw {
    type Command = ClawCommand;
    type Status = ClawStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Claw;

    fn handle(&mut self, command: ClawCommand, _reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        match command {
            ClawCommand::Open => self.drive(self.config.open, ctx),
            ClawCommand::Close => self.drive(self.config.close, ctx),
            ClawCommand::Stop => self.halt(),
        }
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.halt();
    }

    fn tick(&mut self, ctx: &TickContext) {
        let Some(start) = self.action_start else {
            return;
        };
        if self.motor.current() >= self.config.current_max
            || ctx.elapsed_since(start) > self.config.action_time_limit
        {
            self.halt();
        }
    }

    fn is_active(&self) -> bool {
        self.action_start.is_some()
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.halt();
    }

    fn status(&self) -> ClawStatus {
        ClawStatus {
            output: self.motor.output(),
            current: self.motor.current(),
            moving: self.action_start.is_some(),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        let current = (self.motor.current() * 1000.0).trunc() / 1000.0;
        sink.publish("Claw Current", current.into());
    }
}
