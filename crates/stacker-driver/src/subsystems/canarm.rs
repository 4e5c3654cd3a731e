//! 推罐臂
//!
//! 只在自动阶段运动：开/合命令驱动给定时长后自动停止，其他模式下输出始终为零。

use crate::output::Motor;
use crate::worker::{Controller, TickContext};
use stacker_hal::TelemetrySink;
use stacker_protocol::{CanArmCommand, ReplyTo, Subsystem};
use stacker_tools::CanArmConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// 推罐臂动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmMotion {
    #[default]
    Idle,
    Opening,
    Closing,
}

/// 推罐臂状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CanArmStatus {
    pub output: f64,
    pub current: f64,
    pub motion: ArmMotion,
}

/// 推罐臂控制器
pub struct CanArm {
    motor: Motor,
    config: CanArmConfig,
    motion: ArmMotion,
    start: Duration,
    duration: f64,
}

impl CanArm {
    pub fn new(motor: Motor, config: CanArmConfig) -> Self {
        Self {
            motor,
            config,
            motion: ArmMotion::Idle,
            start: Duration::ZERO,
            duration: 0.0,
        }
    }

    fn start(&mut self, motion: ArmMotion, duration: f64, ctx: &TickContext) {
        debug!("canarm: {:?} for {:.2}s", motion, duration);
        self.motion = motion;
        self.start = ctx.now;
        self.duration = duration;
        self.apply(ctx);
    }

    fn halt(&mut self) {
        self.motion = ArmMotion::Idle;
        self.motor.stop();
    }

    /// 按当前动作与模式设置输出
    fn apply(&mut self, ctx: &TickContext) {
        if !ctx.is_autonomous() {
            self.halt();
            return;
        }
        if self.motion != ArmMotion::Idle && ctx.elapsed_since(self.start) >= self.duration {
            self.motion = ArmMotion::Idle;
        }
        if self.motor.current() > self.config.current_max {
            warn!("canarm: current {:.1}A over limit, stopping", self.motor.current());
            self.halt();
            return;
        }
        match self.motion {
            ArmMotion::Opening => self.motor.set(self.config.open),
            ArmMotion::Closing => self.motor.set(self.config.close),
            ArmMotion::Idle => self.motor.stop(),
        }
    }
}

impl Controller for CanArm {
    type Command = CanArmCommand;
    type Status = CanArmStatus;
    const SUBSYSTEM: Subsystem = Subsystem::CanArm;

    fn handle(&mut self, command: CanArmCommand, _reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        match command {
            CanArmCommand::Open { duration } => self.start(ArmMotion::Opening, duration, ctx),
            CanArmCommand::Close { duration } => self.start(ArmMotion::Closing, duration, ctx),
            CanArmCommand::Stop => self.halt(),
        }
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.halt();
    }

    fn tick(&mut self, ctx: &TickContext) {
        if self.motion != ArmMotion::Idle {
            self.apply(ctx);
        }
    }

    fn is_active(&self) -> bool {
        self.motion != ArmMotion::Idle
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.halt();
    }

    fn status(&self) -> CanArmStatus {
        CanArmStatus {
            output: self.motor.output(),
            current: self.motor.current(),
            motion: self.motion,
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        let current = (self.motor.current() * 1000.0).trunc() / 1000.0;
        sink.publish("Arm Current", current.into());
    }
}
