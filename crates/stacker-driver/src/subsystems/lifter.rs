//! 升降机（抓罐升降）
//!
//! 电机负向为上升、正向为下降（由 `up_mult` / `down_mult` 给出）。
//! 霍尔传感器：`Hover`（悬停点，带锁存）、`Top`、`Bottom`。
//!
//! 手动阶段的悬停逻辑：
//! - 在悬停点以下上升：启用悬停
//! - 已启用悬停时到达悬停点：输出悬停功率，并记住"停止后继续悬停"
//! - 停止：若需要继续悬停则输出悬停功率（同时关闭悬停启用），否则归零
//!
//! 任意时刻输出电流超过 `current_max` 都立即停机。

use crate::output::Motor;
use crate::worker::{Controller, TickContext, respond};
use stacker_hal::{LimitSensor, Side, TelemetrySink};
use stacker_protocol::{FailureReason, LifterCommand, ReplyTo, Response, Subsystem};
use stacker_tools::LifterConfig;
use std::time::Duration;
use tracing::{debug, warn};

/// 升降机硬件
pub struct LifterHardware {
    pub motor: Motor,
    /// 读取 [`Side::Hover`] / [`Side::Top`] / [`Side::Bottom`]
    pub sensors: Box<dyn LimitSensor>,
}

/// 自动操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifterOperation {
    #[default]
    Idle,
    RaiseTotes,
    LowerTotes,
    ClawToTop,
    ClawToBottom,
    RaiseLoMid,
    LowerHiMid,
}

/// 升降机状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LifterStatus {
    pub output: f64,
    pub current: f64,
    pub hover_enabled: bool,
    pub hover_while_stopped: bool,
    pub at_hover_point: bool,
    pub raising: bool,
    pub lowering: bool,
    pub operation: LifterOperation,
}

struct Operation {
    kind: LifterOperation,
    start: Duration,
    reply: Option<ReplyTo>,
}

/// 升降机控制器
pub struct Lifter {
    motor: Motor,
    sensors: Box<dyn LimitSensor>,
    config: LifterConfig,
    operation: Option<Operation>,
    hover_enabled: bool,
    hover_while_stopped: bool,
    /// 悬停霍尔锁存：两次命令之间经过悬停点也能被看到
    hover_latched: bool,
}

impl Lifter {
    pub fn new(hardware: LifterHardware, config: LifterConfig) -> Self {
        Self {
            motor: hardware.motor,
            sensors: hardware.sensors,
            config,
            operation: None,
            hover_enabled: false,
            hover_while_stopped: false,
            hover_latched: false,
        }
    }

    fn tripped(&self, side: Side) -> bool {
        self.sensors.is_tripped(side)
    }

    /// 限流驱动：电流未超限时设置输出并返回 true，否则停机返回 false
    fn current_limit_drive(&mut self, value: f64) -> bool {
        if self.motor.current() > self.config.current_max {
            self.motor.stop();
            return false;
        }
        self.motor.set(value);
        true
    }

    fn hover(&mut self) {
        self.motor.set(self.config.hover);
    }

    fn finish(&mut self, response: Response) {
        if let Some(operation) = self.operation.take() {
            debug!("lifter: {:?} finished: {:?}", operation.kind, response.outcome);
            respond(operation.reply, response);
        }
    }

    fn cancel(&mut self, reason: FailureReason) {
        self.finish(Response::error(Subsystem::Lifter, reason));
    }

    fn begin(&mut self, kind: LifterOperation, reply: Option<ReplyTo>, ctx: &TickContext) {
        self.cancel(FailureReason::Preempted);
        self.operation = Some(Operation {
            kind,
            start: ctx.now,
            reply,
        });
    }

    fn raise(&mut self, speed: f64) {
        let drive = self.config.up_mult * speed;
        if self.tripped(Side::Hover) || self.hover_latched {
            self.hover_latched = false;
            if self.hover_enabled {
                self.hover();
                self.hover_while_stopped = true;
            } else {
                self.current_limit_drive(drive);
            }
        } else {
            self.current_limit_drive(drive);
            self.hover_enabled = true;
            self.hover_while_stopped = false;
        }
    }

    fn stop(&mut self) {
        if self.hover_while_stopped {
            self.hover();
            self.hover_enabled = false;
        } else {
            self.motor.stop();
        }
    }

    fn step_operation(&mut self, ctx: &TickContext) {
        let Some(operation) = &self.operation else {
            return;
        };
        let kind = operation.kind;
        let elapsed = ctx.elapsed_since(operation.start);

        if !ctx.is_autonomous() {
            self.motor.stop();
            self.cancel(FailureReason::ModeChanged);
            return;
        }

        let ok = Response::ok(Subsystem::Lifter);
        let timeout = Response::error(Subsystem::Lifter, FailureReason::Timeout);
        let raise = self.config.up_mult;
        let lower = self.config.down_mult;

        match kind {
            LifterOperation::Idle => self.finish(ok),
            LifterOperation::RaiseTotes => {
                if elapsed < self.config.start_raise_time {
                    self.motor.set(self.config.start_raise);
                } else if self.tripped(Side::Top) {
                    self.hover();
                    self.finish(ok);
                } else if elapsed >= self.config.raise_timeout {
                    self.hover();
                    self.finish(timeout);
                } else {
                    self.motor.set(raise);
                }
            },
            LifterOperation::LowerTotes => {
                if self.tripped(Side::Bottom) {
                    self.hover();
                    self.finish(ok);
                } else if elapsed >= self.config.travel_timeout {
                    self.hover();
                    self.finish(timeout);
                } else {
                    self.motor.set(lower);
                }
            },
            LifterOperation::ClawToTop => {
                if self.motor.current() > self.config.current_max_one_can {
                    self.hover();
                    self.finish(ok);
                } else if elapsed >= self.config.travel_timeout {
                    self.hover();
                    self.finish(timeout);
                } else {
                    self.motor.set(raise);
                }
            },
            LifterOperation::ClawToBottom => {
                if !self.current_limit_drive(lower) {
                    self.finish(ok);
                } else if elapsed >= self.config.travel_timeout {
                    self.motor.stop();
                    self.finish(timeout);
                }
            },
            LifterOperation::RaiseLoMid => {
                if self.tripped(Side::Bottom) {
                    self.hover();
                    self.finish(ok);
                } else if elapsed >= self.config.travel_timeout {
                    self.hover();
                    self.finish(timeout);
                } else {
                    self.motor.set(self.config.raise_lomid);
                }
            },
            LifterOperation::LowerHiMid => {
                if self.tripped(Side::Top) {
                    self.motor.stop();
                    self.finish(ok);
                } else if elapsed >= self.config.travel_timeout {
                    self.motor.stop();
                    self.finish(timeout);
                } else {
                    self.motor.set(lower);
                }
            },
        }
    }

    fn direction(&self) -> (bool, bool) {
        let output = self.motor.output();
        if output == 0.0 {
            return (false, false);
        }
        let up = output.signum() == self.config.up_mult.signum();
        (up, !up)
    }
}

impl Controller for Lifter {
    type Command = LifterCommand;
    type Status = LifterStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Lifter;

    fn handle(&mut self, command: LifterCommand, reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        match command {
            LifterCommand::Raise { speed } => {
                self.cancel(FailureReason::Preempted);
                self.raise(speed);
            },
            LifterCommand::Lower { speed } => {
                self.cancel(FailureReason::Preempted);
                self.current_limit_drive(self.config.down_mult * speed);
                self.hover_while_stopped = false;
            },
            LifterCommand::Stop => {
                self.cancel(FailureReason::Preempted);
                self.stop();
            },
            LifterCommand::Hover => {
                self.cancel(FailureReason::Preempted);
                self.hover();
            },
            LifterCommand::ToggleHover => {
                self.hover_enabled = !self.hover_enabled;
                debug!("lifter: hover enabled = {}", self.hover_enabled);
            },
            LifterCommand::RaiseTotes { count } => {
                debug!("lifter: raising {} totes", count);
                self.hover_enabled = true;
                self.begin(LifterOperation::RaiseTotes, reply.take(), ctx);
                self.motor.set(self.config.start_raise);
            },
            LifterCommand::LowerTotes => {
                self.hover_enabled = false;
                self.begin(LifterOperation::LowerTotes, reply.take(), ctx);
            },
            LifterCommand::StartRaiseTotes { count } => {
                debug!("lifter: start raising {} totes", count);
                self.cancel(FailureReason::Preempted);
                self.hover_enabled = true;
                self.motor.set(self.config.start_raise);
            },
            LifterCommand::ClawToTop => {
                self.hover_enabled = false;
                self.begin(LifterOperation::ClawToTop, reply.take(), ctx);
            },
            LifterCommand::ClawToBottom => {
                self.hover_enabled = false;
                self.begin(LifterOperation::ClawToBottom, reply.take(), ctx);
            },
            LifterCommand::RaiseLoMid => {
                self.hover_enabled = false;
                self.begin(LifterOperation::RaiseLoMid, None, ctx);
            },
            LifterCommand::LowerHiMid => {
                self.hover_enabled = true;
                self.begin(LifterOperation::LowerHiMid, None, ctx);
            },
        }
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::ModeChanged);
        self.motor.stop();
        self.hover_enabled = false;
        self.hover_while_stopped = false;
        self.hover_latched = false;
    }

    fn tick(&mut self, ctx: &TickContext) {
        if self.tripped(Side::Hover) {
            self.hover_latched = true;
        }

        self.step_operation(ctx);

        if self.motor.current() > self.config.current_max && self.motor.output() != 0.0 {
            warn!(
                "lifter: current {:.1}A over limit, stopping",
                self.motor.current()
            );
            self.motor.stop();
            self.cancel(FailureReason::SafetyTrip);
        }
    }

    fn is_active(&self) -> bool {
        self.operation.is_some()
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::SafetyTrip);
        self.motor.stop();
        self.hover_enabled = false;
        self.hover_while_stopped = false;
    }

    fn status(&self) -> LifterStatus {
        let (raising, lowering) = self.direction();
        LifterStatus {
            output: self.motor.output(),
            current: self.motor.current(),
            hover_enabled: self.hover_enabled,
            hover_while_stopped: self.hover_while_stopped,
            at_hover_point: self.tripped(Side::Hover),
            raising,
            lowering,
            operation: self
                .operation
                .as_ref()
                .map_or(LifterOperation::Idle, |op| op.kind),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        let (raising, lowering) = self.direction();
        sink.publish("Lift Current", self.motor.current().into());
        sink.publish("Lifter At Hall Effect", self.tripped(Side::Hover).into());
        sink.publish("Lifter Hover Enabled", self.hover_enabled.into());
        sink.publish("Lifter Hover While Stopped", self.hover_while_stopped.into());
        sink.publish("Lifter Raising", raising.into());
        sink.publish("Lifter Lowering", lowering.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_hal::mock::{ManualClock, SimMotor, SimSensors};
    use stacker_hal::{Actuator, Clock};
    use stacker_protocol::{Outcome, RobotMode};

    struct Rig {
        lifter: Lifter,
        motor: SimMotor,
        sensors: SimSensors,
        clock: ManualClock,
    }

    fn rig() -> Rig {
        let motor = SimMotor::new("lifter");
        let sensors = SimSensors::new();
        let lifter = Lifter::new(
            LifterHardware {
                motor: Motor::new("lifter", Box::new(motor.clone())),
                sensors: Box::new(sensors.clone()),
            },
            LifterConfig::default(),
        );
        Rig {
            lifter,
            motor,
            sensors,
            clock: ManualClock::new(),
        }
    }

    impl Rig {
        fn ctx(&self) -> TickContext {
            TickContext {
                now: self.clock.now(),
                mode: RobotMode::Autonomous,
            }
        }

        fn send(&mut self, command: LifterCommand) -> crossbeam_channel::Receiver<Response> {
            let (reply, rx) = ReplyTo::channel();
            let mut reply = Some(reply);
            let ctx = self.ctx();
            self.lifter.handle(command, &mut reply, &ctx);
            respond(reply, Response::ok(Subsystem::Lifter));
            rx
        }

        fn step(&mut self, secs: f64) {
            self.clock.advance_secs(secs);
            let ctx = self.ctx();
            self.lifter.tick(&ctx);
        }
    }

    #[test]
    fn test_raise_below_hover_point_enables_hover() {
        let mut rig = rig();
        rig.send(LifterCommand::Raise { speed: 1.0 });
        assert_eq!(rig.motor.output(), -1.0);
        let status = rig.lifter.status();
        assert!(status.hover_enabled);
        assert!(status.raising);
    }

    #[test]
    fn test_hover_while_stopped() {
        let mut rig = rig();
        rig.send(LifterCommand::Raise { speed: 1.0 });

        // 到达悬停点：保持悬停功率
        rig.sensors.trip(Side::Hover);
        rig.send(LifterCommand::Raise { speed: 1.0 });
        assert_eq!(rig.motor.output(), -0.25);
        assert!(rig.lifter.status().hover_while_stopped);

        rig.send(LifterCommand::Stop);
        assert_eq!(rig.motor.output(), -0.25);
        assert!(!rig.lifter.status().hover_enabled);

        // 再次经过悬停点：悬停已关闭，照常上升
        rig.send(LifterCommand::Raise { speed: 0.5 });
        assert_eq!(rig.motor.output(), -0.5);
    }

    #[test]
    fn test_hover_latch_catches_passing_hall() {
        let mut rig = rig();
        rig.send(LifterCommand::Raise { speed: 1.0 });
        // 两次命令之间经过悬停点
        rig.sensors.trip(Side::Hover);
        rig.step(0.02);
        rig.sensors.clear(Side::Hover);

        rig.send(LifterCommand::Raise { speed: 1.0 });
        assert_eq!(rig.motor.output(), -0.25);
    }

    #[test]
    fn test_lower_clears_hover_while_stopped() {
        let mut rig = rig();
        rig.lifter.hover_while_stopped = true;
        rig.send(LifterCommand::Lower { speed: 0.5 });
        assert_eq!(rig.motor.output(), 0.5);
        rig.send(LifterCommand::Stop);
        assert_eq!(rig.motor.output(), 0.0);
    }

    #[test]
    fn test_overcurrent_stops_motor() {
        let mut rig = rig();
        rig.motor.set_current(35.0);
        rig.send(LifterCommand::Lower { speed: 1.0 });
        assert_eq!(rig.motor.output(), 0.0, "current limited drive refuses");

        rig.motor.set_current(0.0);
        rig.send(LifterCommand::Lower { speed: 1.0 });
        rig.motor.set_current(31.0);
        rig.step(0.02);
        assert_eq!(rig.motor.output(), 0.0);
    }

    #[test]
    fn test_raise_totes_sequence() {
        let mut rig = rig();
        let rx = rig.send(LifterCommand::RaiseTotes { count: 2 });
        assert_eq!(rig.motor.output(), -0.6);

        rig.step(0.1);
        assert_eq!(rig.motor.output(), -0.6, "start raise phase");
        rig.step(0.2);
        assert_eq!(rig.motor.output(), -1.0);
        assert!(rx.try_recv().is_err());

        rig.sensors.trip(Side::Top);
        rig.step(0.02);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(rig.motor.output(), -0.25, "hovering at top");
    }

    #[test]
    fn test_raise_totes_timeout() {
        let mut rig = rig();
        let rx = rig.send(LifterCommand::RaiseTotes { count: 1 });
        for _ in 0..110 {
            rig.step(0.02);
        }
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Error(FailureReason::Timeout)
        );
        assert_eq!(rig.motor.output(), -0.25);
    }

    #[test]
    fn test_claw_to_top_on_current_rise() {
        let mut rig = rig();
        let rx = rig.send(LifterCommand::ClawToTop);
        rig.step(0.02);
        assert_eq!(rig.motor.output(), -1.0);

        rig.motor.set_current(22.0);
        rig.step(0.02);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(rig.motor.output(), -0.25);
    }

    #[test]
    fn test_claw_to_bottom_stops_on_stall() {
        let mut rig = rig();
        let rx = rig.send(LifterCommand::ClawToBottom);
        rig.step(0.02);
        assert_eq!(rig.motor.output(), 1.0);

        rig.motor.set_current(32.0);
        rig.step(0.02);
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(rig.motor.output(), 0.0);
    }

    #[test]
    fn test_lomid_acks_immediately_and_hovers_at_bottom_hall() {
        let mut rig = rig();
        let rx = rig.send(LifterCommand::RaiseLoMid);
        assert!(rx.try_recv().unwrap().is_ok());
        rig.step(0.02);
        assert_eq!(rig.motor.output(), -0.75);

        rig.sensors.trip(Side::Bottom);
        rig.step(0.02);
        assert_eq!(rig.motor.output(), -0.25);
        assert!(!rig.lifter.is_active());
    }

    #[test]
    fn test_mode_change_clears_hover_flags() {
        let mut rig = rig();
        rig.send(LifterCommand::Raise { speed: 1.0 });
        let rx = rig.send(LifterCommand::LowerTotes);

        let ctx = TickContext {
            now: rig.clock.now(),
            mode: RobotMode::Disabled,
        };
        rig.lifter.on_mode_change(&ctx);
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Error(FailureReason::ModeChanged)
        );
        let status = rig.lifter.status();
        assert_eq!(status.output, 0.0);
        assert!(!status.hover_enabled);
        assert!(!status.hover_while_stopped);
    }
}
