//! 底盘
//!
//! 左电机正向前进，右电机反装（负向前进）。
//!
//! 闭环行为（互斥）：
//! - 直行：每拍 `adjustment = heading * correction_gain`，左右输出按前进/后退方向修正
//! - 原地转向：`remaining = target - heading`，两侧同号输出 `clamp(remaining * turn_gain, ±limit)`
//! - 寻找料箱：以寻箱速度直行，直到底盘料箱传感器触发（需先行驶 `time_in` 秒）
//!
//! 所有机动开始时把陀螺仪清零（只清零，不重新标定）。

use crate::output::{Motor, ablimit};
use crate::worker::{Controller, TickContext, respond};
use stacker_hal::{HeadingSensor, LimitSensor, Side, TelemetrySink};
use stacker_protocol::{
    AutonomousCommand, DrivetrainCommand, FailureReason, ReplyTo, Response, Subsystem,
};
use stacker_tools::DrivetrainConfig;
use std::time::Duration;
use tracing::{debug, info};

/// 底盘硬件
pub struct DrivetrainHardware {
    pub left: Motor,
    pub right: Motor,
    pub gyro: Box<dyn HeadingSensor>,
    /// 读取 [`Side::Tote`]
    pub sensors: Box<dyn LimitSensor>,
}

/// 当前机动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManeuverKind {
    #[default]
    Idle,
    /// 定时直行
    Straight,
    /// 无时限直行（StartDriveFwd/Bck）
    Continuous,
    Turn,
    SeekTote,
}

/// 底盘状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DrivetrainStatus {
    pub left: f64,
    pub right: f64,
    pub heading: f64,
    pub maneuver: ManeuverKind,
    pub keep_align: bool,
    pub tote_detected: bool,
}

enum Maneuver {
    Idle,
    Straight {
        speed: f64,
        duration: Option<f64>,
        start: Duration,
        reply: Option<ReplyTo>,
    },
    Turn {
        target: f64,
        timeout: f64,
        start: Duration,
        reply: Option<ReplyTo>,
    },
    SeekTote {
        time_in: f64,
        timeout: f64,
        start: Duration,
        reply: Option<ReplyTo>,
    },
}

impl Maneuver {
    fn kind(&self) -> ManeuverKind {
        match self {
            Maneuver::Idle => ManeuverKind::Idle,
            Maneuver::Straight { duration: None, .. } => ManeuverKind::Continuous,
            Maneuver::Straight { .. } => ManeuverKind::Straight,
            Maneuver::Turn { .. } => ManeuverKind::Turn,
            Maneuver::SeekTote { .. } => ManeuverKind::SeekTote,
        }
    }

    fn take_reply(&mut self) -> Option<ReplyTo> {
        match self {
            Maneuver::Idle => None,
            Maneuver::Straight { reply, .. }
            | Maneuver::Turn { reply, .. }
            | Maneuver::SeekTote { reply, .. } => reply.take(),
        }
    }
}

/// 直行修正输出
///
/// 返回 (left, right)，各自限幅到 `[-1, 1]`。
pub fn straight_outputs(speed: f64, heading: f64, correction_gain: f64) -> (f64, f64) {
    let adjustment = heading * correction_gain;
    let (left, right) = if speed > 0.0 {
        ((1.0 - adjustment) * speed, (-1.0 - adjustment) * speed)
    } else if speed < 0.0 {
        ((1.0 + adjustment) * speed, (-1.0 + adjustment) * speed)
    } else {
        (0.0, 0.0)
    };
    (ablimit(left, 1.0), ablimit(right, 1.0))
}

/// 底盘控制器
pub struct Drivetrain {
    left: Motor,
    right: Motor,
    gyro: Box<dyn HeadingSensor>,
    sensors: Box<dyn LimitSensor>,
    config: DrivetrainConfig,
    maneuver: Maneuver,
    keep_align: bool,
}

impl Drivetrain {
    pub fn new(hardware: DrivetrainHardware, config: DrivetrainConfig) -> Self {
        Self {
            left: hardware.left,
            right: hardware.right,
            gyro: hardware.gyro,
            sensors: hardware.sensors,
            config,
            maneuver: Maneuver::Idle,
            keep_align: false,
        }
    }

    fn set(&mut self, left: f64, right: f64) {
        self.left.set(left);
        self.right.set(right);
    }

    fn stop_motors(&mut self) {
        self.set(0.0, 0.0);
    }

    /// 结束当前机动并回送应答
    fn finish(&mut self, response: Response) {
        let mut maneuver = std::mem::replace(&mut self.maneuver, Maneuver::Idle);
        if !matches!(maneuver, Maneuver::Idle) {
            debug!("drivetrain: {:?} finished: {:?}", maneuver.kind(), response.outcome);
        }
        respond(maneuver.take_reply(), response);
    }

    /// 取消进行中的机动（不改输出）
    fn cancel(&mut self, reason: FailureReason) {
        if !matches!(self.maneuver, Maneuver::Idle) {
            self.finish(Response::error(Subsystem::Drivetrain, reason));
        }
    }

    fn begin(&mut self, maneuver: Maneuver) {
        self.cancel(FailureReason::Preempted);
        self.maneuver = maneuver;
    }

    fn straight_drive_loop(&mut self, speed: f64) {
        let (left, right) =
            straight_outputs(speed, self.gyro.heading(), self.config.correction_gain);
        self.set(left, right);
    }

    fn keep_aligned(&mut self) {
        let value = ablimit(
            -self.gyro.heading() * self.config.turn_gain,
            self.config.turn_speed_limit,
        );
        self.set(value, value);
    }

    fn tank(&mut self, left: f64, right: f64) {
        self.cancel(FailureReason::Preempted);
        self.set(left, -right);
    }

    fn reset_for_autonomous(&mut self) {
        self.cancel(FailureReason::Preempted);
        self.stop_motors();
        self.gyro.zero();
    }
}

impl Controller for Drivetrain {
    type Command = DrivetrainCommand;
    type Status = DrivetrainStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Drivetrain;

    fn handle(&mut self, command: DrivetrainCommand, reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        match command {
            DrivetrainCommand::Stop => {
                self.cancel(FailureReason::Preempted);
                self.stop_motors();
                self.gyro.zero();
            },
            DrivetrainCommand::DriveTank { left, right }
            | DrivetrainCommand::AutoMove { left, right } => self.tank(left, right),
            DrivetrainCommand::DriveArcade { x, y } => {
                self.cancel(FailureReason::Preempted);
                self.set(y + x / 2.0, -(y - x / 2.0));
            },
            DrivetrainCommand::DriveStraight { speed, duration } => {
                self.gyro.zero();
                self.begin(Maneuver::Straight {
                    speed,
                    duration: Some(duration),
                    start: ctx.now,
                    reply: reply.take(),
                });
            },
            DrivetrainCommand::Turn { angle, timeout } => {
                self.gyro.zero();
                let target = angle + self.gyro.heading();
                self.begin(Maneuver::Turn {
                    target,
                    timeout,
                    start: ctx.now,
                    reply: reply.take(),
                });
            },
            DrivetrainCommand::SeekTote { time_in, timeout } => {
                self.gyro.zero();
                self.begin(Maneuver::SeekTote {
                    time_in,
                    timeout,
                    start: ctx.now,
                    reply: reply.take(),
                });
            },
            DrivetrainCommand::StartDriveFwd { speed } | DrivetrainCommand::StartDriveBck { speed } => {
                let speed = if matches!(command, DrivetrainCommand::StartDriveFwd { .. }) {
                    speed.abs()
                } else {
                    -speed.abs()
                };
                self.gyro.zero();
                self.begin(Maneuver::Straight {
                    speed,
                    duration: None,
                    start: ctx.now,
                    reply: None,
                });
            },
            DrivetrainCommand::StartKeepAlign => {
                if !self.keep_align {
                    self.keep_align = true;
                    self.gyro.zero();
                }
            },
            DrivetrainCommand::StopKeepAlign => {
                self.keep_align = false;
                if matches!(self.maneuver, Maneuver::Idle) {
                    self.stop_motors();
                }
            },
        }
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::ModeChanged);
        self.keep_align = false;
        self.stop_motors();
    }

    fn on_autonomous(&mut self, command: AutonomousCommand, _ctx: &TickContext) {
        match command {
            AutonomousCommand::Run | AutonomousCommand::Complete => self.reset_for_autonomous(),
            AutonomousCommand::ChecklistRun => {
                info!("drivetrain: checklist heading {:.3}", self.gyro.heading());
            },
        }
    }

    fn tick(&mut self, ctx: &TickContext) {
        let ok = Response::ok(Subsystem::Drivetrain);
        match self.maneuver {
            Maneuver::Idle => {
                if self.keep_align {
                    self.keep_aligned();
                }
            },
            _ if !ctx.is_autonomous() => {
                self.stop_motors();
                self.finish(Response::error(
                    Subsystem::Drivetrain,
                    FailureReason::ModeChanged,
                ));
            },
            Maneuver::Straight {
                speed,
                duration,
                start,
                ..
            } => {
                if duration.is_some_and(|d| ctx.elapsed_since(start) >= d) {
                    self.stop_motors();
                    self.finish(ok);
                } else {
                    self.straight_drive_loop(speed);
                }
            },
            Maneuver::Turn {
                target,
                timeout,
                start,
                ..
            } => {
                if ctx.elapsed_since(start) >= timeout {
                    self.stop_motors();
                    self.finish(Response::error(Subsystem::Drivetrain, FailureReason::Timeout));
                    return;
                }
                let remaining = target - self.gyro.heading();
                if remaining.abs() < self.config.angle_tolerance {
                    self.stop_motors();
                    self.finish(ok);
                } else {
                    let value = ablimit(remaining * self.config.turn_gain, self.config.turn_speed_limit);
                    self.set(value, value);
                }
            },
            Maneuver::SeekTote {
                time_in,
                timeout,
                start,
                ..
            } => {
                let elapsed = ctx.elapsed_since(start);
                if elapsed >= timeout {
                    self.stop_motors();
                    self.finish(Response::error(Subsystem::Drivetrain, FailureReason::Timeout));
                } else if self.sensors.is_tripped(Side::Tote) && elapsed > time_in {
                    self.stop_motors();
                    self.finish(ok);
                } else {
                    self.straight_drive_loop(self.config.tote_seek_speed);
                }
            },
        }
    }

    fn is_active(&self) -> bool {
        !matches!(self.maneuver, Maneuver::Idle) || self.keep_align
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::SafetyTrip);
        self.keep_align = false;
        self.stop_motors();
    }

    fn status(&self) -> DrivetrainStatus {
        DrivetrainStatus {
            left: self.left.output(),
            right: self.right.output(),
            heading: self.gyro.heading(),
            maneuver: self.maneuver.kind(),
            keep_align: self.keep_align,
            tote_detected: self.sensors.is_tripped(Side::Tote),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        // 截断到千分位
        let heading = (self.gyro.heading() * 1000.0).trunc() / 1000.0;
        sink.publish("Gyro Angle", heading.into());
        sink.publish("Left Drive", self.left.output().into());
        sink.publish("Right Drive", self.right.output().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_hal::mock::{ManualClock, SimGyro, SimMotor, SimSensors};
    use stacker_hal::{Actuator, Clock};
    use stacker_protocol::{Outcome, RobotMode};
    use std::sync::Arc;

    struct Rig {
        drivetrain: Drivetrain,
        left: SimMotor,
        right: SimMotor,
        gyro: SimGyro,
        sensors: SimSensors,
        clock: ManualClock,
    }

    fn rig() -> Rig {
        let clock = ManualClock::new();
        let left = SimMotor::new("left");
        let right = SimMotor::new("right");
        let gyro = SimGyro::new(left.clone(), right.clone(), 0.0, Arc::new(clock.clone()));
        let sensors = SimSensors::new();
        let drivetrain = Drivetrain::new(
            DrivetrainHardware {
                left: Motor::new("left", Box::new(left.clone())),
                right: Motor::new("right", Box::new(right.clone())),
                gyro: Box::new(gyro.clone()),
                sensors: Box::new(sensors.clone()),
            },
            DrivetrainConfig::default(),
        );
        Rig {
            drivetrain,
            left,
            right,
            gyro,
            sensors,
            clock,
        }
    }

    fn ctx(clock: &ManualClock, mode: RobotMode) -> TickContext {
        TickContext {
            now: clock.now(),
            mode,
        }
    }

    #[test]
    fn test_straight_outputs() {
        // 无偏差：左正右负
        assert_eq!(straight_outputs(0.5, 0.0, 0.09), (0.5, -0.5));
        // 正偏差前进：左减右增（绝对值）
        let (l, r) = straight_outputs(0.5, 10.0, 0.09);
        assert!((l - 0.05).abs() < 1e-9);
        assert!((r - (-0.95)).abs() < 1e-9);
        // 后退
        let (l, r) = straight_outputs(-0.5, 10.0, 0.09);
        assert!((l - (-0.95)).abs() < 1e-9);
        assert!((r - 0.05).abs() < 1e-9);
        // 零速
        assert_eq!(straight_outputs(0.0, 30.0, 0.09), (0.0, 0.0));
        // 限幅
        let (l, r) = straight_outputs(1.0, -20.0, 0.09);
        assert_eq!(l, 1.0);
        assert_eq!(r, -1.0);
    }

    #[test]
    fn test_tank_and_arcade_mapping() {
        let mut rig = rig();
        let c = ctx(&rig.clock, RobotMode::Teleoperated);
        let mut none = None;

        rig.drivetrain
            .handle(DrivetrainCommand::DriveTank { left: 0.4, right: 0.6 }, &mut none, &c);
        assert_eq!(rig.left.output(), 0.4);
        assert_eq!(rig.right.output(), -0.6);

        rig.drivetrain
            .handle(DrivetrainCommand::DriveArcade { x: 0.2, y: 0.5 }, &mut none, &c);
        assert!((rig.left.output() - 0.6).abs() < 1e-9);
        assert!((rig.right.output() - (-0.4)).abs() < 1e-9);
    }

    #[test]
    fn test_straight_drive_completes_ok() {
        let mut rig = rig();
        let c = ctx(&rig.clock, RobotMode::Autonomous);
        let (reply, rx) = ReplyTo::channel();
        let mut reply = Some(reply);

        rig.drivetrain.handle(
            DrivetrainCommand::DriveStraight { speed: 0.5, duration: 1.0 },
            &mut reply,
            &c,
        );
        assert!(reply.is_none(), "straight drive keeps the reply");
        assert!(rig.drivetrain.is_active());

        rig.gyro.set_heading(5.0);
        rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        assert!(rig.left.output() < 0.5, "correction applied");

        rig.clock.advance_secs(1.0);
        rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        assert_eq!(rx.try_recv().unwrap().outcome, Outcome::Ok);
        assert_eq!(rig.left.output(), 0.0);
        assert_eq!(rig.right.output(), 0.0);
        assert!(!rig.drivetrain.is_active());
    }

    #[test]
    fn test_stop_preempts_turn() {
        let mut rig = rig();
        let c = ctx(&rig.clock, RobotMode::Autonomous);
        let (reply, rx) = ReplyTo::channel();
        let mut reply = Some(reply);

        rig.drivetrain
            .handle(DrivetrainCommand::Turn { angle: 90.0, timeout: 2.0 }, &mut reply, &c);
        rig.drivetrain.tick(&c);
        assert_eq!(rig.left.output(), 0.5);
        assert_eq!(rig.right.output(), 0.5);

        rig.drivetrain.handle(DrivetrainCommand::Stop, &mut None, &c);
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Error(FailureReason::Preempted)
        );
        assert_eq!(rig.left.output(), 0.0);
        assert!(!rig.drivetrain.is_active());
    }

    #[test]
    fn test_turn_times_out_without_rotation() {
        // 陀螺仪转速为 0：永远到不了目标
        let mut rig = rig();
        let (reply, rx) = ReplyTo::channel();
        let mut reply = Some(reply);
        rig.drivetrain.handle(
            DrivetrainCommand::Turn { angle: 45.0, timeout: 0.5 },
            &mut reply,
            &ctx(&rig.clock, RobotMode::Autonomous),
        );
        for _ in 0..30 {
            rig.clock.advance(Duration::from_millis(20));
            rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        }
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Error(FailureReason::Timeout)
        );
        assert_eq!(rig.left.output(), 0.0);
    }

    #[test]
    fn test_seek_tote_waits_for_time_in() {
        let mut rig = rig();
        let (reply, rx) = ReplyTo::channel();
        let mut reply = Some(reply);
        rig.drivetrain.handle(
            DrivetrainCommand::SeekTote { time_in: 0.5, timeout: 3.0 },
            &mut reply,
            &ctx(&rig.clock, RobotMode::Autonomous),
        );
        rig.sensors.trip(Side::Tote);

        rig.clock.advance_secs(0.2);
        rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        assert!(rx.try_recv().is_err(), "sensor ignored before time_in");
        assert!((rig.left.output() - 0.4).abs() < 1e-9);

        rig.clock.advance_secs(0.4);
        rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(rig.left.output(), 0.0);
    }

    #[test]
    fn test_mode_change_cancels_and_zeroes() {
        let mut rig = rig();
        let (reply, rx) = ReplyTo::channel();
        let mut reply = Some(reply);
        let c = ctx(&rig.clock, RobotMode::Autonomous);
        rig.drivetrain
            .handle(DrivetrainCommand::StartKeepAlign, &mut None, &c);
        rig.drivetrain.handle(
            DrivetrainCommand::DriveStraight { speed: 0.7, duration: 5.0 },
            &mut reply,
            &c,
        );
        rig.drivetrain.tick(&c);

        rig.drivetrain
            .on_mode_change(&ctx(&rig.clock, RobotMode::Disabled));
        assert_eq!(
            rx.try_recv().unwrap().outcome,
            Outcome::Error(FailureReason::ModeChanged)
        );
        let status = rig.drivetrain.status();
        assert_eq!(status.maneuver, ManeuverKind::Idle);
        assert!(!status.keep_align);
        assert_eq!(rig.left.output(), 0.0);
        assert_eq!(rig.right.output(), 0.0);
    }

    #[test]
    fn test_keep_align_counters_heading() {
        let mut rig = rig();
        let c = ctx(&rig.clock, RobotMode::Teleoperated);
        rig.drivetrain
            .handle(DrivetrainCommand::StartKeepAlign, &mut None, &c);
        rig.gyro.set_heading(4.0);
        rig.drivetrain.tick(&c);
        assert!((rig.left.output() - (-0.2)).abs() < 1e-9);
        assert!((rig.right.output() - (-0.2)).abs() < 1e-9);

        rig.drivetrain
            .handle(DrivetrainCommand::StopKeepAlign, &mut None, &c);
        assert_eq!(rig.left.output(), 0.0);
    }

    #[test]
    fn test_continuous_drive_backward() {
        let mut rig = rig();
        let c = ctx(&rig.clock, RobotMode::Autonomous);
        rig.drivetrain
            .handle(DrivetrainCommand::StartDriveBck { speed: 0.3 }, &mut None, &c);
        rig.drivetrain.tick(&c);
        assert!((rig.left.output() - (-0.3)).abs() < 1e-9);
        assert!((rig.right.output() - 0.3).abs() < 1e-9);
        assert_eq!(rig.drivetrain.status().maneuver, ManeuverKind::Continuous);

        // 无时限直行不会自行结束
        rig.clock.advance_secs(60.0);
        rig.drivetrain.tick(&ctx(&rig.clock, RobotMode::Autonomous));
        assert!(rig.drivetrain.is_active());
    }
}
