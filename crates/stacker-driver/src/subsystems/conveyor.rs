//! 传送带（料箱托盘）
//!
//! 前后各一个光电：`Front` 靠近入口，`Back` 靠近夹爪。`is_tripped` 表示光束被料箱遮挡。
//!
//! 自动阶段的装载/寻找/移位命令是按节拍推进的小状态机，
//! 因此 `Stop` 或模式切换可以在下一拍内抢占它们：
//!
//! | 操作 | 输出 | 结束条件 | 应答 |
//! |------|------|----------|------|
//! | SeekToteFront | +load | Front 遮挡 | OK / 超时 ERROR |
//! | SeekToteBack | -load | Back 遮挡 | OK / 超时 ERROR |
//! | FrontLoadTote | +load | Back 遮挡 | OK / 超时 ERROR |
//! | BackLoadTote | -load | Front 遮挡 | OK / 超时 ERROR |
//! | ShiftTotesFwd | -shift | Back 畅通或 3s | 无 |
//! | ShiftTotesBck | +shift | Back 遮挡或 3s | 无 |
//! | PushTotesBck | +shift | 0.25s | 无 |
//! | DepositTotesBck | deposit | 前后都畅通 | OK / 超时 ERROR |
//!
//! `WaitFrontBeam` / `WaitBackBeam` 不占用传送带：只挂起应答，光电读到畅通的那一拍回送 OK。

use crate::output::Motor;
use crate::worker::{Controller, TickContext, respond};
use stacker_hal::{LimitSensor, Side, TelemetrySink};
use stacker_protocol::{ConveyorCommand, FailureReason, ReplyTo, Response, Subsystem};
use stacker_tools::ConveyorConfig;
use std::time::Duration;
use tracing::debug;

/// 传送带硬件
pub struct ConveyorHardware {
    pub motor: Motor,
    /// 读取 [`Side::Front`] / [`Side::Back`]
    pub sensors: Box<dyn LimitSensor>,
}

/// 当前操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConveyorOperation {
    #[default]
    Idle,
    /// 手动后送（带后挡逻辑）
    RunBack,
    /// 运行直到某个光电被遮挡（寻找/装载）
    Convey,
    Shift,
    Push,
    Deposit,
}

/// 传送带状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConveyorStatus {
    pub output: f64,
    pub front_clear: bool,
    pub back_clear: bool,
    pub back_stop_armed: bool,
    pub operation: ConveyorOperation,
    pub waiting_front: bool,
    pub waiting_back: bool,
}

enum Operation {
    Idle,
    RunBack,
    Convey {
        until: Side,
        speed: f64,
        timeout: f64,
        start: Duration,
        reply: Option<ReplyTo>,
    },
    Shift {
        speed: f64,
        /// Back 光电达到此状态时结束（true = 遮挡）
        until_back_tripped: bool,
        start: Duration,
    },
    Push {
        start: Duration,
    },
    Deposit {
        start: Duration,
        reply: Option<ReplyTo>,
    },
}

impl Operation {
    fn kind(&self) -> ConveyorOperation {
        match self {
            Operation::Idle => ConveyorOperation::Idle,
            Operation::RunBack => ConveyorOperation::RunBack,
            Operation::Convey { .. } => ConveyorOperation::Convey,
            Operation::Shift { .. } => ConveyorOperation::Shift,
            Operation::Push { .. } => ConveyorOperation::Push,
            Operation::Deposit { .. } => ConveyorOperation::Deposit,
        }
    }

    fn take_reply(&mut self) -> Option<ReplyTo> {
        match self {
            Operation::Convey { reply, .. } | Operation::Deposit { reply, .. } => reply.take(),
            _ => None,
        }
    }
}

/// 传送带控制器
pub struct Conveyor {
    motor: Motor,
    sensors: Box<dyn LimitSensor>,
    config: ConveyorConfig,
    operation: Operation,
    back_stop: bool,
    wait_front: Option<ReplyTo>,
    wait_back: Option<ReplyTo>,
}

impl Conveyor {
    pub fn new(hardware: ConveyorHardware, config: ConveyorConfig) -> Self {
        Self {
            motor: hardware.motor,
            sensors: hardware.sensors,
            config,
            operation: Operation::Idle,
            back_stop: false,
            wait_front: None,
            wait_back: None,
        }
    }

    fn tripped(&self, side: Side) -> bool {
        self.sensors.is_tripped(side)
    }

    fn finish(&mut self, response: Response) {
        let mut operation = std::mem::replace(&mut self.operation, Operation::Idle);
        if !matches!(operation, Operation::Idle) {
            debug!("conveyor: {:?} finished: {:?}", operation.kind(), response.outcome);
        }
        respond(operation.take_reply(), response);
    }

    fn cancel(&mut self, reason: FailureReason) {
        if !matches!(self.operation, Operation::Idle) {
            self.finish(Response::error(Subsystem::Conveyor, reason));
        }
    }

    fn begin(&mut self, operation: Operation) {
        self.cancel(FailureReason::Preempted);
        self.operation = operation;
    }

    fn cancel_waits(&mut self, reason: FailureReason) {
        let error = Response::error(Subsystem::Conveyor, reason);
        respond(self.wait_front.take(), error);
        respond(self.wait_back.take(), error);
    }

    /// 后送（后挡逻辑）
    ///
    /// Back 畅通：后送并武装后挡；Back 遮挡且后挡已武装：停住；否则继续后送。
    fn run_back(&mut self) {
        if !self.tripped(Side::Back) {
            self.motor.set(self.config.run_back_speed);
            self.back_stop = true;
        } else if self.back_stop {
            self.motor.stop();
        } else {
            self.motor.set(self.config.run_back_speed);
        }
    }

    fn convey(&mut self, until: Side, speed: f64, timeout: f64, reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        self.begin(Operation::Convey {
            until,
            speed,
            timeout,
            start: ctx.now,
            reply: reply.take(),
        });
        self.motor.set(speed);
    }

    /// 光束等待：光电第一次读到畅通时应答
    fn resolve_waits(&mut self) {
        if self.wait_front.is_some() && !self.tripped(Side::Front) {
            respond(self.wait_front.take(), Response::ok(Subsystem::Conveyor));
        }
        if self.wait_back.is_some() && !self.tripped(Side::Back) {
            respond(self.wait_back.take(), Response::ok(Subsystem::Conveyor));
        }
    }

    fn step_operation(&mut self, ctx: &TickContext) {
        let ok = Response::ok(Subsystem::Conveyor);
        match self.operation {
            Operation::Idle => {},
            Operation::RunBack => self.run_back(),
            _ if !ctx.is_autonomous() => {
                self.motor.stop();
                self.finish(Response::error(Subsystem::Conveyor, FailureReason::ModeChanged));
            },
            Operation::Convey {
                until,
                speed,
                timeout,
                start,
                ..
            } => {
                if self.tripped(until) {
                    self.motor.stop();
                    self.finish(ok);
                } else if ctx.elapsed_since(start) > timeout {
                    self.motor.stop();
                    self.finish(Response::error(Subsystem::Conveyor, FailureReason::Timeout));
                } else {
                    self.motor.set(speed);
                }
            },
            Operation::Shift {
                speed,
                until_back_tripped,
                start,
            } => {
                if self.tripped(Side::Back) == until_back_tripped
                    || ctx.elapsed_since(start) >= self.config.shift_time_cap
                {
                    self.motor.stop();
                    self.finish(ok);
                } else {
                    self.motor.set(speed);
                }
            },
            Operation::Push { start } => {
                if ctx.elapsed_since(start) >= self.config.push_time {
                    self.motor.stop();
                    self.finish(ok);
                } else {
                    self.motor.set(self.config.shift_speed);
                }
            },
            Operation::Deposit { start, .. } => {
                if !self.tripped(Side::Front) && !self.tripped(Side::Back) {
                    self.motor.stop();
                    self.finish(ok);
                } else if ctx.elapsed_since(start) > self.config.deposit_timeout {
                    self.motor.stop();
                    self.finish(Response::error(Subsystem::Conveyor, FailureReason::Timeout));
                } else {
                    self.motor.set(self.config.deposit_speed);
                }
            },
        }
    }
}

impl Controller for Conveyor {
    type Command = ConveyorCommand;
    type Status = ConveyorStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Conveyor;

    fn handle(&mut self, command: ConveyorCommand, reply: &mut Option<ReplyTo>, ctx: &TickContext) {
        let load = self.config.load_speed;
        let shift = self.config.shift_speed;
        match command {
            ConveyorCommand::RunFwd => {
                self.cancel(FailureReason::Preempted);
                self.motor.set(self.config.run_fwd_speed);
            },
            ConveyorCommand::RunBck => {
                self.begin(Operation::RunBack);
                self.run_back();
            },
            ConveyorCommand::SetBack => {
                self.cancel(FailureReason::Preempted);
                self.motor.set(self.config.run_back_speed);
            },
            ConveyorCommand::Stop => {
                self.cancel(FailureReason::Preempted);
                self.motor.stop();
                self.back_stop = false;
            },
            ConveyorCommand::SeekToteFront { timeout } => {
                self.convey(Side::Front, load, timeout, reply, ctx)
            },
            ConveyorCommand::SeekToteBack { timeout } => {
                self.convey(Side::Back, -load, timeout, reply, ctx)
            },
            ConveyorCommand::FrontLoadTote { timeout } => {
                self.convey(Side::Back, load, timeout, reply, ctx)
            },
            ConveyorCommand::BackLoadTote { timeout } => {
                self.convey(Side::Front, -load, timeout, reply, ctx)
            },
            ConveyorCommand::ShiftTotesFwd => self.begin(Operation::Shift {
                speed: -shift,
                until_back_tripped: false,
                start: ctx.now,
            }),
            ConveyorCommand::ShiftTotesBck => self.begin(Operation::Shift {
                speed: shift,
                until_back_tripped: true,
                start: ctx.now,
            }),
            ConveyorCommand::PushTotesBck => self.begin(Operation::Push { start: ctx.now }),
            ConveyorCommand::DepositTotesBck => self.begin(Operation::Deposit {
                start: ctx.now,
                reply: reply.take(),
            }),
            // 同一光电的新等待替换旧等待
            ConveyorCommand::WaitFrontBeam => {
                let previous = std::mem::replace(&mut self.wait_front, reply.take());
                respond(previous, Response::error(Subsystem::Conveyor, FailureReason::Preempted));
            },
            ConveyorCommand::WaitBackBeam => {
                let previous = std::mem::replace(&mut self.wait_back, reply.take());
                respond(previous, Response::error(Subsystem::Conveyor, FailureReason::Preempted));
            },
        }
        self.resolve_waits();
    }

    fn on_mode_change(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::ModeChanged);
        self.cancel_waits(FailureReason::ModeChanged);
        self.back_stop = false;
        self.motor.stop();
    }

    fn tick(&mut self, ctx: &TickContext) {
        self.step_operation(ctx);
        self.resolve_waits();
    }

    fn is_active(&self) -> bool {
        !matches!(self.operation, Operation::Idle)
            || self.wait_front.is_some()
            || self.wait_back.is_some()
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.cancel(FailureReason::SafetyTrip);
        self.cancel_waits(FailureReason::SafetyTrip);
        self.back_stop = false;
        self.motor.stop();
    }

    fn status(&self) -> ConveyorStatus {
        ConveyorStatus {
            output: self.motor.output(),
            front_clear: !self.tripped(Side::Front),
            back_clear: !self.tripped(Side::Back),
            back_stop_armed: self.back_stop,
            operation: self.operation.kind(),
            waiting_front: self.wait_front.is_some(),
            waiting_back: self.wait_back.is_some(),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        sink.publish("Front Beam Clear", (!self.tripped(Side::Front)).into());
        sink.publish("Back Beam Clear", (!self.tripped(Side::Back)).into());
        sink.publish("Back Stop Enabled", self.back_stop.into());
    }
}
