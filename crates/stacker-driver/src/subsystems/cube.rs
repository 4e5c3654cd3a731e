//! 料箱拨片（Cube）
//!
//! 两个执行器：拨片电机（clicker，把料箱一层层"咔哒"顶起）和入料滚轮（intake）。
//!
//! 自动循环是一个固定周期推进的状态机（默认 20ms 一步，限制总线流量）：
//!
//! ```text
//! Top ──(入料遮挡 / 准备取走)──> GateDelay ──0.25s──> Lower ──底部触发──> Bottom
//!  │                                                                       │
//!  └─(首个料箱)─> FirstToteDelay ──入料畅通──> Top          准备取走? ──────┤
//!                                                           │             │
//!                                   BottomHold <────────────┘             v
//!                                       │ 入料畅通                        Raise ──顶部触发──> Top
//!                                       v                                  ^
//!                                DelayAfterCycle ──1.5s────────────────────┘
//! ```
//!
//! 自动循环启用时手动命令被拒绝；暂停/恢复与保持只在自动循环启用时生效。

use crate::output::Motor;
use crate::telemetry::Throttle;
use crate::worker::{Controller, TickContext, respond};
use stacker_hal::{LimitSensor, Side, TelemetrySink};
use stacker_protocol::{CubeCommand, FailureReason, ReplyTo, Response, RobotMode, Subsystem};
use stacker_tools::CubeConfig;
use std::time::Duration;
use tracing::{debug, info};

/// 拨片硬件
pub struct CubeHardware {
    pub clicker: Motor,
    pub intake: Motor,
    /// 读取 [`Side::Top`] / [`Side::Bottom`]（拨片霍尔）、
    /// [`Side::Intake`]（入料光电）、[`Side::StackTop`]（堆顶料箱）
    pub sensors: Box<dyn LimitSensor>,
}

/// 自动循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickerState {
    #[default]
    Top,
    FirstToteDelay,
    GateDelay,
    Lower,
    Bottom,
    BottomHold,
    DelayAfterCycle,
    Raise,
}

/// 拨片状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CubeStatus {
    pub state: ClickerState,
    pub auto_cycle: bool,
    pub paused: bool,
    pub prepare_to_remove: bool,
    pub first_tote: bool,
    pub clicker: f64,
    pub intake: f64,
}

/// 拨片控制器
pub struct Cube {
    clicker: Motor,
    intake: Motor,
    sensors: Box<dyn LimitSensor>,
    config: CubeConfig,
    state: ClickerState,
    auto_cycle: bool,
    paused: bool,
    paused_output: f64,
    prepare_to_remove: bool,
    first_tote: bool,
    gate_start: Duration,
    inter_cycle_start: Duration,
    cycle: Throttle,
}

impl Cube {
    pub fn new(hardware: CubeHardware, config: CubeConfig) -> Self {
        let cycle = Throttle::new(Duration::from_secs_f64(config.cycle_period));
        Self {
            clicker: hardware.clicker,
            intake: hardware.intake,
            sensors: hardware.sensors,
            config,
            state: ClickerState::Top,
            auto_cycle: false,
            paused: false,
            paused_output: 0.0,
            prepare_to_remove: false,
            first_tote: true,
            gate_start: Duration::ZERO,
            inter_cycle_start: Duration::ZERO,
            cycle,
        }
    }

    pub fn state(&self) -> ClickerState {
        self.state
    }

    fn intake_blocked(&self) -> bool {
        self.sensors.is_tripped(Side::Intake)
    }

    fn enter(&mut self, state: ClickerState) {
        if state != self.state {
            debug!("cube: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn start_cycle(&mut self) {
        self.auto_cycle = true;
        self.paused = false;
        self.paused_output = 0.0;
        self.enter(ClickerState::Raise);
        self.intake.set(self.config.intake_run);
    }

    /// 状态机前进一步
    pub(crate) fn step(&mut self, ctx: &TickContext) {
        match self.state {
            ClickerState::Top => {
                if self.sensors.is_tripped(Side::StackTop) && self.intake_blocked() {
                    self.prepare_to_remove = true;
                }
                if self.intake_blocked() || self.prepare_to_remove {
                    if self.first_tote {
                        self.clicker.set(self.config.clicker_top_hold);
                        self.enter(ClickerState::FirstToteDelay);
                    } else {
                        self.gate_start = ctx.now;
                        self.clicker.set(self.config.clicker_lower);
                        self.enter(ClickerState::GateDelay);
                    }
                } else {
                    self.clicker.set(self.config.clicker_top_hold);
                }
            },
            ClickerState::FirstToteDelay => {
                if !self.intake_blocked() {
                    self.first_tote = false;
                    self.enter(ClickerState::Top);
                }
            },
            ClickerState::GateDelay => {
                if ctx.elapsed_since(self.gate_start) > self.config.gate_delay {
                    self.enter(ClickerState::Lower);
                }
            },
            ClickerState::Lower => {
                if self.sensors.is_tripped(Side::Bottom) {
                    self.clicker.stop();
                    self.enter(ClickerState::Bottom);
                } else {
                    self.clicker.set(self.config.clicker_lower);
                }
            },
            ClickerState::Bottom => {
                if self.prepare_to_remove {
                    self.enter(ClickerState::BottomHold);
                } else {
                    self.clicker.set(self.config.clicker_raise);
                    self.enter(ClickerState::Raise);
                }
            },
            ClickerState::BottomHold => {
                if !self.intake_blocked() {
                    // 整堆取走：下一轮从首个料箱重新开始
                    self.first_tote = true;
                    self.prepare_to_remove = false;
                    self.inter_cycle_start = ctx.now;
                    self.enter(ClickerState::DelayAfterCycle);
                } else {
                    self.clicker.set(self.config.clicker_lower);
                }
            },
            ClickerState::DelayAfterCycle => {
                if ctx.elapsed_since(self.inter_cycle_start) > self.config.delay_after_cycle {
                    self.clicker.set(self.config.clicker_raise);
                    self.enter(ClickerState::Raise);
                }
            },
            ClickerState::Raise => {
                if self.sensors.is_tripped(Side::Top) {
                    self.clicker.stop();
                    self.enter(ClickerState::Top);
                } else {
                    self.clicker.set(self.config.clicker_raise);
                }
            },
        }
    }
}

impl Controller for Cube {
    type Command = CubeCommand;
    type Status = CubeStatus;
    const SUBSYSTEM: Subsystem = Subsystem::Cube;

    fn handle(&mut self, command: CubeCommand, reply: &mut Option<ReplyTo>, _ctx: &TickContext) {
        let manual = matches!(
            command,
            CubeCommand::ClickerRaise
                | CubeCommand::ClickerLower
                | CubeCommand::ClickerStop
                | CubeCommand::IntakeRun
                | CubeCommand::IntakeStop
                | CubeCommand::Stop
                | CubeCommand::AutoCycleStart
        );
        if manual && self.auto_cycle {
            debug!("cube: {:?} rejected while auto-cycling", command);
            respond(
                reply.take(),
                Response::error(Subsystem::Cube, FailureReason::Rejected),
            );
            return;
        }

        match command {
            CubeCommand::ClickerRaise => self.clicker.set(self.config.clicker_raise),
            CubeCommand::ClickerLower => self.clicker.set(self.config.clicker_lower),
            CubeCommand::ClickerStop => self.clicker.stop(),
            CubeCommand::IntakeRun => self.intake.set(self.config.intake_run),
            CubeCommand::IntakeStop => self.intake.stop(),
            CubeCommand::Stop => {
                self.clicker.stop();
                self.paused_output = 0.0;
            },
            CubeCommand::AutoCycleStart => {
                info!("cube: auto-cycle started");
                self.start_cycle();
            },
            CubeCommand::AutoCycleStop => {
                if self.auto_cycle {
                    info!("cube: auto-cycle stopped");
                    self.auto_cycle = false;
                    self.paused = false;
                    self.clicker.stop();
                }
            },
            CubeCommand::AutoCyclePause => {
                if self.auto_cycle && !self.paused {
                    self.paused = true;
                    self.paused_output = self.clicker.output();
                    self.clicker.stop();
                }
            },
            CubeCommand::AutoCycleResume => {
                if self.auto_cycle && self.paused {
                    self.paused = false;
                    self.clicker.set(self.paused_output);
                    self.intake.set(self.config.intake_run);
                }
            },
            CubeCommand::AutoCycleHold => {
                if self.auto_cycle {
                    self.prepare_to_remove = true;
                }
            },
            CubeCommand::AutoCycleRelease => {
                if self.auto_cycle {
                    self.prepare_to_remove = false;
                }
            },
        }
    }

    fn on_mode_change(&mut self, ctx: &TickContext) {
        self.clicker.stop();
        self.intake.stop();
        self.auto_cycle = false;
        self.paused = false;
        self.paused_output = 0.0;
        self.prepare_to_remove = false;

        // 手动阶段拨片始终自动循环
        if ctx.mode == RobotMode::Teleoperated {
            self.start_cycle();
        }
    }

    fn tick(&mut self, ctx: &TickContext) {
        if self.auto_cycle && !self.paused && self.cycle.ready(ctx.now) {
            self.step(ctx);
        }
    }

    fn is_active(&self) -> bool {
        self.auto_cycle && !self.paused
    }

    fn keeps_alive(&self) -> bool {
        self.is_active()
    }

    fn fail_safe(&mut self, _ctx: &TickContext) {
        self.auto_cycle = false;
        self.paused = false;
        self.clicker.stop();
        self.intake.stop();
    }

    fn status(&self) -> CubeStatus {
        CubeStatus {
            state: self.state,
            auto_cycle: self.auto_cycle,
            paused: self.paused,
            prepare_to_remove: self.prepare_to_remove,
            first_tote: self.first_tote,
            clicker: self.clicker.output(),
            intake: self.intake.output(),
        }
    }

    fn publish(&self, sink: &dyn TelemetrySink) {
        sink.publish("Stack Top Blocked", self.sensors.is_tripped(Side::StackTop).into());
        sink.publish("Intake Blocked", self.intake_blocked().into());
        sink.publish("Clicker At Top", self.sensors.is_tripped(Side::Top).into());
        sink.publish("Clicker At Bottom", self.sensors.is_tripped(Side::Bottom).into());
        sink.publish("Cube Autocycle", self.auto_cycle.into());
    }
}
