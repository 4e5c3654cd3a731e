//! Robot：持有全部 Worker 线程
//!
//! 由 [`RobotBuilder`](crate::RobotBuilder) 装配。`Robot` 被丢弃时先广播
//! `Disabled`，再逐个停止 Worker 线程（每个 Worker 退出前把输出归零）。

use crate::error::DriverError;
use crate::metrics::MetricsSnapshot;
use crate::station::CommandStation;
use crate::subsystems::{
    CanArm, CanArmStatus, Claw, ClawStatus, Conveyor, ConveyorStatus, Cube, CubeStatus,
    Drivetrain, DrivetrainStatus, Fan, FanStatus, Lifter, LifterStatus,
};
use crate::worker::{Worker, WorkerStatus};
use stacker_hal::ModeSource;
use stacker_protocol::{AtomicRobotMode, AutonomousCommand, RobotMode, Subsystem};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// 机器人实例
pub struct Robot {
    pub(crate) drivetrain: Option<Worker<Drivetrain>>,
    pub(crate) conveyor: Option<Worker<Conveyor>>,
    pub(crate) lifter: Option<Worker<Lifter>>,
    pub(crate) claw: Option<Worker<Claw>>,
    pub(crate) canarm: Option<Worker<CanArm>>,
    pub(crate) cube: Option<Worker<Cube>>,
    pub(crate) fan: Option<Worker<Fan>>,
    pub(crate) station: CommandStation,
    /// 最近一次广播的模式
    pub(crate) mode: AtomicRobotMode,
}

macro_rules! status_accessor {
    ($(#[$doc:meta])* $name:ident, $status:ty) => {
        $(#[$doc])*
        pub fn $name(&self) -> Option<Arc<WorkerStatus<$status>>> {
            self.$name.as_ref().map(|w| w.status())
        }
    };
}

impl Robot {
    /// 命令路由（可克隆后交给解释器线程）
    pub fn station(&self) -> &CommandStation {
        &self.station
    }

    /// 最近一次广播的模式
    pub fn mode(&self) -> RobotMode {
        self.mode.get(Ordering::Acquire)
    }

    /// 向所有 Worker 广播模式
    ///
    /// # 错误
    ///
    /// 任一邮箱投递失败时返回第一个错误（其余 Worker 仍会收到）。
    pub fn broadcast_mode(&self, mode: RobotMode) -> Result<(), DriverError> {
        let previous = self.mode.swap(mode, Ordering::AcqRel);
        if previous != mode {
            info!("robot mode {} -> {}", previous, mode);
        }
        self.station.broadcast_mode(mode)
    }

    /// 轮询模式源，只在模式变化时广播
    ///
    /// 返回 `Some(新模式)` 表示发生了广播。
    ///
    /// # 错误
    ///
    /// 同 [`Robot::broadcast_mode`]。
    pub fn poll_mode(&self, source: &dyn ModeSource) -> Result<Option<RobotMode>, DriverError> {
        let mode = source.current_mode();
        if mode == self.mode() {
            return Ok(None);
        }
        self.broadcast_mode(mode)?;
        Ok(Some(mode))
    }

    /// 广播自动阶段生命周期命令
    ///
    /// # 错误
    ///
    /// 同 [`CommandStation::broadcast_autonomous`]。
    pub fn broadcast_autonomous(&self, command: AutonomousCommand) -> Result<(), DriverError> {
        self.station.broadcast_autonomous(command)
    }

    status_accessor!(drivetrain, DrivetrainStatus);
    status_accessor!(
        /// 传送带状态（前后光电、后挡、进行中的操作）
        conveyor,
        ConveyorStatus
    );
    status_accessor!(lifter, LifterStatus);
    status_accessor!(claw, ClawStatus);
    status_accessor!(canarm, CanArmStatus);
    status_accessor!(cube, CubeStatus);
    status_accessor!(fan, FanStatus);

    /// 各 Worker 的指标快照
    pub fn metrics(&self) -> Vec<(Subsystem, MetricsSnapshot)> {
        let mut out = Vec::with_capacity(Subsystem::ALL.len());
        if let Some(w) = &self.drivetrain {
            out.push((Subsystem::Drivetrain, w.metrics()));
        }
        if let Some(w) = &self.conveyor {
            out.push((Subsystem::Conveyor, w.metrics()));
        }
        if let Some(w) = &self.lifter {
            out.push((Subsystem::Lifter, w.metrics()));
        }
        if let Some(w) = &self.claw {
            out.push((Subsystem::Claw, w.metrics()));
        }
        if let Some(w) = &self.canarm {
            out.push((Subsystem::CanArm, w.metrics()));
        }
        if let Some(w) = &self.cube {
            out.push((Subsystem::Cube, w.metrics()));
        }
        if let Some(w) = &self.fan {
            out.push((Subsystem::Fan, w.metrics()));
        }
        out
    }

    /// 距离某个 Worker 上次收到消息的时间
    pub fn time_since_last_message(&self, subsystem: Subsystem) -> Option<Duration> {
        match subsystem {
            Subsystem::Drivetrain => self.drivetrain.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::Conveyor => self.conveyor.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::Lifter => self.lifter.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::Claw => self.claw.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::CanArm => self.canarm.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::Cube => self.cube.as_ref().map(|w| w.time_since_last_message()),
            Subsystem::Fan => self.fan.as_ref().map(|w| w.time_since_last_message()),
        }
    }

    /// 所有已装配的 Worker 线程都在运行
    pub fn is_running(&self) -> bool {
        self.drivetrain.as_ref().is_none_or(|w| w.is_running())
            && self.conveyor.as_ref().is_none_or(|w| w.is_running())
            && self.lifter.as_ref().is_none_or(|w| w.is_running())
            && self.claw.as_ref().is_none_or(|w| w.is_running())
            && self.canarm.as_ref().is_none_or(|w| w.is_running())
            && self.cube.as_ref().is_none_or(|w| w.is_running())
            && self.fan.as_ref().is_none_or(|w| w.is_running())
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if let Err(e) = self.station.broadcast_mode(RobotMode::Disabled) {
            warn!("failed to disable workers on shutdown: {}", e);
        }
        // Worker 各自的 Drop 负责停止线程
        info!("robot shutting down");
    }
}
