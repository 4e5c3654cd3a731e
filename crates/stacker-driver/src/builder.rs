//! Builder 模式实现
//!
//! 提供链式装配 [`Robot`] 的便捷方式。未装配的子系统不会启动 Worker，
//! 发往它的命令返回 [`DriverError::SubsystemUnavailable`]。

use crate::error::DriverError;
use crate::output::Motor;
use crate::robot::Robot;
use crate::station::CommandStation;
use crate::subsystems::{
    CanArm, Claw, Conveyor, ConveyorHardware, Cube, CubeHardware, Drivetrain, DrivetrainHardware,
    Fan, Lifter, LifterHardware,
};
use crate::telemetry::TelemetryHub;
use crate::worker::{Controller, Worker, WorkerCore};
use stacker_hal::{Clock, SystemClock, TelemetrySink};
use stacker_protocol::{AtomicRobotMode, RobotMode};
use stacker_tools::{RobotConfig, WorkerConfig};
use std::sync::Arc;
use tracing::info;

/// Robot Builder（链式装配）
///
/// # Example
///
/// ```rust
/// use stacker_driver::{Motor, RobotBuilder};
/// use stacker_hal::mock::SimMotor;
///
/// let fan = SimMotor::new("fan");
/// let robot = RobotBuilder::new()
///     .fan(Motor::new("fan", Box::new(fan.clone())))
///     .build()
///     .unwrap();
/// assert_eq!(robot.station().subsystems().len(), 1);
/// ```
pub struct RobotBuilder {
    config: RobotConfig,
    clock: Arc<dyn Clock>,
    telemetry: TelemetryHub,
    drivetrain: Option<DrivetrainHardware>,
    conveyor: Option<ConveyorHardware>,
    lifter: Option<LifterHardware>,
    claw: Option<Motor>,
    canarm: Option<Motor>,
    cube: Option<CubeHardware>,
    fan: Option<Motor>,
}

impl Default for RobotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotBuilder {
    /// 创建新的 Builder（默认配置、系统时钟、无遥测）
    pub fn new() -> Self {
        Self {
            config: RobotConfig::default(),
            clock: Arc::new(SystemClock),
            telemetry: TelemetryHub::new(),
            drivetrain: None,
            conveyor: None,
            lifter: None,
            claw: None,
            canarm: None,
            cube: None,
            fan: None,
        }
    }

    /// 机器人参数
    pub fn config(mut self, config: RobotConfig) -> Self {
        self.config = config;
        self
    }

    /// 时钟（测试中换成手动时钟）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// 添加遥测 sink（可多次调用）
    pub fn telemetry_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry.add_sink(sink);
        self
    }

    pub fn drivetrain(mut self, hardware: DrivetrainHardware) -> Self {
        self.drivetrain = Some(hardware);
        self
    }

    pub fn conveyor(mut self, hardware: ConveyorHardware) -> Self {
        self.conveyor = Some(hardware);
        self
    }

    pub fn lifter(mut self, hardware: LifterHardware) -> Self {
        self.lifter = Some(hardware);
        self
    }

    pub fn claw(mut self, motor: Motor) -> Self {
        self.claw = Some(motor);
        self
    }

    pub fn canarm(mut self, motor: Motor) -> Self {
        self.canarm = Some(motor);
        self
    }

    pub fn cube(mut self, hardware: CubeHardware) -> Self {
        self.cube = Some(hardware);
        self
    }

    pub fn fan(mut self, motor: Motor) -> Self {
        self.fan = Some(motor);
        self
    }

    /// 启动所有已装配子系统的 Worker
    ///
    /// # 错误
    ///
    /// - [`DriverError::InvalidInput`]: 配置校验失败
    /// - [`DriverError::WorkerThread`]: 线程创建失败（已启动的 Worker 会被停止）
    pub fn build(self) -> Result<Robot, DriverError> {
        self.config
            .validate()
            .map_err(|e| DriverError::InvalidInput(e.to_string()))?;

        let Self {
            config,
            clock,
            telemetry,
            drivetrain,
            conveyor,
            lifter,
            claw,
            canarm,
            cube,
            fan,
        } = self;
        let telemetry: Arc<dyn TelemetrySink> = Arc::new(telemetry);
        let spawner = Spawner {
            clock,
            telemetry,
            config: &config.worker,
        };

        let drivetrain = drivetrain
            .map(|hw| spawner.spawn(Drivetrain::new(hw, config.drivetrain.clone())))
            .transpose()?;
        let conveyor = conveyor
            .map(|hw| spawner.spawn(Conveyor::new(hw, config.conveyor.clone())))
            .transpose()?;
        let lifter = lifter
            .map(|hw| spawner.spawn(Lifter::new(hw, config.lifter.clone())))
            .transpose()?;
        let claw = claw
            .map(|motor| spawner.spawn(Claw::new(motor, config.claw.clone())))
            .transpose()?;
        let canarm = canarm
            .map(|motor| spawner.spawn(CanArm::new(motor, config.canarm.clone())))
            .transpose()?;
        let cube = cube
            .map(|hw| spawner.spawn(Cube::new(hw, config.cube.clone())))
            .transpose()?;
        let fan = fan
            .map(|motor| spawner.spawn(Fan::new(motor, config.fan.clone())))
            .transpose()?;

        let station = CommandStation {
            drivetrain: drivetrain.as_ref().map(|w| w.mailbox().clone()),
            conveyor: conveyor.as_ref().map(|w| w.mailbox().clone()),
            lifter: lifter.as_ref().map(|w| w.mailbox().clone()),
            claw: claw.as_ref().map(|w| w.mailbox().clone()),
            canarm: canarm.as_ref().map(|w| w.mailbox().clone()),
            cube: cube.as_ref().map(|w| w.mailbox().clone()),
            fan: fan.as_ref().map(|w| w.mailbox().clone()),
        };
        info!("robot assembled with {:?}", station.subsystems());

        Ok(Robot {
            drivetrain,
            conveyor,
            lifter,
            claw,
            canarm,
            cube,
            fan,
            station,
            mode: AtomicRobotMode::new(RobotMode::Unknown),
        })
    }
}

struct Spawner<'a> {
    clock: Arc<dyn Clock>,
    telemetry: Arc<dyn TelemetrySink>,
    config: &'a WorkerConfig,
}

impl Spawner<'_> {
    fn spawn<C: Controller>(&self, controller: C) -> Result<Worker<C>, DriverError> {
        let core = WorkerCore::new(
            controller,
            self.clock.clone(),
            self.telemetry.clone(),
            self.config,
        );
        Worker::spawn(core, self.config)
    }
}
