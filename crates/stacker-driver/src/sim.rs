//! 全模拟机器人
//!
//! 用 `stacker_hal::mock` 的模拟执行器装配出完整的七个子系统，
//! 同时返回所有硬件句柄，便于测试注入传感器状态、观察电机输出，
//! 以及让命令行工具在没有硬件的情况下试跑自动脚本。

use crate::builder::RobotBuilder;
use crate::error::DriverError;
use crate::output::Motor;
use crate::robot::Robot;
use crate::subsystems::{ConveyorHardware, CubeHardware, DrivetrainHardware, LifterHardware};
use stacker_hal::Clock;
use stacker_hal::mock::{RecordingTelemetry, SimGyro, SimMotor, SimSensors};
use stacker_tools::RobotConfig;
use std::sync::Arc;

/// 模拟陀螺仪满输出转速（度/秒）
pub const DEFAULT_TURN_RATE: f64 = 200.0;

/// 模拟硬件句柄
///
/// 所有句柄与装配进 [`Robot`] 的实例共享状态。
#[derive(Clone)]
pub struct SimHandles {
    pub left: SimMotor,
    pub right: SimMotor,
    pub gyro: SimGyro,
    pub drive_sensors: SimSensors,
    pub conveyor: SimMotor,
    pub conveyor_sensors: SimSensors,
    pub lifter: SimMotor,
    pub lifter_sensors: SimSensors,
    pub claw: SimMotor,
    pub canarm: SimMotor,
    pub clicker: SimMotor,
    pub intake: SimMotor,
    pub cube_sensors: SimSensors,
    pub fan: SimMotor,
    pub telemetry: Arc<RecordingTelemetry>,
}

impl SimHandles {
    fn new(clock: Arc<dyn Clock>) -> Self {
        let left = SimMotor::new("drive_left");
        let right = SimMotor::new("drive_right");
        let gyro = SimGyro::new(left.clone(), right.clone(), DEFAULT_TURN_RATE, clock);
        Self {
            left,
            right,
            gyro,
            drive_sensors: SimSensors::new(),
            conveyor: SimMotor::new("conveyor"),
            conveyor_sensors: SimSensors::new(),
            lifter: SimMotor::new("lifter"),
            lifter_sensors: SimSensors::new(),
            claw: SimMotor::new("claw"),
            canarm: SimMotor::new("canarm"),
            clicker: SimMotor::new("clicker"),
            intake: SimMotor::new("intake"),
            cube_sensors: SimSensors::new(),
            fan: SimMotor::new("fan"),
            telemetry: Arc::new(RecordingTelemetry::new()),
        }
    }

    /// 所有电机当前输出（名称，输出）
    pub fn outputs(&self) -> Vec<(&'static str, f64)> {
        use stacker_hal::Actuator;
        vec![
            ("drive_left", self.left.output()),
            ("drive_right", self.right.output()),
            ("conveyor", self.conveyor.output()),
            ("lifter", self.lifter.output()),
            ("claw", self.claw.output()),
            ("canarm", self.canarm.output()),
            ("clicker", self.clicker.output()),
            ("intake", self.intake.output()),
            ("fan", self.fan.output()),
        ]
    }
}

/// 装配全模拟机器人
///
/// # 错误
///
/// 同 [`RobotBuilder::build`]。
///
/// # 示例
///
/// 需要启用 `mock` feature。
///
/// ```rust,ignore
/// use stacker_driver::sim::sim_robot;
/// use stacker_hal::SystemClock;
/// use stacker_tools::RobotConfig;
/// use std::sync::Arc;
///
/// let (robot, handles) = sim_robot(RobotConfig::default(), Arc::new(SystemClock)).unwrap();
/// assert_eq!(robot.station().subsystems().len(), 7);
/// assert!(handles.outputs().iter().all(|(_, v)| *v == 0.0));
/// ```
pub fn sim_robot(
    config: RobotConfig,
    clock: Arc<dyn Clock>,
) -> Result<(Robot, SimHandles), DriverError> {
    let handles = SimHandles::new(clock.clone());
    let h = handles.clone();

    let robot = RobotBuilder::new()
        .config(config)
        .clock(clock)
        .telemetry_sink(h.telemetry.clone())
        .drivetrain(DrivetrainHardware {
            left: Motor::new("drive_left", Box::new(h.left)),
            right: Motor::new("drive_right", Box::new(h.right)),
            gyro: Box::new(h.gyro),
            sensors: Box::new(h.drive_sensors),
        })
        .conveyor(ConveyorHardware {
            motor: Motor::new("conveyor", Box::new(h.conveyor)),
            sensors: Box::new(h.conveyor_sensors),
        })
        .lifter(LifterHardware {
            motor: Motor::new("lifter", Box::new(h.lifter)),
            sensors: Box::new(h.lifter_sensors),
        })
        .claw(Motor::new("claw", Box::new(h.claw)))
        .canarm(Motor::new("canarm", Box::new(h.canarm)))
        .cube(CubeHardware {
            clicker: Motor::new("clicker", Box::new(h.clicker)),
            intake: Motor::new("intake", Box::new(h.intake)),
            sensors: Box::new(h.cube_sensors),
        })
        .fan(Motor::new("fan", Box::new(h.fan)))
        .build()?;

    Ok((robot, handles))
}
