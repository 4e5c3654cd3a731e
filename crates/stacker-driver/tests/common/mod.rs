//! 集成测试共享工具
//!
//! `sim` 模块只在 `mock` feature 下编译，这里直接用 `stacker_hal::mock`
//! 装配被测对象。

#![allow(dead_code)]

use stacker_driver::subsystems::{ConveyorHardware, CubeHardware, DrivetrainHardware, LifterHardware};
use stacker_driver::{Controller, Envelope, Motor, Robot, RobotBuilder, WorkerCore};
use stacker_hal::mock::{ManualClock, SimGyro, SimMotor, SimSensors};
use stacker_hal::{Clock, NullTelemetry};
use stacker_protocol::{ReplyTo, Response};
use stacker_tools::{RobotConfig, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;

/// 用手动时钟同步驱动的 Worker 核心
pub fn core<C: Controller>(controller: C, clock: &ManualClock) -> WorkerCore<C> {
    WorkerCore::new(
        controller,
        Arc::new(clock.clone()),
        Arc::new(NullTelemetry),
        &WorkerConfig::default(),
    )
}

/// 投递一条带应答目的地的命令，返回应答接收端
pub fn dispatch_with_reply<C: Controller>(
    core: &mut WorkerCore<C>,
    command: C::Command,
) -> crossbeam_channel::Receiver<Response> {
    let (reply, rx) = ReplyTo::channel();
    core.dispatch(Envelope::Command {
        command,
        reply: Some(reply),
    });
    rx
}

/// 按 `step` 推进时钟并执行节拍，直到收到应答或超过 `limit`
///
/// 返回应答与所用的模拟时间。
pub fn tick_until_reply<C: Controller>(
    core: &mut WorkerCore<C>,
    clock: &ManualClock,
    rx: &crossbeam_channel::Receiver<Response>,
    step: Duration,
    limit: Duration,
) -> Option<(Response, Duration)> {
    let start = clock.now();
    while clock.now() - start <= limit {
        if let Ok(response) = rx.try_recv() {
            return Some((response, clock.now() - start));
        }
        clock.advance(step);
        core.tick();
    }
    rx.try_recv().ok().map(|r| (r, clock.now() - start))
}

/// 整机模拟硬件句柄
#[derive(Clone)]
pub struct Handles {
    pub left: SimMotor,
    pub right: SimMotor,
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
}

impl Handles {
    pub fn all_motors(&self) -> Vec<&SimMotor> {
        vec![
            &self.left,
            &self.right,
            &self.conveyor,
            &self.lifter,
            &self.claw,
            &self.canarm,
            &self.clicker,
            &self.intake,
            &self.fan,
        ]
    }
}

/// 装配全部七个子系统的机器人（实时线程、系统时钟或指定时钟）
pub fn full_robot(config: RobotConfig, clock: Arc<dyn Clock>) -> (Robot, Handles) {
    let handles = Handles {
        left: SimMotor::new("left"),
        right: SimMotor::new("right"),
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
    };
    let h = handles.clone();
    let gyro = SimGyro::new(h.left.clone(), h.right.clone(), 200.0, clock.clone());

    let robot = RobotBuilder::new()
        .config(config)
        .clock(clock)
        .drivetrain(DrivetrainHardware {
            left: Motor::new("left", Box::new(h.left)),
            right: Motor::new("right", Box::new(h.right)),
            gyro: Box::new(gyro),
            sensors: Box::new(SimSensors::new()),
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
        .build()
        .expect("robot should assemble");

    (robot, handles)
}

/// 轮询条件直到满足或超时（真实时间）
pub fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
