//! 安全窗口集成测试

mod common;

use common::core;
use stacker_driver::subsystems::{Conveyor, ConveyorHardware, Cube, CubeHardware, Fan};
use stacker_driver::{Envelope, Motor};
use stacker_hal::Actuator;
use stacker_hal::mock::{ManualClock, SimMotor, SimSensors};
use stacker_protocol::{ConveyorCommand, FanCommand, RobotMode};
use stacker_tools::{ConveyorConfig, CubeConfig, FanConfig};
use std::time::Duration;

#[test]
fn test_silence_past_window_zeroes_outputs() {
    let clock = ManualClock::new();
    let motor = SimMotor::new("conveyor");
    let conveyor = Conveyor::new(
        ConveyorHardware {
            motor: Motor::new("conveyor", Box::new(motor.clone())),
            sensors: Box::new(SimSensors::new()),
        },
        ConveyorConfig::default(),
    );
    let mut core = core(conveyor, &clock);
    core.dispatch(Envelope::Mode(RobotMode::Teleoperated));
    core.dispatch(Envelope::command(ConveyorCommand::RunFwd));
    assert_ne!(motor.output(), 0.0);

    clock.advance(Duration::from_secs(29));
    core.tick();
    assert_ne!(motor.output(), 0.0, "still inside the window");
    assert!(!core.is_safety_tripped());

    clock.advance(Duration::from_secs(2));
    core.tick();
    assert_eq!(motor.output(), 0.0);
    assert!(core.is_safety_tripped());
    assert!(core.status().safety_tripped);
    assert_eq!(core.metrics().snapshot().safety_trips, 1);

    // 只触发一次
    clock.advance(Duration::from_secs(5));
    core.tick();
    assert_eq!(core.metrics().snapshot().safety_trips, 1);

    // 下一条消息恢复
    core.dispatch(Envelope::command(ConveyorCommand::RunFwd));
    assert!(!core.is_safety_tripped());
    assert_ne!(motor.output(), 0.0);
}

#[test]
fn test_fan_stops_on_silence() {
    let clock = ManualClock::new();
    let motor = SimMotor::new("fan");
    let mut core = core(
        Fan::new(Motor::new("fan", Box::new(motor.clone())), FanConfig::default()),
        &clock,
    );
    core.dispatch(Envelope::Mode(RobotMode::Teleoperated));
    core.dispatch(Envelope::command(FanCommand::Start));
    assert_eq!(motor.output(), 1.0);

    clock.advance(Duration::from_secs(31));
    core.tick();
    assert_eq!(motor.output(), 0.0);
}

#[test]
fn test_auto_cycle_keeps_window_alive() {
    let clock = ManualClock::new();
    let intake = SimMotor::new("intake");
    let cube = Cube::new(
        CubeHardware {
            clicker: Motor::new("clicker", Box::new(SimMotor::new("clicker"))),
            intake: Motor::new("intake", Box::new(intake.clone())),
            sensors: Box::new(SimSensors::new()),
        },
        CubeConfig::default(),
    );
    let mut core = core(cube, &clock);
    // 手动阶段自动开启循环
    core.dispatch(Envelope::Mode(RobotMode::Teleoperated));
    assert!(core.is_active());

    for _ in 0..40 {
        clock.advance(Duration::from_secs(1));
        core.tick();
    }
    assert!(!core.is_safety_tripped());
    assert_eq!(intake.output(), -0.5);
}
