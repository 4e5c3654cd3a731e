//! 门面导出：用 SDK 入口装配模拟机器人并运行一段脚本

use stacker_driver::sim::sim_robot;
use stacker_sdk::prelude::*;
use std::sync::Arc;

#[test]
fn test_prelude_runs_script_on_sim_robot() {
    stacker_sdk::init_logger(&[]);
    let (robot, _handles) = sim_robot(RobotConfig::default(), Arc::new(SystemClock)).unwrap();
    robot.broadcast_mode(RobotMode::Autonomous).unwrap();

    let runner = AutonomousRunner::new(robot.station().clone(), RobotConfig::default());
    let report = runner.run("CLAWOPEN\nSTRAIGHT 0.3 0.1\nEND\n", None).unwrap();

    assert_eq!(report.termination, Termination::Completed { line: 3 });
    assert_eq!(report.statements, 3);
    assert!(robot.is_running());
}

#[test]
fn test_init_logger_twice_is_harmless() {
    stacker_sdk::init_logger(&["stacker_sdk=debug"]);
    stacker_sdk::init_logger(&["not a directive ==="]);
}
