//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use stacker_sdk::prelude::*;
//! ```

// 协议层
pub use stacker_protocol::{
    AutonomousCommand, CanArmCommand, ClawCommand, Command, ConveyorCommand, CubeCommand,
    DrivetrainCommand, FailureReason, FanCommand, LifterCommand, Message, Outcome, ReplyTo,
    Response, RobotMode, Subsystem,
};

// 硬件能力接口
pub use stacker_hal::{Actuator, Clock, HeadingSensor, LimitSensor, ModeSource, Side, SystemClock};

// 配置
pub use stacker_tools::RobotConfig;

// 驱动层
pub use stacker_driver::{
    CommandStation, DriverLoop, InputSource, Motor, OperatorInput, Robot, RobotBuilder,
    TeleopMapper,
};

// 自动脚本
pub use stacker_auto::{AutonomousRunner, Flow, Interpreter, PauseGate, RunReport, Termination};

// 错误类型
pub use stacker_auto::AutoError;
pub use stacker_driver::DriverError;
pub use stacker_tools::ConfigError;
