//! # Stacker Tools - 共享配置
//!
//! **依赖原则**: 纯数据结构，不依赖驱动层或硬件层
//!
//! ## 包含模块
//!
//! - `config` - 机器人参数（增益、速度、超时），支持 TOML 读写

pub mod config;

pub use config::{
    AutonomousConfig, CanArmConfig, ClawConfig, ConfigError, ConveyorConfig, CubeConfig,
    DrivetrainConfig, FanConfig, LifterConfig, RobotConfig, WorkerConfig,
};
