//! 驱动层
//!
//! 本 crate 提供搬箱机器人的并发执行框架，包括：
//! - 每个子系统一个 Worker 线程，独占硬件，通过有界邮箱串行处理命令
//! - 消息看门狗（超过安全窗口无消息则停转）
//! - 七个子系统的状态机（底盘、传送带、升降机、夹取器、罐臂、方块、风扇）
//! - 命令路由（投递即返回 / 投递并等待应答）
//! - 手动驾驶映射与固定周期驾驶循环
//!
//! # 使用场景
//!
//! 自动脚本解释器与手动驾驶循环都只通过 [`CommandStation`] 与子系统交互；
//! 硬件由 [`RobotBuilder`] 装配，测试中可用 `sim` 模块整机模拟。

mod builder;
mod error;
pub mod mailbox;
pub mod metrics;
pub mod output;
mod robot;
#[cfg(any(test, feature = "mock"))]
pub mod sim;
mod station;
pub mod subsystems;
pub mod telemetry;
pub mod teleop;
pub mod watchdog;
pub mod worker;

pub use builder::RobotBuilder;
pub use error::DriverError;
pub use mailbox::{Envelope, Mailbox};
pub use metrics::{MetricsSnapshot, WorkerMetrics};
pub use output::Motor;
pub use robot::Robot;
pub use station::CommandStation;
pub use subsystems::*;
pub use telemetry::{ChannelTelemetry, TelemetryHub, TelemetryRecord};
pub use teleop::{DriverLoop, InputSource, OperatorInput, TeleopMapper};
pub use watchdog::SafetyTimer;
pub use worker::{Controller, TickContext, Worker, WorkerCore, WorkerStatus};
