//! # Stacker Protocol
//!
//! 机器人消息总线的数据定义（无硬件依赖、无线程依赖）
//!
//! ## 模块
//!
//! - `mode`: 机器人运行模式（Disabled/Autonomous/Teleoperated/Test/Unknown）
//! - `command`: 按子系统划分的命令类型（每个变体自带参数）
//! - `message`: 消息、应答通道与应答结果
//!
//! ## 类型安全
//!
//! 每个命令族是独立的枚举，参数直接挂在变体上，
//! 因此"命令与参数形状不匹配"在编译期就无法表达。

pub mod command;
pub mod message;
pub mod mode;

pub use command::*;
pub use message::{FailureReason, Message, Outcome, ReplyTo, Response};
pub use mode::{AtomicRobotMode, RobotMode};

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 无效的模式编码
    #[error("Invalid robot mode value: {value}")]
    InvalidMode { value: u8 },

    /// 应答接收端已关闭（调用方已放弃等待）
    #[error("Reply receiver dropped")]
    ReplyDropped,
}
