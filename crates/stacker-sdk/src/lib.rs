//! Stacker SDK - 搬箱机器人 Rust SDK
//!
//! 把各层 crate 汇总到一个入口，并提供日志初始化。
//!
//! # 架构设计
//!
//! 从底层到高层：
//!
//! - **协议层** (`protocol`): 命令族、消息、应答
//! - **硬件层** (`hal`): 执行器、传感器、时钟等能力接口
//! - **配置** (`tools`): `RobotConfig`
//! - **驱动层** (`driver`): Worker、命令路由、整机装配、手动驾驶循环
//! - **自动脚本** (`auto`): 解释器与运行器
//!
//! # 快速开始
//!
//! ```rust
//! use stacker_sdk::prelude::*;
//!
//! let mut interpreter = Interpreter::new(CommandStation::new(), &RobotConfig::default());
//! assert_eq!(interpreter.evaluate("# nothing to do").unwrap(), Flow::Continue);
//! ```

pub use stacker_auto as auto;
pub use stacker_driver as driver;
pub use stacker_hal as hal;
pub use stacker_protocol as protocol;
pub use stacker_tools as tools;

pub mod prelude;

pub use stacker_auto::{AutoError, AutonomousRunner, Interpreter, PauseGate, RunReport};
pub use stacker_driver::{CommandStation, DriverError, Robot, RobotBuilder};
pub use stacker_protocol::{Command, Message, RobotMode};
pub use stacker_tools::{ConfigError, RobotConfig};

use tracing_subscriber::EnvFilter;

/// 默认日志级别（`RUST_LOG` 未设置时）
pub const DEFAULT_LOG_DIRECTIVE: &str = "info";

/// 初始化日志
///
/// 安装 `tracing_subscriber` 的 fmt 输出（带时间戳，写到 stderr），级别由 `RUST_LOG` 控制，
/// 未设置时为 `info`；`extra_directives` 追加在后面（如 `"stacker_cli=info"`）。
/// 同时把 `log` crate 的记录桥接到 `tracing`。
///
/// 重复调用是无害的：已安装的订阅者保持不变。
///
/// # 示例
///
/// ```rust
/// stacker_sdk::init_logger(&["stacker_auto=debug"]);
/// tracing::info!("logger ready");
/// ```
pub fn init_logger(extra_directives: &[&str]) {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    for directive in extra_directives {
        match directive.parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("ignoring log directive '{}': {}", directive, e),
        }
    }

    // 已有 logger 时忽略
    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
