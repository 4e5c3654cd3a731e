//! # Stacker Auto
//!
//! 自动阶段脚本：词法、关键字表、解释器与按块运行。
//!
//! ## 脚本格式
//!
//! ```text
//! # 注释
//! BEGIN two_tote
//! FRONTLOADTOTE 2.0
//! STRAIGHT 0.5, 1.5
//! TURN(90, 2.0)
//! STACKUP 1
//! END
//! ```
//!
//! ## 模块
//!
//! - `token`: 分隔符、有序关键字表、语句解析
//! - `plan`: 关键字到总线命令的映射
//! - `interpreter`: 逐行执行，暂停/中止控制
//! - `runner`: 选择 `BEGIN` 块并运行整份脚本
//! - `check`: 不投递命令的静态检查

pub mod check;
mod error;
pub mod interpreter;
pub mod plan;
pub mod runner;
pub mod token;

pub use check::{CheckReport, Issue, Severity, check};
pub use error::AutoError;
pub use interpreter::{CommandSink, Flow, Interpreter, InterpreterState, PauseGate};
pub use runner::{AutonomousRunner, RunReport, Termination, block_names, find_block};
pub use token::{KEYWORDS, Keyword, ParamKind, Statement};
