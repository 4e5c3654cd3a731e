//! 错误类型定义

use stacker_driver::DriverError;
use stacker_protocol::{FailureReason, Subsystem};
use std::time::Duration;
use thiserror::Error;

/// 自动脚本错误
///
/// 除 [`AutoError::BadParameter`]（只由静态检查报告）外，
/// 解释器遇到的每一种错误都会终止脚本。
#[derive(Error, Debug)]
pub enum AutoError {
    #[error("Unknown token '{token}' in \"{statement}\"")]
    UnknownToken { token: String, statement: String },

    #[error("Missing parameter '{name}' for {keyword} in \"{statement}\"")]
    MissingParameter {
        keyword: &'static str,
        name: &'static str,
        statement: String,
    },

    #[error("Bad numeric parameter '{value}' for {keyword}, using 0")]
    BadParameter { keyword: &'static str, value: String },

    #[error("{keyword} failed: {subsystem} reported {reason}")]
    CommandFailed {
        keyword: &'static str,
        subsystem: Subsystem,
        reason: FailureReason,
    },

    #[error("{keyword}: no response within {timeout:?}")]
    ResponseTimeout {
        keyword: &'static str,
        timeout: Duration,
    },

    #[error("Script aborted")]
    Aborted,

    #[error("Interpreter already terminated")]
    Terminated,

    #[error("Mode block '{0}' not found")]
    BlockNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl AutoError {
    /// 解析阶段错误（脚本写错，而不是执行失败）
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            AutoError::UnknownToken { .. } | AutoError::MissingParameter { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutoError::UnknownToken {
            token: "BOGUS".into(),
            statement: "BOGUS 1 2".into(),
        };
        assert_eq!(err.to_string(), "Unknown token 'BOGUS' in \"BOGUS 1 2\"");
        assert!(err.is_parse_error());

        let err = AutoError::CommandFailed {
            keyword: "TURN",
            subsystem: Subsystem::Drivetrain,
            reason: FailureReason::Timeout,
        };
        assert!(err.to_string().contains("timeout"));
        assert!(!err.is_parse_error());
    }

    #[test]
    fn test_driver_error_conversion() {
        let err: AutoError = DriverError::ChannelFull.into();
        assert!(matches!(err, AutoError::Driver(DriverError::ChannelFull)));
    }
}
