//! 驱动层错误类型定义

use stacker_hal::HalError;
use stacker_protocol::{ProtocolError, Subsystem};
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 硬件错误
    #[error("Hardware error: {0}")]
    Hal(#[from] HalError),

    /// 协议错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 邮箱已关闭（Worker 线程退出）
    #[error("Mailbox closed")]
    ChannelClosed,

    /// 邮箱已满
    #[error("Mailbox full")]
    ChannelFull,

    /// 等待应答超时
    #[error("Operation timeout")]
    Timeout,

    /// 机器人未装配该子系统
    #[error("Subsystem not available: {0}")]
    SubsystemUnavailable(Subsystem),

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// Worker 线程错误
    #[error("Worker thread error: {0}")]
    WorkerThread(String),

    /// 无效输入
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 子系统报告操作失败
    #[error("Operation failed on {0}")]
    OperationFailed(Subsystem),
}

#[cfg(test)]
mod tests {
    use super::DriverError;
    use stacker_hal::HalError;
    use stacker_protocol::Subsystem;

    /// 测试 DriverError 的 Display 实现
    #[test]
    fn test_driver_error_display() {
        let driver_error = DriverError::ChannelClosed;
        assert_eq!(format!("{}", driver_error), "Mailbox closed");

        let driver_error = DriverError::ChannelFull;
        assert_eq!(format!("{}", driver_error), "Mailbox full");

        let driver_error = DriverError::Timeout;
        assert_eq!(format!("{}", driver_error), "Operation timeout");

        let driver_error = DriverError::SubsystemUnavailable(Subsystem::CanArm);
        assert_eq!(format!("{}", driver_error), "Subsystem not available: canarm");

        let driver_error = DriverError::WorkerThread("spawn failed".to_string());
        let msg = format!("{}", driver_error);
        assert!(msg.contains("Worker thread") && msg.contains("spawn failed"));

        let driver_error = DriverError::OperationFailed(Subsystem::Conveyor);
        assert_eq!(format!("{}", driver_error), "Operation failed on conveyor");
    }

    /// 测试 From<HalError> 转换
    #[test]
    fn test_from_hal_error() {
        let hal_error = HalError::Fault("left drive".to_string());
        let driver_error: DriverError = hal_error.into();
        match driver_error {
            DriverError::Hal(HalError::Fault(name)) => assert_eq!(name, "left drive"),
            other => panic!("Expected Hal variant, got {:?}", other),
        }
    }
}
