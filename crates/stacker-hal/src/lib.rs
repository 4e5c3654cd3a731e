//! # Stacker HAL
//!
//! 硬件能力抽象层：核心逻辑只通过这些 trait 访问电机、传感器、陀螺仪、遥测和模式源。
//!
//! 真实硬件驱动不在本仓库内；`mock` feature 提供一组模拟实现，
//! 供测试与命令行演练使用。

use stacker_protocol::{AtomicRobotMode, RobotMode};
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// 硬件层统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HalError {
    /// 设备未连接或未响应
    #[error("Device not connected: {0}")]
    NotConnected(String),
    /// 设备报告故障
    #[error("Device fault: {0}")]
    Fault(String),
    /// 输出值非法（NaN/无穷大）
    #[error("Invalid output value: {0}")]
    InvalidOutput(f64),
}

/// 执行器（电机控制器）
///
/// 输出为归一化值 `[-1, 1]`。
pub trait Actuator: Send {
    /// 设置输出
    ///
    /// # 错误
    ///
    /// 设备未连接或拒绝写入时返回 [`HalError`]。
    fn set_output(&mut self, value: f64) -> Result<(), HalError>;

    /// 最近一次设置的输出
    fn output(&self) -> f64;

    /// 输出电流（安培）
    fn output_current(&self) -> f64;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_output(&mut self, value: f64) -> Result<(), HalError> {
        (**self).set_output(value)
    }

    fn output(&self) -> f64 {
        (**self).output()
    }

    fn output_current(&self) -> f64 {
        (**self).output_current()
    }
}

/// 限位/光电传感器位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// 传送带前光电
    Front,
    /// 传送带后光电
    Back,
    /// 顶部霍尔/限位
    Top,
    /// 底部霍尔/限位
    Bottom,
    /// 入料口红外光电
    Intake,
    /// 拨片顶部料箱检测
    StackTop,
    /// 升降机悬停霍尔
    Hover,
    /// 底盘料箱检测
    Tote,
}

impl Side {
    pub const ALL: [Side; 8] = [
        Side::Front,
        Side::Back,
        Side::Top,
        Side::Bottom,
        Side::Intake,
        Side::StackTop,
        Side::Hover,
        Side::Tote,
    ];

    /// 稳定的数组下标
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 数字传感器组
///
/// `is_tripped` 为 true 表示光束被遮挡 / 霍尔被触发。
pub trait LimitSensor: Send {
    fn is_tripped(&self, side: Side) -> bool;
}

impl<S: LimitSensor + ?Sized> LimitSensor for Box<S> {
    fn is_tripped(&self, side: Side) -> bool {
        (**self).is_tripped(side)
    }
}

/// 航向传感器（陀螺仪）
pub trait HeadingSensor: Send {
    /// 当前航向（度）
    fn heading(&self) -> f64;

    /// 将当前航向清零（不做重新标定）
    fn zero(&mut self);
}

impl<H: HeadingSensor + ?Sized> HeadingSensor for Box<H> {
    fn heading(&self) -> f64 {
        (**self).heading()
    }

    fn zero(&mut self) {
        (**self).zero()
    }
}

/// 遥测值
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryValue {
    Number(f64),
    Flag(bool),
    Text(String),
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::Number(value)
    }
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Flag(value)
    }
}

impl From<&str> for TelemetryValue {
    fn from(value: &str) -> Self {
        TelemetryValue::Text(value.to_string())
    }
}

/// 遥测输出
///
/// 必须非阻塞：实现只能缓存或用 `try_send` 转发，不允许在控制路径上等待。
pub trait TelemetrySink: Send + Sync {
    fn publish(&self, key: &str, value: TelemetryValue);
}

/// 丢弃所有遥测
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn publish(&self, _key: &str, _value: TelemetryValue) {}
}

/// 模式源（场控状态）
pub trait ModeSource: Send + Sync {
    fn current_mode(&self) -> RobotMode;
}

impl ModeSource for AtomicRobotMode {
    fn current_mode(&self) -> RobotMode {
        self.get(Ordering::Acquire)
    }
}

/// 单调时钟
///
/// 所有控制定时（安全窗口、操作超时、周期节拍）都通过它取时间，
/// 测试中可换成手动推进的时钟。
pub trait Clock: Send + Sync {
    /// 自某个固定起点以来的时间
    fn now(&self) -> Duration;
}

/// Global anchor point for monotonic time
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 系统单调时钟（以进程内首次访问为起点）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        APP_START.get_or_init(Instant::now).elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        thread::sleep(Duration::from_millis(5));
        let t2 = clock.now();
        assert!(t2 > t1, "Monotonic time should always increase");
    }

    #[test]
    fn test_mode_source_for_atomic_mode() {
        let mode = AtomicRobotMode::new(RobotMode::Disabled);
        assert_eq!(mode.current_mode(), RobotMode::Disabled);
        mode.set(RobotMode::Autonomous, Ordering::Release);
        assert_eq!(mode.current_mode(), RobotMode::Autonomous);
    }

    #[test]
    fn test_hal_error_display() {
        let err = HalError::NotConnected("left drive".to_string());
        assert_eq!(format!("{}", err), "Device not connected: left drive");
        let err = HalError::InvalidOutput(f64::INFINITY);
        assert!(format!("{}", err).contains("Invalid output"));
    }

    #[test]
    fn test_side_indices_unique() {
        let mut seen = [false; 8];
        for side in Side::ALL {
            assert!(!seen[side.index()]);
            seen[side.index()] = true;
        }
    }
}
