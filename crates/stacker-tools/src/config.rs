//! # 机器人配置
//!
//! 各子系统的速度、增益、电流上限和超时。默认值即比赛机器人的实测参数，
//! 配置文件中缺省的段落或字段都会回落到默认值。
//!
//! ```toml
//! [drivetrain]
//! correction_gain = 0.09
//!
//! [worker]
//! safety_timeout_ms = 30000
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 机器人配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Worker 通用节拍与安全窗口
    pub worker: WorkerConfig,
    pub drivetrain: DrivetrainConfig,
    pub conveyor: ConveyorConfig,
    pub cube: CubeConfig,
    pub lifter: LifterConfig,
    pub claw: ClawConfig,
    pub canarm: CanArmConfig,
    pub fan: FanConfig,
    pub autonomous: AutonomousConfig,
}

impl RobotConfig {
    /// 从 TOML 文件加载配置
    ///
    /// # 错误
    ///
    /// 文件无法读取、TOML 语法错误或数值非法时返回 [`ConfigError`]。
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 从 TOML 文本解析配置
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RobotConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = self.to_toml_string()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 序列化为 TOML 文本
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// 检查所有定时参数为正数、增益与限幅为有限值
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = &self.worker;
        if w.tick_interval_ms == 0 || w.idle_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker tick_interval_ms and idle_poll_ms must be > 0".to_string(),
            ));
        }
        if w.safety_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "worker safety_timeout_ms must be > 0".to_string(),
            ));
        }
        if w.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid(
                "worker mailbox_capacity must be > 0".to_string(),
            ));
        }

        let positive = [
            ("drivetrain.angle_tolerance", self.drivetrain.angle_tolerance),
            ("drivetrain.turn_speed_limit", self.drivetrain.turn_speed_limit),
            (
                "drivetrain.full_speed_inches_per_sec",
                self.drivetrain.full_speed_inches_per_sec,
            ),
            ("conveyor.shift_time_cap", self.conveyor.shift_time_cap),
            ("conveyor.push_time", self.conveyor.push_time),
            ("conveyor.deposit_timeout", self.conveyor.deposit_timeout),
            ("cube.gate_delay", self.cube.gate_delay),
            ("cube.delay_after_cycle", self.cube.delay_after_cycle),
            ("cube.cycle_period", self.cube.cycle_period),
            ("lifter.current_max", self.lifter.current_max),
            ("lifter.raise_timeout", self.lifter.raise_timeout),
            ("lifter.travel_timeout", self.lifter.travel_timeout),
            ("claw.action_time_limit", self.claw.action_time_limit),
            ("claw.current_max", self.claw.current_max),
            (
                "autonomous.default_response_timeout",
                self.autonomous.default_response_timeout,
            ),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }

        if !self.autonomous.response_margin.is_finite() || self.autonomous.response_margin < 0.0 {
            return Err(ConfigError::Invalid(
                "autonomous.response_margin must be >= 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Worker 通用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 闭环行为激活时的节拍（毫秒）
    pub tick_interval_ms: u64,
    /// 空闲时的邮箱轮询间隔（毫秒），用于驱动安全窗口检查
    pub idle_poll_ms: u64,
    /// 无消息安全窗口（毫秒）
    pub safety_timeout_ms: u64,
    /// 邮箱容量
    pub mailbox_capacity: usize,
    /// 遥测发布周期（毫秒）
    pub telemetry_period_ms: u64,
}

impl WorkerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn safety_timeout(&self) -> Duration {
        Duration::from_millis(self.safety_timeout_ms)
    }

    pub fn telemetry_period(&self) -> Duration {
        Duration::from_millis(self.telemetry_period_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            idle_poll_ms: 100,
            safety_timeout_ms: 30_000,
            mailbox_capacity: 1024,
            telemetry_period_ms: 200,
        }
    }
}

/// 底盘参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// 直行航向修正增益（每度）
    pub correction_gain: f64,
    /// 转向比例增益（每度）
    pub turn_gain: f64,
    /// 转向输出限幅
    pub turn_speed_limit: f64,
    /// 转向到位容差（度）
    pub angle_tolerance: f64,
    /// 手动驾驶输出缩放
    pub teleop_scale: f64,
    /// 寻找料箱时的直行速度
    pub tote_seek_speed: f64,
    /// 满速时的行驶速度（英寸/秒），用于把距离换算成时长
    pub full_speed_inches_per_sec: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            correction_gain: 0.09,
            turn_gain: 0.05,
            turn_speed_limit: 0.5,
            angle_tolerance: 2.0,
            teleop_scale: 0.75,
            tote_seek_speed: 0.4,
            full_speed_inches_per_sec: 100.0,
        }
    }
}

/// 传送带参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConveyorConfig {
    pub run_fwd_speed: f64,
    pub run_back_speed: f64,
    pub load_speed: f64,
    pub shift_speed: f64,
    /// 移动料箱的硬时限（秒）
    pub shift_time_cap: f64,
    /// 推料持续时间（秒）
    pub push_time: f64,
    pub deposit_speed: f64,
    /// 卸料超时（秒）
    pub deposit_timeout: f64,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            run_fwd_speed: -0.5,
            run_back_speed: 0.75,
            load_speed: 0.75,
            shift_speed: 0.4,
            shift_time_cap: 3.0,
            push_time: 0.25,
            deposit_speed: 1.0,
            deposit_timeout: 5.0,
        }
    }
}

/// 拨片（Cube）参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CubeConfig {
    pub clicker_raise: f64,
    pub clicker_lower: f64,
    pub clicker_top_hold: f64,
    pub intake_run: f64,
    /// 闸门稳定延时（秒）
    pub gate_delay: f64,
    /// 两次循环之间的间隔（秒）
    pub delay_after_cycle: f64,
    /// 状态机推进周期（秒）
    pub cycle_period: f64,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            clicker_raise: 1.0,
            clicker_lower: -1.0,
            clicker_top_hold: 1.0,
            intake_run: -0.5,
            gate_delay: 0.25,
            delay_after_cycle: 1.5,
            cycle_period: 0.02,
        }
    }
}

/// 升降机参数
///
/// 电机上升方向为负。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifterConfig {
    pub up_mult: f64,
    pub down_mult: f64,
    pub hover: f64,
    pub start_raise: f64,
    pub raise_lomid: f64,
    /// 过流上限（安培）
    pub current_max: f64,
    /// 单罐负载上限（安培），用于判断夹爪到顶
    pub current_max_one_can: f64,
    /// 起步慢速阶段时长（秒）
    pub start_raise_time: f64,
    /// 抬升料箱超时（秒）
    pub raise_timeout: f64,
    /// 其余自动行程超时（秒）
    pub travel_timeout: f64,
}

impl Default for LifterConfig {
    fn default() -> Self {
        Self {
            up_mult: -1.0,
            down_mult: 1.0,
            hover: -0.25,
            start_raise: -0.6,
            raise_lomid: -0.75,
            current_max: 30.0,
            current_max_one_can: 20.0,
            start_raise_time: 0.25,
            raise_timeout: 2.0,
            travel_timeout: 4.0,
        }
    }
}

/// 夹爪参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClawConfig {
    pub open: f64,
    pub close: f64,
    /// 单次动作最长驱动时间（秒）
    pub action_time_limit: f64,
    pub current_max: f64,
}

impl Default for ClawConfig {
    fn default() -> Self {
        Self {
            open: 0.5,
            close: -0.4,
            action_time_limit: 0.5,
            current_max: 8.0,
        }
    }
}

/// 推罐臂参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanArmConfig {
    pub open: f64,
    pub close: f64,
    pub current_max: f64,
}

impl Default for CanArmConfig {
    fn default() -> Self {
        Self {
            open: -0.65,
            close: 0.65,
            current_max: 30.0,
        }
    }
}

/// 风扇参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    pub power: f64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self { power: 1.0 }
    }
}

/// 自动脚本参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutonomousConfig {
    /// 命令自身不带超时参数时的应答等待时间（秒）
    pub default_response_timeout: f64,
    /// 命令带超时参数时，在其基础上额外等待的余量（秒）
    pub response_margin: f64,
}

impl AutonomousConfig {
    /// 计算应答等待时间
    ///
    /// 带超时参数的命令等待 `timeout + margin`，否则使用默认值。
    pub fn response_timeout(&self, command_timeout: Option<f64>) -> Duration {
        let secs = match command_timeout {
            Some(t) if t.is_finite() && t >= 0.0 => t + self.response_margin,
            _ => self.default_response_timeout,
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Default for AutonomousConfig {
    fn default() -> Self {
        Self {
            default_response_timeout: 15.0,
            response_margin: 1.0,
        }
    }
}
