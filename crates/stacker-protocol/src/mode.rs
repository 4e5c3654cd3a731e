//! 机器人运行模式定义
//!
//! 模式由外部模式源（比赛场控）给出，驱动循环在模式变化时广播给所有 Worker。

use crate::ProtocolError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// 机器人运行模式
///
/// # 模式说明
///
/// - **Disabled**: 场控禁用，所有执行器必须处于安全输出
/// - **Autonomous**: 自动阶段，命令来自脚本解释器
/// - **Teleoperated**: 手动阶段，命令来自驾驶员循环
/// - **Test**: 测试模式
/// - **Unknown**: 尚未收到任何模式（启动默认值）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RobotMode {
    Disabled = 0,
    Autonomous = 1,
    Teleoperated = 2,
    Test = 3,
    Unknown = 4,
}

impl Default for RobotMode {
    fn default() -> Self {
        Self::Unknown
    }
}

impl RobotMode {
    /// 所有模式（按编码顺序）
    pub const ALL: [RobotMode; 5] = [
        RobotMode::Disabled,
        RobotMode::Autonomous,
        RobotMode::Teleoperated,
        RobotMode::Test,
        RobotMode::Unknown,
    ];

    /// 从 u8 转换
    ///
    /// 如果值无效，返回 Unknown。
    pub fn from_u8(value: u8) -> Self {
        Self::try_from(value).unwrap_or(Self::Unknown)
    }

    /// 从 u8 严格转换
    ///
    /// # 错误
    ///
    /// 值不在 0..=4 范围内时返回 [`ProtocolError::InvalidMode`]。
    pub fn try_from_u8(value: u8) -> Result<Self, ProtocolError> {
        Self::try_from(value).map_err(|_| ProtocolError::InvalidMode { value })
    }

    /// 转换为 u8
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    /// 是否为自动模式
    pub fn is_autonomous(self) -> bool {
        self == Self::Autonomous
    }

    /// 是否为手动模式
    pub fn is_teleoperated(self) -> bool {
        self == Self::Teleoperated
    }

    /// 是否为禁用模式
    pub fn is_disabled(self) -> bool {
        self == Self::Disabled
    }
}

impl fmt::Display for RobotMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobotMode::Disabled => "disabled",
            RobotMode::Autonomous => "autonomous",
            RobotMode::Teleoperated => "teleoperated",
            RobotMode::Test => "test",
            RobotMode::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// 机器人模式（原子版本，用于线程间共享）
///
/// # 使用场景
///
/// - 模拟模式源在测试/CLI 中由主线程切换
/// - 驱动循环轮询读取
///
/// # 示例
///
/// ```rust
/// use stacker_protocol::mode::{AtomicRobotMode, RobotMode};
/// use std::sync::atomic::Ordering;
///
/// let mode = AtomicRobotMode::new(RobotMode::Disabled);
/// mode.set(RobotMode::Autonomous, Ordering::Relaxed);
/// assert_eq!(mode.get(Ordering::Relaxed), RobotMode::Autonomous);
/// ```
#[derive(Debug)]
pub struct AtomicRobotMode {
    inner: AtomicU8,
}

impl AtomicRobotMode {
    /// 创建新的原子模式
    pub fn new(mode: RobotMode) -> Self {
        Self {
            inner: AtomicU8::new(mode.as_u8()),
        }
    }

    /// 获取当前模式
    pub fn get(&self, ordering: Ordering) -> RobotMode {
        RobotMode::from_u8(self.inner.load(ordering))
    }

    /// 设置模式
    pub fn set(&self, mode: RobotMode, ordering: Ordering) {
        self.inner.store(mode.as_u8(), ordering);
    }

    /// 设置模式并返回旧值
    pub fn swap(&self, mode: RobotMode, ordering: Ordering) -> RobotMode {
        RobotMode::from_u8(self.inner.swap(mode.as_u8(), ordering))
    }
}

impl Default for AtomicRobotMode {
    fn default() -> Self {
        Self::new(RobotMode::Unknown)
    }
}
