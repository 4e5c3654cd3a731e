//! 命令类型定义模块
//!
//! 每个子系统一个命令族。参数直接作为变体字段，
//! 速度为归一化输出 `[-1, 1]`，时间单位为秒，角度单位为度。

use crate::mode::RobotMode;
use std::fmt;

/// 子系统标识（即 Worker 的身份）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Subsystem {
    Drivetrain,
    Conveyor,
    Lifter,
    Claw,
    CanArm,
    Cube,
    Fan,
}

impl Subsystem {
    /// 所有子系统
    pub const ALL: [Subsystem; 7] = [
        Subsystem::Drivetrain,
        Subsystem::Conveyor,
        Subsystem::Lifter,
        Subsystem::Claw,
        Subsystem::CanArm,
        Subsystem::Cube,
        Subsystem::Fan,
    ];

    /// 名称（用于日志与线程名）
    pub const fn name(self) -> &'static str {
        match self {
            Subsystem::Drivetrain => "drivetrain",
            Subsystem::Conveyor => "conveyor",
            Subsystem::Lifter => "lifter",
            Subsystem::Claw => "claw",
            Subsystem::CanArm => "canarm",
            Subsystem::Cube => "cube",
            Subsystem::Fan => "fan",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 自动阶段生命周期命令（广播给所有 Worker）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AutonomousCommand {
    /// 脚本开始执行
    Run,
    /// 脚本执行结束
    Complete,
    /// 赛前自检
    ChecklistRun,
}

/// 底盘命令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrivetrainCommand {
    Stop,
    /// 坦克驱动（左右摇杆）
    DriveTank { left: f64, right: f64 },
    /// 街机驱动
    DriveArcade { x: f64, y: f64 },
    /// 开环设定左右输出
    AutoMove { left: f64, right: f64 },
    /// 陀螺仪修正直行，持续 `duration` 秒
    DriveStraight { speed: f64, duration: f64 },
    /// 原地转向 `angle` 度，超时 `timeout` 秒
    Turn { angle: f64, timeout: f64 },
    /// 直行直到底盘料箱传感器触发（需先行驶 `time_in` 秒）
    SeekTote { time_in: f64, timeout: f64 },
    /// 无时限直行（前进）
    StartDriveFwd { speed: f64 },
    /// 无时限直行（后退）
    StartDriveBck { speed: f64 },
    StartKeepAlign,
    StopKeepAlign,
}

/// 传送带命令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConveyorCommand {
    RunFwd,
    RunBck,
    SetBack,
    Stop,
    SeekToteFront { timeout: f64 },
    SeekToteBack { timeout: f64 },
    FrontLoadTote { timeout: f64 },
    BackLoadTote { timeout: f64 },
    ShiftTotesFwd,
    ShiftTotesBck,
    PushTotesBck,
    DepositTotesBck,
    WaitFrontBeam,
    WaitBackBeam,
}

/// 升降机命令
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LifterCommand {
    Raise { speed: f64 },
    Lower { speed: f64 },
    Stop,
    Hover,
    ToggleHover,
    RaiseTotes { count: i32 },
    LowerTotes,
    StartRaiseTotes { count: i32 },
    ClawToTop,
    ClawToBottom,
    RaiseLoMid,
    LowerHiMid,
}

/// 夹爪命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClawCommand {
    Open,
    Close,
    Stop,
}

/// 推罐臂命令（`duration` 为驱动时长，秒）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CanArmCommand {
    Open { duration: f64 },
    Close { duration: f64 },
    Stop,
}

/// 料箱拨片（Cube）命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CubeCommand {
    ClickerRaise,
    ClickerLower,
    ClickerStop,
    IntakeRun,
    IntakeStop,
    Stop,
    AutoCycleStart,
    AutoCycleStop,
    AutoCyclePause,
    AutoCycleResume,
    AutoCycleHold,
    AutoCycleRelease,
}

/// 风扇命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FanCommand {
    Start,
    Stop,
    Toggle,
}

/// 总线命令（按命令族区分的和类型）
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// 模式切换（广播）
    State(RobotMode),
    /// 自动阶段生命周期（广播）
    Autonomous(AutonomousCommand),
    Drivetrain(DrivetrainCommand),
    Conveyor(ConveyorCommand),
    Lifter(LifterCommand),
    Claw(ClawCommand),
    CanArm(CanArmCommand),
    Cube(CubeCommand),
    Fan(FanCommand),
}

impl Command {
    /// 目标子系统
    ///
    /// 广播类命令（`State`、`Autonomous`）返回 `None`。
    pub fn target(&self) -> Option<Subsystem> {
        match self {
            Command::State(_) | Command::Autonomous(_) => None,
            Command::Drivetrain(_) => Some(Subsystem::Drivetrain),
            Command::Conveyor(_) => Some(Subsystem::Conveyor),
            Command::Lifter(_) => Some(Subsystem::Lifter),
            Command::Claw(_) => Some(Subsystem::Claw),
            Command::CanArm(_) => Some(Subsystem::CanArm),
            Command::Cube(_) => Some(Subsystem::Cube),
            Command::Fan(_) => Some(Subsystem::Fan),
        }
    }

    /// 是否为广播命令
    pub fn is_broadcast(&self) -> bool {
        self.target().is_none()
    }
}

macro_rules! impl_from_family {
    ($($family:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$family> for Command {
                fn from(cmd: $family) -> Self {
                    Command::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_family! {
    AutonomousCommand => Autonomous,
    DrivetrainCommand => Drivetrain,
    ConveyorCommand => Conveyor,
    LifterCommand => Lifter,
    ClawCommand => Claw,
    CanArmCommand => CanArm,
    CubeCommand => Cube,
    FanCommand => Fan,
}

impl From<RobotMode> for Command {
    fn from(mode: RobotMode) -> Self {
        Command::State(mode)
    }
}
