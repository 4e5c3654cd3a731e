//! 手动驾驶映射
//!
//! 把一帧操作员输入（摇杆、按钮、扳机）翻译成发往各子系统的命令。
//! [`TeleopMapper`] 是纯函数，[`DriverLoop`] 负责以固定周期轮询输入、
//! 同步比赛模式并把命令投递到 [`CommandStation`]。
//!
//! 映射规则：
//!
//! - 只在 `Teleoperated` 模式下产生命令，自动阶段完全静默
//! - 底盘：每帧一条 `DriveTank`，左右摇杆乘以 `teleop_scale`
//! - 传送带、夹取器、升降机的"停"命令每帧都会发送，松开按钮即停
//! - 自动循环按钮是边沿触发，同一帧只取优先级最高的一个

use crate::error::DriverError;
use crate::robot::Robot;
use smallvec::SmallVec;
use stacker_hal::ModeSource;
use stacker_protocol::{
    ClawCommand, Command, ConveyorCommand, CubeCommand, DrivetrainCommand, FanCommand,
    LifterCommand, RobotMode,
};
use stacker_tools::DrivetrainConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 扳机死区
pub const TRIGGER_DEADBAND: f64 = 0.1;

/// 一帧操作员输入
///
/// `cube_*` 与 `fan_toggle` 是"本帧刚按下"的边沿信号，由输入源负责去抖；
/// 其余按钮是电平信号。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperatorInput {
    /// 左侧摇杆（-1.0 ~ 1.0）
    pub left_stick: f64,
    /// 右侧摇杆（-1.0 ~ 1.0）
    pub right_stick: f64,
    pub conveyor_fwd: bool,
    pub conveyor_bck: bool,
    pub cube_start: bool,
    pub cube_stop: bool,
    pub cube_hold: bool,
    pub cube_release: bool,
    pub clicker_raise: bool,
    pub clicker_lower: bool,
    /// 上升扳机（0.0 ~ 1.0）
    pub lift_raise: f64,
    /// 下降扳机（0.0 ~ 1.0）
    pub lift_lower: f64,
    pub claw_open: bool,
    pub claw_close: bool,
    pub fan_toggle: bool,
}

/// 一帧最多产生的命令数（底盘、传送带、方块两条、升降机、夹取器、风扇）
pub type TeleopCommands = SmallVec<[Command; 8]>;

/// 操作员输入到命令的映射
#[derive(Debug, Clone, Copy)]
pub struct TeleopMapper {
    drive_scale: f64,
}

impl Default for TeleopMapper {
    fn default() -> Self {
        Self::new(&DrivetrainConfig::default())
    }
}

impl TeleopMapper {
    pub fn new(config: &DrivetrainConfig) -> Self {
        Self {
            drive_scale: config.teleop_scale,
        }
    }

    /// 把一帧输入翻译成命令
    ///
    /// 非 `Teleoperated` 模式下返回空列表。
    ///
    /// # 示例
    ///
    /// ```rust
    /// use stacker_driver::teleop::{OperatorInput, TeleopMapper};
    /// use stacker_protocol::RobotMode;
    ///
    /// let mapper = TeleopMapper::default();
    /// let input = OperatorInput { left_stick: 1.0, ..Default::default() };
    /// assert!(mapper.map(&input, RobotMode::Autonomous).is_empty());
    /// assert!(!mapper.map(&input, RobotMode::Teleoperated).is_empty());
    /// ```
    pub fn map(&self, input: &OperatorInput, mode: RobotMode) -> TeleopCommands {
        let mut out = TeleopCommands::new();
        if mode != RobotMode::Teleoperated {
            return out;
        }

        out.push(
            DrivetrainCommand::DriveTank {
                left: input.left_stick * self.drive_scale,
                right: input.right_stick * self.drive_scale,
            }
            .into(),
        );

        let conveyor = if input.conveyor_fwd {
            ConveyorCommand::RunFwd
        } else if input.conveyor_bck {
            ConveyorCommand::RunBck
        } else {
            ConveyorCommand::Stop
        };
        out.push(conveyor.into());

        let cycle = if input.cube_start {
            Some(CubeCommand::AutoCycleStart)
        } else if input.cube_stop {
            Some(CubeCommand::AutoCycleStop)
        } else if input.cube_hold {
            Some(CubeCommand::AutoCycleHold)
        } else if input.cube_release {
            Some(CubeCommand::AutoCycleRelease)
        } else {
            None
        };
        if let Some(cycle) = cycle {
            out.push(cycle.into());
        }

        let clicker = if input.clicker_raise {
            CubeCommand::ClickerRaise
        } else if input.clicker_lower {
            CubeCommand::ClickerLower
        } else {
            CubeCommand::ClickerStop
        };
        out.push(clicker.into());

        let lifter = if input.lift_raise > TRIGGER_DEADBAND {
            LifterCommand::Raise {
                speed: input.lift_raise,
            }
        } else if input.lift_lower > TRIGGER_DEADBAND {
            LifterCommand::Lower {
                speed: input.lift_lower,
            }
        } else {
            LifterCommand::Stop
        };
        out.push(lifter.into());

        if input.claw_open {
            out.push(ClawCommand::Open.into());
        } else if input.claw_close {
            out.push(ClawCommand::Close.into());
        }

        if input.fan_toggle {
            out.push(FanCommand::Toggle.into());
        }

        out
    }
}

/// 操作员输入源（手柄、回放文件、测试脚本）
pub trait InputSource: Send {
    /// 读取当前一帧
    fn poll(&mut self) -> OperatorInput;
}

impl<F> InputSource for F
where
    F: FnMut() -> OperatorInput + Send,
{
    fn poll(&mut self) -> OperatorInput {
        self()
    }
}

/// 固定周期的驾驶循环
///
/// 每帧依次：轮询模式源（变化时广播）、读取输入、投递映射出的命令。
/// 投递只入队不等待；未装配的子系统静默跳过。
pub struct DriverLoop<'a> {
    robot: &'a Robot,
    mode_source: Arc<dyn ModeSource>,
    input: Box<dyn InputSource>,
    mapper: TeleopMapper,
    period: Duration,
    is_running: Arc<AtomicBool>,
}

impl<'a> DriverLoop<'a> {
    /// 创建驾驶循环（默认周期 20ms）
    pub fn new(
        robot: &'a Robot,
        mode_source: Arc<dyn ModeSource>,
        input: Box<dyn InputSource>,
        mapper: TeleopMapper,
    ) -> Self {
        Self {
            robot,
            mode_source,
            input,
            mapper,
            period: Duration::from_millis(20),
            is_running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// 设置循环周期
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// 停止标志（置 false 后 [`DriverLoop::run`] 在下一帧返回）
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.is_running.clone()
    }

    /// 执行一帧，返回成功投递的命令数
    pub fn step(&mut self) -> usize {
        if let Err(e) = self.robot.poll_mode(self.mode_source.as_ref()) {
            warn!("mode broadcast failed: {}", e);
        }

        let input = self.input.poll();
        let commands = self.mapper.map(&input, self.robot.mode());
        let mut posted = 0;
        for command in commands {
            match self.robot.station().send_no_wait(command) {
                Ok(()) => posted += 1,
                Err(DriverError::SubsystemUnavailable(subsystem)) => {
                    trace!("skipping {:?}: {} not assembled", command, subsystem);
                },
                Err(e) => warn!("failed to post {:?}: {}", command, e),
            }
        }
        posted
    }

    /// 按固定周期运行直到停止标志被清除
    ///
    /// 使用锚点计时：本帧耗时会从睡眠中扣除，超时帧不睡眠并重置锚点。
    pub fn run(&mut self) {
        info!("driver loop started (period {:?})", self.period);
        let mut next_tick = Instant::now();

        while self.is_running.load(Ordering::Acquire) {
            next_tick += self.period;
            self.step();

            let now = Instant::now();
            if next_tick > now {
                spin_sleep::sleep(next_tick - now);
            } else {
                debug!(
                    "driver loop overrun by {:?}",
                    now.duration_since(next_tick)
                );
                next_tick = now;
            }
        }
        info!("driver loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_protocol::Subsystem;

    fn teleop(input: OperatorInput) -> TeleopCommands {
        TeleopMapper::default().map(&input, RobotMode::Teleoperated)
    }

    #[test]
    fn test_silent_outside_teleop() {
        let input = OperatorInput {
            left_stick: 1.0,
            conveyor_fwd: true,
            fan_toggle: true,
            ..Default::default()
        };
        let mapper = TeleopMapper::default();
        assert!(mapper.map(&input, RobotMode::Autonomous).is_empty());
        assert!(mapper.map(&input, RobotMode::Disabled).is_empty());
    }

    #[test]
    fn test_idle_input_sends_stops() {
        let commands = teleop(OperatorInput::default());
        assert_eq!(
            commands.as_slice(),
            &[
                Command::Drivetrain(DrivetrainCommand::DriveTank { left: 0.0, right: 0.0 }),
                Command::Conveyor(ConveyorCommand::Stop),
                Command::Cube(CubeCommand::ClickerStop),
                Command::Lifter(LifterCommand::Stop),
            ]
        );
    }

    #[test]
    fn test_sticks_are_scaled() {
        let commands = teleop(OperatorInput {
            left_stick: 1.0,
            right_stick: -0.5,
            ..Default::default()
        });
        assert_eq!(
            commands[0],
            Command::Drivetrain(DrivetrainCommand::DriveTank {
                left: 0.75,
                right: -0.375
            })
        );
    }

    #[test]
    fn test_cycle_buttons_take_priority_order() {
        let commands = teleop(OperatorInput {
            cube_stop: true,
            cube_hold: true,
            ..Default::default()
        });
        assert!(commands.contains(&Command::Cube(CubeCommand::AutoCycleStop)));
        assert!(!commands.contains(&Command::Cube(CubeCommand::AutoCycleHold)));
    }

    #[test]
    fn test_trigger_deadband() {
        let commands = teleop(OperatorInput {
            lift_raise: 0.05,
            lift_lower: 0.6,
            ..Default::default()
        });
        assert!(commands.contains(&Command::Lifter(LifterCommand::Lower { speed: 0.6 })));

        let commands = teleop(OperatorInput {
            lift_raise: 0.8,
            lift_lower: 0.8,
            ..Default::default()
        });
        assert!(commands.contains(&Command::Lifter(LifterCommand::Raise { speed: 0.8 })));
    }

    #[test]
    fn test_conveyor_forward_wins() {
        let commands = teleop(OperatorInput {
            conveyor_fwd: true,
            conveyor_bck: true,
            ..Default::default()
        });
        assert!(commands.contains(&Command::Conveyor(ConveyorCommand::RunFwd)));
    }

    #[test]
    fn test_edge_buttons() {
        let commands = teleop(OperatorInput {
            claw_close: true,
            fan_toggle: true,
            ..Default::default()
        });
        assert!(commands.contains(&Command::Claw(ClawCommand::Close)));
        assert!(commands.contains(&Command::Fan(FanCommand::Toggle)));
        assert_eq!(commands.len(), 6);
    }

    #[test]
    fn test_step_skips_missing_subsystems() {
        use crate::RobotBuilder;
        use crate::output::Motor;
        use stacker_hal::mock::SimMotor;
        use stacker_protocol::AtomicRobotMode;

        let fan = SimMotor::new("fan");
        let robot = RobotBuilder::new()
            .fan(Motor::new("fan", Box::new(fan.clone())))
            .build()
            .unwrap();
        let mode = Arc::new(AtomicRobotMode::new(RobotMode::Teleoperated));
        let input = || OperatorInput {
            fan_toggle: true,
            ..Default::default()
        };
        let mut driver = DriverLoop::new(&robot, mode, Box::new(input), TeleopMapper::default());

        assert_eq!(driver.step(), 1);
        assert_eq!(robot.mode(), RobotMode::Teleoperated);
        assert!(robot.station().has(Subsystem::Fan));
    }
}
