//! 关键字到总线命令的映射
//!
//! 每个硬件关键字展开为一个 [`Plan`]：若干按顺序执行的步骤，
//! 外加无论成败都会投递的收尾命令（例如寻找料箱结束后总要停车）。

use crate::token::{Keyword, Statement};
use smallvec::{SmallVec, smallvec};
use stacker_protocol::{
    CanArmCommand, ClawCommand, Command, ConveyorCommand, CubeCommand, DrivetrainCommand,
    LifterCommand,
};

/// 执行步骤
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// 投递即返回
    Post(Command),
    /// 投递并等待应答；`timeout` 为命令自身的超时参数（秒）
    Await {
        command: Command,
        timeout: Option<f64>,
    },
}

impl Step {
    pub fn command(&self) -> Command {
        match *self {
            Step::Post(command) | Step::Await { command, .. } => command,
        }
    }

    pub fn waits(&self) -> bool {
        matches!(self, Step::Await { .. })
    }
}

/// 一条语句的执行计划
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Plan {
    pub steps: SmallVec<[Step; 2]>,
    /// 步骤结束后（无论成败）投递的命令
    pub finally: SmallVec<[Command; 1]>,
}

impl Plan {
    fn post(command: impl Into<Command>) -> Self {
        Self {
            steps: smallvec![Step::Post(command.into())],
            finally: SmallVec::new(),
        }
    }

    fn wait(command: impl Into<Command>, timeout: Option<f64>) -> Self {
        Self {
            steps: smallvec![Step::Await {
                command: command.into(),
                timeout,
            }],
            finally: SmallVec::new(),
        }
    }

    fn then_always(mut self, command: impl Into<Command>) -> Self {
        self.finally.push(command.into());
        self
    }

    /// 是否包含需要等待应答的步骤
    pub fn waits(&self) -> bool {
        self.steps.iter().any(Step::waits)
    }
}

/// 按距离直行的时长换算
///
/// `inches / (满速英寸每秒 * |speed|)`，不超过 `timeout`；速度为 0 时取 `timeout`。
pub fn measured_move_duration(speed: f64, inches: f64, timeout: f64, full_speed: f64) -> f64 {
    let rate = full_speed * speed.abs();
    if rate <= f64::EPSILON {
        return timeout.max(0.0);
    }
    (inches.abs() / rate).min(timeout.max(0.0))
}

/// 生成执行计划
///
/// 解释器自身处理的关键字（`DELAY`、`BEGIN`、`MESSAGE` 等）与退役关键字返回 `None`。
pub fn plan(statement: &Statement<'_>, full_speed_inches_per_sec: f64) -> Option<Plan> {
    let p = |i| statement.param(i);
    let plan = match statement.keyword {
        Keyword::Mode
        | Keyword::Debug
        | Keyword::Message
        | Keyword::Begin
        | Keyword::End
        | Keyword::Delay
        | Keyword::StartToteUp
        | Keyword::ToteExtend
        | Keyword::ToteRetract => return None,

        Keyword::Move => Plan::post(DrivetrainCommand::AutoMove {
            left: p(0),
            right: p(1),
        }),
        Keyword::MeasuredMove => {
            let duration = measured_move_duration(p(0), p(1), p(2), full_speed_inches_per_sec);
            Plan::wait(
                DrivetrainCommand::DriveStraight {
                    speed: p(0),
                    duration,
                },
                Some(duration),
            )
        },
        Keyword::Turn => Plan::wait(
            DrivetrainCommand::Turn {
                angle: p(0),
                timeout: p(1),
            },
            Some(p(1)),
        ),
        Keyword::Straight => Plan::wait(
            DrivetrainCommand::DriveStraight {
                speed: p(0),
                duration: p(1),
            },
            Some(p(1)),
        ),
        Keyword::ClawOpen => Plan::post(ClawCommand::Open),
        Keyword::ClawClose => Plan::post(ClawCommand::Close),
        // CLAWTOBOTTOM 沿用比赛代码的行为：与 CLAWTOTOP 发送同一命令
        Keyword::ClawToTop | Keyword::ClawToBottom => Plan::wait(LifterCommand::ClawToTop, None),
        Keyword::RaiseCanLoMid => Plan::post(LifterCommand::RaiseLoMid),
        Keyword::LowerCanHiMid => Plan::post(LifterCommand::LowerHiMid),
        Keyword::StackUp => Plan::wait(
            LifterCommand::RaiseTotes {
                count: statement.int_param(0),
            },
            None,
        )
        .then_always(ConveyorCommand::Stop),
        Keyword::StackDown => Plan::post(LifterCommand::LowerTotes),
        Keyword::StartStackUp => Plan::post(LifterCommand::StartRaiseTotes {
            count: statement.int_param(0),
        }),
        Keyword::CanLiftStop => Plan::post(LifterCommand::Stop),
        Keyword::FrontLoadTote => {
            Plan::wait(ConveyorCommand::FrontLoadTote { timeout: p(0) }, Some(p(0)))
        },
        Keyword::BackLoadTote => {
            Plan::wait(ConveyorCommand::BackLoadTote { timeout: p(0) }, Some(p(0)))
        },
        Keyword::FrontSeekTote => Plan {
            steps: smallvec![
                Step::Post(DrivetrainCommand::StartDriveFwd { speed: p(0) }.into()),
                Step::Await {
                    command: ConveyorCommand::SeekToteFront { timeout: p(1) }.into(),
                    timeout: Some(p(1)),
                },
            ],
            finally: smallvec![DrivetrainCommand::Stop.into()],
        },
        Keyword::BackSeekTote => Plan {
            steps: smallvec![
                Step::Post(DrivetrainCommand::StartDriveBck { speed: p(0) }.into()),
                Step::Await {
                    command: ConveyorCommand::SeekToteBack { timeout: p(1) }.into(),
                    timeout: Some(p(1)),
                },
            ],
            finally: smallvec![DrivetrainCommand::Stop.into()],
        },
        Keyword::StartDriveFwd => Plan::post(DrivetrainCommand::StartDriveFwd { speed: p(0) }),
        Keyword::StartDriveBck => Plan::post(DrivetrainCommand::StartDriveBck { speed: p(0) }),
        Keyword::StopDrive => Plan::post(DrivetrainCommand::Stop),
        Keyword::WaitFrontBeam => Plan::wait(ConveyorCommand::WaitFrontBeam, None),
        Keyword::WaitBackBeam => Plan::wait(ConveyorCommand::WaitBackBeam, None),
        Keyword::DepositTotesBack => Plan::wait(ConveyorCommand::DepositTotesBck, None),
        Keyword::ToteShiftFwd => Plan::post(ConveyorCommand::ShiftTotesFwd),
        Keyword::ToteShiftBck => Plan::post(ConveyorCommand::ShiftTotesBck),
        Keyword::TotePushBck => Plan::post(ConveyorCommand::PushTotesBck),
        Keyword::CanArmOpen => Plan::post(CanArmCommand::Open { duration: p(0) }),
        Keyword::CanArmClose => Plan::post(CanArmCommand::Close { duration: p(0) }),
        Keyword::SeekTote => Plan::wait(
            DrivetrainCommand::SeekTote {
                time_in: p(0),
                timeout: p(1),
            },
            Some(p(1)),
        ),
        Keyword::CubeAuto => {
            if statement.int_param(0) != 0 {
                Plan::post(CubeCommand::AutoCycleStart)
            } else {
                Plan::post(CubeCommand::AutoCycleStop)
            }
        },
        Keyword::ClickerUp => Plan::post(CubeCommand::ClickerRaise),
        Keyword::ClickerDown => Plan::post(CubeCommand::ClickerLower),
    };
    Some(plan)
}
