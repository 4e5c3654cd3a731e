//! CommandStation：按目标子系统路由命令
//!
//! 持有每个 Worker 邮箱的克隆，可以自由克隆并跨线程共享（解释器线程、驾驶员循环）。
//!
//! # 两种发送方式
//!
//! - [`CommandStation::send_no_wait`]: 投递后立即返回，成功只表示"已入队"
//! - [`CommandStation::send_and_wait`]: 投递后阻塞等待应答，最多 `timeout`；
//!   超时不会取消 Worker 上进行中的操作（由 Worker 自己的超时与安全逻辑收尾）

use crate::error::DriverError;
use crate::mailbox::{Envelope, Mailbox};
use crossbeam_channel::RecvTimeoutError;
use stacker_protocol::{
    AutonomousCommand, CanArmCommand, ClawCommand, Command, ConveyorCommand, CubeCommand,
    DrivetrainCommand, FanCommand, LifterCommand, Message, ReplyTo, Response, RobotMode,
    Subsystem,
};
use std::time::Duration;
use tracing::{debug, warn};

/// 命令路由
#[derive(Clone, Default)]
pub struct CommandStation {
    pub(crate) drivetrain: Option<Mailbox<DrivetrainCommand>>,
    pub(crate) conveyor: Option<Mailbox<ConveyorCommand>>,
    pub(crate) lifter: Option<Mailbox<LifterCommand>>,
    pub(crate) claw: Option<Mailbox<ClawCommand>>,
    pub(crate) canarm: Option<Mailbox<CanArmCommand>>,
    pub(crate) cube: Option<Mailbox<CubeCommand>>,
    pub(crate) fan: Option<Mailbox<FanCommand>>,
}

/// 对每个已装配的邮箱执行同一段代码
macro_rules! for_each_mailbox {
    ($station:expr, |$mailbox:ident| $body:expr) => {{
        let station = $station;
        if let Some($mailbox) = &station.drivetrain {
            $body;
        }
        if let Some($mailbox) = &station.conveyor {
            $body;
        }
        if let Some($mailbox) = &station.lifter {
            $body;
        }
        if let Some($mailbox) = &station.claw {
            $body;
        }
        if let Some($mailbox) = &station.canarm {
            $body;
        }
        if let Some($mailbox) = &station.cube {
            $body;
        }
        if let Some($mailbox) = &station.fan {
            $body;
        }
    }};
}

fn post_to<C>(
    mailbox: &Option<Mailbox<C>>,
    subsystem: Subsystem,
    command: C,
    reply: Option<ReplyTo>,
) -> Result<(), DriverError> {
    mailbox
        .as_ref()
        .ok_or(DriverError::SubsystemUnavailable(subsystem))?
        .post(Envelope::Command { command, reply })
}

impl CommandStation {
    /// 空路由（没有任何子系统）
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否装配了该子系统
    pub fn has(&self, subsystem: Subsystem) -> bool {
        match subsystem {
            Subsystem::Drivetrain => self.drivetrain.is_some(),
            Subsystem::Conveyor => self.conveyor.is_some(),
            Subsystem::Lifter => self.lifter.is_some(),
            Subsystem::Claw => self.claw.is_some(),
            Subsystem::CanArm => self.canarm.is_some(),
            Subsystem::Cube => self.cube.is_some(),
            Subsystem::Fan => self.fan.is_some(),
        }
    }

    /// 已装配的子系统
    pub fn subsystems(&self) -> Vec<Subsystem> {
        Subsystem::ALL
            .into_iter()
            .filter(|s| self.has(*s))
            .collect()
    }

    /// 投递一条消息
    ///
    /// 广播类命令（`State`、`Autonomous`）投递给所有 Worker，
    /// 若消息带应答目的地，全部入队后立即回送 OK。
    ///
    /// # 错误
    ///
    /// - [`DriverError::SubsystemUnavailable`]: 目标子系统未装配
    /// - [`DriverError::ChannelFull`] / [`DriverError::ChannelClosed`]: 邮箱投递失败
    ///   （广播时返回第一个失败，其余 Worker 仍会收到）
    pub fn post(&self, message: Message) -> Result<(), DriverError> {
        let (command, reply) = message.into_parts();
        match command {
            Command::State(mode) => {
                self.broadcast_mode(mode)?;
                self.acknowledge_broadcast(reply);
                Ok(())
            },
            Command::Autonomous(command) => {
                self.broadcast_autonomous(command)?;
                self.acknowledge_broadcast(reply);
                Ok(())
            },
            Command::Drivetrain(c) => post_to(&self.drivetrain, Subsystem::Drivetrain, c, reply),
            Command::Conveyor(c) => post_to(&self.conveyor, Subsystem::Conveyor, c, reply),
            Command::Lifter(c) => post_to(&self.lifter, Subsystem::Lifter, c, reply),
            Command::Claw(c) => post_to(&self.claw, Subsystem::Claw, c, reply),
            Command::CanArm(c) => post_to(&self.canarm, Subsystem::CanArm, c, reply),
            Command::Cube(c) => post_to(&self.cube, Subsystem::Cube, c, reply),
            Command::Fan(c) => post_to(&self.fan, Subsystem::Fan, c, reply),
        }
    }

    /// 投递命令，不等待完成
    ///
    /// # 示例
    ///
    /// ```rust
    /// use stacker_driver::{CommandStation, DriverError};
    /// use stacker_protocol::FanCommand;
    ///
    /// let station = CommandStation::new();
    /// let result = station.send_no_wait(FanCommand::Toggle);
    /// assert!(matches!(result, Err(DriverError::SubsystemUnavailable(_))));
    /// ```
    pub fn send_no_wait(&self, command: impl Into<Command>) -> Result<(), DriverError> {
        self.post(Message::new(command))
    }

    /// 投递命令并等待应答
    ///
    /// # 参数
    ///
    /// - `command`: 任意命令族的命令
    /// - `timeout`: 最长等待时间
    ///
    /// # 错误
    ///
    /// - [`DriverError::Timeout`]: 超时未收到应答（Worker 上的操作不会被取消）
    /// - [`DriverError::ChannelClosed`]: Worker 退出，应答永远不会到达
    /// - 以及 [`CommandStation::post`] 的所有错误
    ///
    /// 收到的 `Response` 原样返回，包括 ERROR 结果；是否把 ERROR 视为失败由调用方决定。
    pub fn send_and_wait(
        &self,
        command: impl Into<Command>,
        timeout: Duration,
    ) -> Result<Response, DriverError> {
        let command = command.into();
        let (reply, rx) = ReplyTo::channel();
        self.post(Message::with_reply(command, reply))?;

        match rx.recv_timeout(timeout) {
            Ok(response) => {
                debug!("{:?} answered {:?}", command, response.outcome);
                Ok(response)
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!("{:?}: no response within {:?}", command, timeout);
                Err(DriverError::Timeout)
            },
            Err(RecvTimeoutError::Disconnected) => Err(DriverError::ChannelClosed),
        }
    }

    /// 广播没有单一的应答方：全部入队即以第一个已装配子系统的名义确认
    fn acknowledge_broadcast(&self, reply: Option<ReplyTo>) {
        if let (Some(reply), Some(source)) = (reply, self.subsystems().first().copied())
            && reply.send(Response::ok(source)).is_err()
        {
            debug!("broadcast acknowledgement discarded");
        }
    }

    /// 向所有 Worker 广播模式切换
    ///
    /// # 错误
    ///
    /// 返回第一个投递失败；其余 Worker 仍会收到广播。
    pub fn broadcast_mode(&self, mode: RobotMode) -> Result<(), DriverError> {
        let mut first_error = None;
        for_each_mailbox!(self, |mailbox| {
            if let Err(e) = mailbox.post(Envelope::Mode(mode)) {
                warn!("{}: mode {} not delivered: {}", mailbox.subsystem(), mode, e);
                first_error.get_or_insert(e);
            }
        });
        first_error.map_or(Ok(()), Err)
    }

    /// 向所有 Worker 广播自动阶段生命周期命令
    ///
    /// # 错误
    ///
    /// 返回第一个投递失败；其余 Worker 仍会收到广播。
    pub fn broadcast_autonomous(&self, command: AutonomousCommand) -> Result<(), DriverError> {
        let mut first_error = None;
        for_each_mailbox!(self, |mailbox| {
            if let Err(e) = mailbox.post(Envelope::Autonomous(command)) {
                warn!("{}: {:?} not delivered: {}", mailbox.subsystem(), command, e);
                first_error.get_or_insert(e);
            }
        });
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for CommandStation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStation")
            .field("subsystems", &self.subsystems())
            .finish()
    }
}
