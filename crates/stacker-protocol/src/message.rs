//! 消息与应答
//!
//! `Message` 由调用方构造，投递到目标 Worker 的 Mailbox 后被消费一次。
//! 需要应答的命令携带一个 [`ReplyTo`]，Worker 完成有界操作后通过它回送 [`Response`]。

use crate::ProtocolError;
use crate::command::{Command, Subsystem};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::fmt;

/// 失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureReason {
    /// 有界操作超过了允许时间
    Timeout,
    /// 被后续命令（如 STOP）抢占
    Preempted,
    /// 模式切换中止了操作
    ModeChanged,
    /// 安全保护（过流/看门狗）中止了操作
    SafetyTrip,
    /// 当前状态下命令不可执行
    Rejected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureReason::Timeout => "timeout",
            FailureReason::Preempted => "preempted",
            FailureReason::ModeChanged => "mode changed",
            FailureReason::SafetyTrip => "safety trip",
            FailureReason::Rejected => "rejected",
        };
        f.write_str(text)
    }
}

/// 应答结果（RESPONSE_OK / RESPONSE_ERROR）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Outcome {
    Ok,
    Error(FailureReason),
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }
}

/// 应答消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Response {
    /// 发出应答的子系统
    pub source: Subsystem,
    /// 结果
    pub outcome: Outcome,
}

impl Response {
    pub fn ok(source: Subsystem) -> Self {
        Self {
            source,
            outcome: Outcome::Ok,
        }
    }

    pub fn error(source: Subsystem, reason: FailureReason) -> Self {
        Self {
            source,
            outcome: Outcome::Error(reason),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// 应答目的地
///
/// 包装一个容量为 1 的发送端。`send` 按值消费自身，保证每条消息最多应答一次。
#[derive(Debug)]
pub struct ReplyTo {
    tx: Sender<Response>,
}

impl ReplyTo {
    /// 创建应答通道
    ///
    /// 返回 (应答目的地, 调用方持有的接收端)。
    pub fn channel() -> (ReplyTo, Receiver<Response>) {
        let (tx, rx) = bounded(1);
        (ReplyTo { tx }, rx)
    }

    /// 发送应答
    ///
    /// # 错误
    ///
    /// 调用方已经放弃等待（接收端被丢弃）时返回 [`ProtocolError::ReplyDropped`]。
    pub fn send(self, response: Response) -> Result<(), ProtocolError> {
        self.tx
            .try_send(response)
            .map_err(|_| ProtocolError::ReplyDropped)
    }
}

/// 总线消息
///
/// 构造后不可变：字段只读，只能通过 [`Message::into_parts`] 整体拆出。
#[derive(Debug)]
pub struct Message {
    command: Command,
    reply_to: Option<ReplyTo>,
}

impl Message {
    /// 创建不需要应答的消息
    pub fn new(command: impl Into<Command>) -> Self {
        Self {
            command: command.into(),
            reply_to: None,
        }
    }

    /// 创建需要应答的消息
    pub fn with_reply(command: impl Into<Command>, reply_to: ReplyTo) -> Self {
        Self {
            command: command.into(),
            reply_to: Some(reply_to),
        }
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// 拆分为命令与应答目的地
    pub fn into_parts(self) -> (Command, Option<ReplyTo>) {
        (self.command, self.reply_to)
    }
}
