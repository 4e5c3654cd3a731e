//! 邮箱（每个 Worker 一个有界 FIFO 队列）
//!
//! 投递永不阻塞生产者：队列满时立即返回 [`DriverError::ChannelFull`]，
//! 已入队消息的顺序不受影响。

use crate::error::DriverError;
use crate::metrics::WorkerMetrics;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use stacker_protocol::{AutonomousCommand, ReplyTo, RobotMode, Subsystem};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::warn;

/// 邮箱中的一条投递
///
/// 模式切换和自动阶段命令是广播；`Command` 只投递给对应的 Worker。
#[derive(Debug)]
pub enum Envelope<C> {
    /// 模式切换（`STATE_*`）
    Mode(RobotMode),
    /// 自动阶段生命周期
    Autonomous(AutonomousCommand),
    /// 子系统命令，可选带应答目的地
    Command { command: C, reply: Option<ReplyTo> },
}

impl<C> Envelope<C> {
    /// 不需要应答的命令
    pub fn command(command: C) -> Self {
        Envelope::Command {
            command,
            reply: None,
        }
    }
}

/// 邮箱发送端
///
/// 可克隆，可以从任意线程并发投递。
pub struct Mailbox<C> {
    tx: Sender<Envelope<C>>,
    subsystem: Subsystem,
    metrics: Arc<WorkerMetrics>,
}

impl<C> Clone for Mailbox<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subsystem: self.subsystem,
            metrics: self.metrics.clone(),
        }
    }
}

impl<C> Mailbox<C> {
    /// 目标子系统
    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// 投递（非阻塞）
    ///
    /// # 错误
    ///
    /// - [`DriverError::ChannelFull`]: 队列已满，消息被丢弃
    /// - [`DriverError::ChannelClosed`]: Worker 已退出
    pub fn post(&self, envelope: Envelope<C>) -> Result<(), DriverError> {
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.metrics.mailbox_full.fetch_add(1, Ordering::Relaxed);
                warn!("{} mailbox full, message dropped", self.subsystem);
                Err(DriverError::ChannelFull)
            },
            Err(TrySendError::Disconnected(_)) => {
                self.metrics.mailbox_closed.fetch_add(1, Ordering::Relaxed);
                Err(DriverError::ChannelClosed)
            },
        }
    }

    /// 当前排队的消息数
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

/// 创建邮箱
///
/// 返回 (发送端, Worker 持有的接收端)。
pub fn channel<C>(
    subsystem: Subsystem,
    capacity: usize,
    metrics: Arc<WorkerMetrics>,
) -> (Mailbox<C>, Receiver<Envelope<C>>) {
    let (tx, rx) = bounded(capacity);
    (
        Mailbox {
            tx,
            subsystem,
            metrics,
        },
        rx,
    )
}
