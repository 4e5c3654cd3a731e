//! Worker 运行指标
//!
//! 原子计数器，可以在任何线程读取，不引入锁竞争。
//! 发送端（邮箱满/关闭）与 Worker 线程（消息、节拍、安全触发）共享同一份实例。

use std::sync::atomic::{AtomicU64, Ordering};

/// 单个 Worker 的实时指标
///
/// # 使用示例
///
/// ```rust
/// use stacker_driver::WorkerMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = WorkerMetrics::default();
/// metrics.messages_received.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.messages_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// 收到的消息总数（含模式切换与自动阶段广播）
    pub messages_received: AtomicU64,

    /// 模式切换次数
    pub mode_changes: AtomicU64,

    /// 节拍次数
    pub ticks: AtomicU64,

    /// 安全窗口超时次数
    pub safety_trips: AtomicU64,

    /// 立即确认的应答数（命令不需要等待物理事件）
    pub immediate_acks: AtomicU64,

    /// 投递时邮箱已满的次数
    pub mailbox_full: AtomicU64,

    /// 投递时邮箱已关闭的次数
    pub mailbox_closed: AtomicU64,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            mode_changes: self.mode_changes.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            safety_trips: self.safety_trips.load(Ordering::Relaxed),
            immediate_acks: self.immediate_acks.load(Ordering::Relaxed),
            mailbox_full: self.mailbox_full.load(Ordering::Relaxed),
            mailbox_closed: self.mailbox_closed.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.messages_received.store(0, Ordering::Relaxed);
        self.mode_changes.store(0, Ordering::Relaxed);
        self.ticks.store(0, Ordering::Relaxed);
        self.safety_trips.store(0, Ordering::Relaxed);
        self.immediate_acks.store(0, Ordering::Relaxed);
        self.mailbox_full.store(0, Ordering::Relaxed);
        self.mailbox_closed.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub mode_changes: u64,
    pub ticks: u64,
    pub safety_trips: u64,
    pub immediate_acks: u64,
    pub mailbox_full: u64,
    pub mailbox_closed: u64,
}

impl MetricsSnapshot {
    /// 投递失败率（百分比）
    ///
    /// 没有任何投递记录时返回 0.0。
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.mailbox_full + self.mailbox_closed;
        let total = self.messages_received + dropped;
        if total == 0 {
            return 0.0;
        }
        dropped as f64 / total as f64 * 100.0
    }
}
