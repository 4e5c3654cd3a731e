//! 遥测分发
//!
//! Worker 按固定周期（默认 0.2s）把派生状态写到 [`TelemetrySink`]。
//! 所有 sink 都在控制路径上被调用，因此必须非阻塞：
//! [`ChannelTelemetry`] 用有界通道 + `try_send`，队列满时丢弃记录而不是等待。
//!
//! # 使用示例
//!
//! ```rust
//! use stacker_driver::telemetry::{ChannelTelemetry, TelemetryHub};
//! use stacker_hal::TelemetrySink;
//! use std::sync::Arc;
//!
//! let mut hub = TelemetryHub::new();
//! let (sink, rx) = ChannelTelemetry::new();
//! hub.add_sink(Arc::new(sink));
//!
//! hub.publish("Gyro Angle", 12.5.into());
//! assert_eq!(rx.try_recv().unwrap().key, "Gyro Angle");
//! ```

use crossbeam_channel::{Receiver, Sender, bounded};
use stacker_hal::{TelemetrySink, TelemetryValue};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 遥测扇出
///
/// 装配阶段添加 sink，之后以 `Arc` 共享给所有 Worker（只读）。
#[derive(Default)]
pub struct TelemetryHub {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl TelemetryHub {
    #[must_use]
    pub const fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TelemetrySink for TelemetryHub {
    fn publish(&self, key: &str, value: TelemetryValue) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.publish(key, value.clone());
            }
            last.publish(key, value);
        }
    }
}

/// 一条遥测记录
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub key: String,
    pub value: TelemetryValue,
}

/// 把遥测转发到有界通道的 sink
pub struct ChannelTelemetry {
    tx: Sender<TelemetryRecord>,
    dropped: Arc<AtomicU64>,
}

impl ChannelTelemetry {
    /// 队列容量
    pub const CAPACITY: usize = 10_000;

    /// 创建 sink
    ///
    /// 返回 (sink, 消费端)。消费端应在独立线程读取。
    pub fn new() -> (Self, Receiver<TelemetryRecord>) {
        let (tx, rx) = bounded(Self::CAPACITY);
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// 丢弃计数（队列满或消费端已关闭）
    pub fn dropped(&self) -> &Arc<AtomicU64> {
        &self.dropped
    }
}

impl TelemetrySink for ChannelTelemetry {
    fn publish(&self, key: &str, value: TelemetryValue) {
        let record = TelemetryRecord {
            key: key.to_string(),
            value,
        };
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// 发布节流
///
/// 第一次询问总是放行，之后每个周期最多放行一次。
#[derive(Debug, Clone)]
pub struct Throttle {
    period: Duration,
    last: Option<Duration>,
}

impl Throttle {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// 当前时刻是否应该发布；放行时记录时间
    pub fn ready(&mut self, now: Duration) -> bool {
        match self.last {
            Some(last) if now.saturating_sub(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            },
        }
    }
}
