//! 安全计时器（每个 Worker 一个的消息静默看门狗）
//!
//! Worker 每收到一条消息就重新计时；窗口内没有任何消息时，Worker 把输出强制归零。
//!
//! 时间通过 [`Clock`] 读取，以微秒存放在 `AtomicU64` 中，其他线程无需加锁即可查询静默时长。

use stacker_hal::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 消息静默看门狗
pub struct SafetyTimer {
    last_message: AtomicU64,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl SafetyTimer {
    /// 以当前时钟读数开始计时
    ///
    /// # 示例
    /// ```
    /// # use stacker_driver::SafetyTimer;
    /// # use stacker_hal::SystemClock;
    /// # use std::sync::Arc;
    /// # use std::time::Duration;
    /// let timer = SafetyTimer::new(Duration::from_secs(30), Arc::new(SystemClock));
    /// assert!(!timer.is_expired());
    /// ```
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now().as_micros() as u64;
        Self {
            last_message: AtomicU64::new(now),
            window,
            clock,
        }
    }

    /// 记录收到一条消息
    pub fn register_message(&self) {
        let now = self.now_micros();
        self.last_message.store(now, Ordering::Relaxed);
    }

    /// 超过窗口仍无消息
    pub fn is_expired(&self) -> bool {
        self.time_since_last_message() > self.window
    }

    /// 距上一条消息的时长
    pub fn time_since_last_message(&self) -> Duration {
        let last_us = self.last_message.load(Ordering::Relaxed);
        Duration::from_micros(self.now_micros().saturating_sub(last_us))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn now_micros(&self) -> u64 {
        self.clock.now().as_micros() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_hal::mock::ManualClock;

    #[test]
    fn test_initially_armed() {
        let clock = ManualClock::new();
        let timer = SafetyTimer::new(Duration::from_secs(30), Arc::new(clock));
        assert!(!timer.is_expired());
        assert_eq!(timer.time_since_last_message(), Duration::ZERO);
    }

    #[test]
    fn test_expires_after_window() {
        let clock = ManualClock::new();
        let timer = SafetyTimer::new(Duration::from_secs(30), Arc::new(clock.clone()));

        clock.advance_secs(30.0);
        assert!(!timer.is_expired(), "exactly at the window is still alive");

        clock.advance_secs(0.1);
        assert!(timer.is_expired());
    }

    #[test]
    fn test_message_rearms() {
        let clock = ManualClock::new();
        let timer = SafetyTimer::new(Duration::from_secs(30), Arc::new(clock.clone()));

        clock.advance_secs(29.0);
        timer.register_message();
        clock.advance_secs(29.0);
        assert!(!timer.is_expired());
        assert_eq!(timer.time_since_last_message(), Duration::from_secs(29));
    }
}
