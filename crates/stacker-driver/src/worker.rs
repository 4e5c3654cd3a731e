//! Worker：邮箱 + 节拍循环 + 安全窗口
//!
//! 每个子系统实现 [`Controller`]，由通用的 [`WorkerCore`] 驱动：
//!
//! 1. 取一条消息（闭环行为激活时最多等待一个节拍，空闲时等待轮询间隔）
//! 2. 重新武装安全窗口，调用控制器处理
//! 3. 运行一次闭环迭代（[`Controller::tick`]）
//! 4. 检查安全窗口，超时则强制输出归零
//!
//! [`WorkerCore`] 本身不含线程，测试可以配合手动时钟同步驱动；
//! [`Worker`] 把它放到独立线程上运行。

use crate::error::DriverError;
use crate::mailbox::{self, Envelope, Mailbox};
use crate::metrics::{MetricsSnapshot, WorkerMetrics};
use crate::telemetry::Throttle;
use crate::watchdog::SafetyTimer;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use stacker_hal::{Clock, TelemetrySink};
use stacker_protocol::{AutonomousCommand, ReplyTo, Response, RobotMode, Subsystem};
use stacker_tools::WorkerConfig;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// 一次处理/节拍的上下文
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    /// 时钟读数
    pub now: Duration,
    /// Worker 当前记录的机器人模式
    pub mode: RobotMode,
}

impl TickContext {
    pub fn is_autonomous(&self) -> bool {
        self.mode.is_autonomous()
    }

    /// 自 `start` 以来经过的秒数
    pub fn elapsed_since(&self, start: Duration) -> f64 {
        self.now.saturating_sub(start).as_secs_f64()
    }
}

/// 子系统控制器
///
/// 控制器独占自己的硬件，只在所属 Worker 线程上被调用。
///
/// # 应答约定
///
/// [`Controller::handle`] 收到的 `reply` 若在返回时仍为 `Some`，
/// Worker 会立即回送 OK。需要等待物理事件的命令应 `take()` 走应答目的地，
/// 在完成、超时或被抢占时自行回送。
pub trait Controller: Send + 'static {
    type Command: fmt::Debug + Send + 'static;
    type Status: fmt::Debug + Clone + Default + Send + Sync + 'static;

    /// 子系统身份
    const SUBSYSTEM: Subsystem;

    /// 处理一条命令
    fn handle(&mut self, command: Self::Command, reply: &mut Option<ReplyTo>, ctx: &TickContext);

    /// 模式切换（`ctx.mode` 为新模式）
    ///
    /// 必须把执行器置于安全状态并清除进行中的闭环/悬停行为。
    fn on_mode_change(&mut self, ctx: &TickContext);

    /// 自动阶段生命周期
    fn on_autonomous(&mut self, command: AutonomousCommand, ctx: &TickContext) {
        let _ = (command, ctx);
    }

    /// 一次闭环迭代
    fn tick(&mut self, ctx: &TickContext);

    /// 是否有需要按节拍推进的行为
    fn is_active(&self) -> bool;

    /// 控制器自身的周期行为是否视为"有流量"（重新武装安全窗口）
    fn keeps_alive(&self) -> bool {
        false
    }

    /// 安全窗口超时或 Worker 退出：输出归零，取消进行中的操作
    fn fail_safe(&mut self, ctx: &TickContext);

    /// 对外可见的状态快照
    fn status(&self) -> Self::Status;

    /// 周期性遥测
    fn publish(&self, sink: &dyn TelemetrySink) {
        let _ = sink;
    }
}

/// 回送应答；调用方已放弃等待时只记录日志
pub(crate) fn respond(reply: Option<ReplyTo>, response: Response) {
    if let Some(reply) = reply
        && reply.send(response).is_err()
    {
        debug!(
            "{}: caller stopped waiting, {:?} discarded",
            response.source, response.outcome
        );
    }
}

/// Worker 状态快照
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus<S> {
    pub mode: RobotMode,
    /// 是否有闭环行为在运行
    pub active: bool,
    /// 安全窗口是否已触发（收到下一条消息后清除）
    pub safety_tripped: bool,
    /// 子系统自身状态
    pub detail: S,
}

/// Worker 核心（无线程）
pub struct WorkerCore<C: Controller> {
    controller: C,
    mode: RobotMode,
    clock: Arc<dyn Clock>,
    safety: Arc<SafetyTimer>,
    safety_tripped: bool,
    metrics: Arc<WorkerMetrics>,
    status: Arc<ArcSwap<WorkerStatus<C::Status>>>,
    telemetry: Arc<dyn TelemetrySink>,
    throttle: Throttle,
}

impl<C: Controller> WorkerCore<C> {
    pub fn new(
        controller: C,
        clock: Arc<dyn Clock>,
        telemetry: Arc<dyn TelemetrySink>,
        config: &WorkerConfig,
    ) -> Self {
        let safety = Arc::new(SafetyTimer::new(config.safety_timeout(), clock.clone()));
        let status = Arc::new(ArcSwap::from_pointee(WorkerStatus {
            mode: RobotMode::Unknown,
            active: controller.is_active(),
            safety_tripped: false,
            detail: controller.status(),
        }));
        Self {
            controller,
            mode: RobotMode::Unknown,
            clock,
            safety,
            safety_tripped: false,
            metrics: Arc::new(WorkerMetrics::new()),
            status,
            telemetry,
            throttle: Throttle::new(config.telemetry_period()),
        }
    }

    pub fn context(&self) -> TickContext {
        TickContext {
            now: self.clock.now(),
            mode: self.mode,
        }
    }

    /// 处理一条投递
    pub fn dispatch(&mut self, envelope: Envelope<C::Command>) {
        self.metrics.messages_received.fetch_add(1, Ordering::Relaxed);
        self.safety.register_message();
        self.safety_tripped = false;

        match envelope {
            Envelope::Mode(mode) => {
                if mode != self.mode {
                    info!("{}: mode {} -> {}", C::SUBSYSTEM, self.mode, mode);
                }
                self.mode = mode;
                self.metrics.mode_changes.fetch_add(1, Ordering::Relaxed);
                let ctx = self.context();
                self.controller.on_mode_change(&ctx);
            },
            Envelope::Autonomous(command) => {
                debug!("{}: autonomous {:?}", C::SUBSYSTEM, command);
                let ctx = self.context();
                self.controller.on_autonomous(command, &ctx);
            },
            Envelope::Command { command, mut reply } => {
                debug!("{}: {:?}", C::SUBSYSTEM, command);
                let ctx = self.context();
                self.controller.handle(command, &mut reply, &ctx);
                if reply.is_some() {
                    self.metrics.immediate_acks.fetch_add(1, Ordering::Relaxed);
                    respond(reply, Response::ok(C::SUBSYSTEM));
                }
            },
        }

        self.store_status();
    }

    /// 一次节拍：闭环迭代 + 安全检查 + 节流遥测
    pub fn tick(&mut self) {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        if self.controller.keeps_alive() {
            self.safety.register_message();
        }

        let ctx = self.context();
        self.controller.tick(&ctx);

        if !self.safety_tripped && self.safety.is_expired() {
            warn!(
                "{}: no message for {:?}, forcing outputs to neutral",
                C::SUBSYSTEM,
                self.safety.time_since_last_message()
            );
            self.controller.fail_safe(&ctx);
            self.safety_tripped = true;
            self.metrics.safety_trips.fetch_add(1, Ordering::Relaxed);
        }

        if self.throttle.ready(ctx.now) {
            self.controller.publish(self.telemetry.as_ref());
        }

        self.store_status();
    }

    /// Worker 退出前调用：输出归零
    pub fn shutdown(&mut self) {
        let ctx = self.context();
        self.controller.fail_safe(&ctx);
        self.store_status();
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn mode(&self) -> RobotMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.controller.is_active()
    }

    pub fn is_safety_tripped(&self) -> bool {
        self.safety_tripped
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    pub fn safety(&self) -> &Arc<SafetyTimer> {
        &self.safety
    }

    /// 最近一次发布的状态
    pub fn status(&self) -> Arc<WorkerStatus<C::Status>> {
        self.status.load_full()
    }

    fn store_status(&self) {
        self.status.store(Arc::new(WorkerStatus {
            mode: self.mode,
            active: self.controller.is_active(),
            safety_tripped: self.safety_tripped,
            detail: self.controller.status(),
        }));
    }
}

/// Extension trait for timeout-capable thread joins
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // Watchdog thread joins the target; we wait on the channel with a timeout
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 运行在独立线程上的 Worker
///
/// `CommandStation` 持有邮箱的克隆，可能比 Worker 活得更久，
/// 因此线程通过 `is_running` 标志退出，而不是等待邮箱断开。
pub struct Worker<C: Controller> {
    mailbox: Mailbox<C::Command>,
    status: Arc<ArcSwap<WorkerStatus<C::Status>>>,
    metrics: Arc<WorkerMetrics>,
    safety: Arc<SafetyTimer>,
    is_running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl<C: Controller> Worker<C> {
    /// 启动 Worker 线程
    ///
    /// # 错误
    ///
    /// 线程创建失败时返回 [`DriverError::WorkerThread`]。
    pub fn spawn(core: WorkerCore<C>, config: &WorkerConfig) -> Result<Self, DriverError> {
        let metrics = core.metrics.clone();
        let status = core.status.clone();
        let safety = core.safety.clone();
        let (mailbox, rx) = mailbox::channel(C::SUBSYSTEM, config.mailbox_capacity, metrics.clone());

        let is_running = Arc::new(AtomicBool::new(true));
        let is_running_loop = is_running.clone();
        let tick_interval = config.tick_interval();
        let idle_poll = config.idle_poll();

        let thread = thread::Builder::new()
            .name(format!("stacker-{}", C::SUBSYSTEM))
            .spawn(move || worker_loop(core, rx, is_running_loop, tick_interval, idle_poll))
            .map_err(|e| DriverError::WorkerThread(e.to_string()))?;

        info!("{} worker started", C::SUBSYSTEM);

        Ok(Self {
            mailbox,
            status,
            metrics,
            safety,
            is_running,
            thread: Some(thread),
        })
    }

    pub fn mailbox(&self) -> &Mailbox<C::Command> {
        &self.mailbox
    }

    /// 最近一次发布的状态（无锁读取）
    pub fn status(&self) -> Arc<WorkerStatus<C::Status>> {
        self.status.load_full()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn time_since_last_message(&self) -> Duration {
        self.safety.time_since_last_message()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<C: Controller> Drop for Worker<C> {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        let join_timeout = Duration::from_secs(2);
        if let Some(handle) = self.thread.take()
            && let Err(_e) = handle.join_timeout(join_timeout)
        {
            error!(
                "{} worker panicked or failed to shut down within {:?}",
                C::SUBSYSTEM,
                join_timeout
            );
        }
    }
}

fn worker_loop<C: Controller>(
    mut core: WorkerCore<C>,
    rx: Receiver<Envelope<C::Command>>,
    is_running: Arc<AtomicBool>,
    tick_interval: Duration,
    idle_poll: Duration,
) {
    // 设置线程优先级（可选 feature）
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("{} worker priority set to MAX (realtime)", C::SUBSYSTEM);
            },
            Err(e) => {
                warn!(
                    "Failed to set {} worker priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    C::SUBSYSTEM,
                    e
                );
            },
        }
    }

    loop {
        // Acquire: If we see false, we must see all cleanup writes from other threads
        if !is_running.load(Ordering::Acquire) {
            trace!("{} worker: is_running flag is false, exiting", C::SUBSYSTEM);
            break;
        }

        let wait = if core.is_active() {
            tick_interval
        } else {
            idle_poll
        };

        match rx.recv_timeout(wait) {
            Ok(envelope) => core.dispatch(envelope),
            Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => {
                trace!("{} worker: mailbox disconnected, exiting", C::SUBSYSTEM);
                break;
            },
        }

        core.tick();
    }

    core.shutdown();
    info!("{} worker stopped", C::SUBSYSTEM);
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_hal::NullTelemetry;
    use stacker_hal::mock::ManualClock;
    use stacker_protocol::FailureReason;

    /// 计数控制器：记录调用，`Hold` 命令持有应答直到下一个节拍
    #[derive(Default)]
    struct Counter {
        handled: Vec<u32>,
        ticks: u32,
        fail_safes: u32,
        mode_changes: u32,
        held: Option<ReplyTo>,
        output: f64,
    }

    #[derive(Debug)]
    enum CounterCommand {
        Set(u32),
        Hold,
    }

    impl Controller for Counter {
        type Command = CounterCommand;
        type Status = f64;
        const SUBSYSTEM: Subsystem = Subsystem::Fan;

        fn handle(&mut self, command: CounterCommand, reply: &mut Option<ReplyTo>, _ctx: &TickContext) {
            match command {
                CounterCommand::Set(v) => {
                    self.handled.push(v);
                    self.output = 1.0;
                },
                CounterCommand::Hold => self.held = reply.take(),
            }
        }

        fn on_mode_change(&mut self, _ctx: &TickContext) {
            self.mode_changes += 1;
            self.output = 0.0;
        }

        fn tick(&mut self, _ctx: &TickContext) {
            self.ticks += 1;
            respond(self.held.take(), Response::error(Subsystem::Fan, FailureReason::Timeout));
        }

        fn is_active(&self) -> bool {
            self.held.is_some()
        }

        fn fail_safe(&mut self, _ctx: &TickContext) {
            self.fail_safes += 1;
            self.output = 0.0;
        }

        fn status(&self) -> f64 {
            self.output
        }
    }

    fn core() -> (WorkerCore<Counter>, ManualClock) {
        let clock = ManualClock::new();
        let core = WorkerCore::new(
            Counter::default(),
            Arc::new(clock.clone()),
            Arc::new(NullTelemetry),
            &WorkerConfig::default(),
        );
        (core, clock)
    }

    #[test]
    fn test_immediate_ack() {
        let (mut core, _) = core();
        let (reply, rx) = ReplyTo::channel();
        core.dispatch(Envelope::Command {
            command: CounterCommand::Set(7),
            reply: Some(reply),
        });
        assert!(rx.try_recv().unwrap().is_ok());
        assert_eq!(core.controller().handled, vec![7]);
        assert_eq!(core.metrics().snapshot().immediate_acks, 1);
        assert_eq!(core.status().detail, 1.0);
    }

    #[test]
    fn test_held_reply_answered_by_controller() {
        let (mut core, _) = core();
        let (reply, rx) = ReplyTo::channel();
        core.dispatch(Envelope::Command {
            command: CounterCommand::Hold,
            reply: Some(reply),
        });
        assert!(rx.try_recv().is_err(), "no immediate ack for held reply");
        assert!(core.is_active());

        core.tick();
        let response = rx.try_recv().unwrap();
        assert_eq!(response.outcome, stacker_protocol::Outcome::Error(FailureReason::Timeout));
    }

    #[test]
    fn test_mode_change_reaches_controller() {
        let (mut core, _) = core();
        core.dispatch(Envelope::command(CounterCommand::Set(1)));
        core.dispatch(Envelope::Mode(RobotMode::Disabled));
        assert_eq!(core.mode(), RobotMode::Disabled);
        assert_eq!(core.controller().mode_changes, 1);
        assert_eq!(core.status().detail, 0.0);
        assert_eq!(core.status().mode, RobotMode::Disabled);
    }

    #[test]
    fn test_safety_window_trips_once() {
        let (mut core, clock) = core();
        core.dispatch(Envelope::command(CounterCommand::Set(1)));

        clock.advance_secs(29.0);
        core.tick();
        assert_eq!(core.controller().fail_safes, 0);

        clock.advance_secs(1.5);
        core.tick();
        core.tick();
        assert_eq!(core.controller().fail_safes, 1);
        assert!(core.is_safety_tripped());
        assert_eq!(core.metrics().snapshot().safety_trips, 1);

        // 新消息重新武装
        core.dispatch(Envelope::command(CounterCommand::Set(2)));
        assert!(!core.is_safety_tripped());
    }

    #[test]
    fn test_threaded_worker_round_trip() {
        let (core, _) = core();
        let worker = Worker::spawn(core, &WorkerConfig::default()).unwrap();
        assert!(worker.is_running());

        let (reply, rx) = ReplyTo::channel();
        worker
            .mailbox()
            .post(Envelope::Command {
                command: CounterCommand::Set(3),
                reply: Some(reply),
            })
            .unwrap();
        let response = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(response.is_ok());
        assert_eq!(worker.metrics().messages_received, 1);

        let mailbox = worker.mailbox().clone();
        drop(worker);
        // 邮箱仍可用，但投递到已退出的 Worker 会失败
        assert!(matches!(
            mailbox.post(Envelope::Mode(RobotMode::Disabled)),
            Err(DriverError::ChannelClosed)
        ));
    }
}
