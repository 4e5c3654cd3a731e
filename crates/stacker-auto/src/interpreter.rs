//! 自动脚本解释器
//!
//! 每次 [`Interpreter::evaluate`] 处理一行：解析、等待暂停解除、执行。
//!
//! # 状态
//!
//! ```text
//! Running ──pause──▶ Paused ──resume──▶ Running
//!    │
//!    └── END / 未知关键字 / 缺少参数 / 应答失败或超时 / 中止 ──▶ Terminated（吸收态）
//! ```
//!
//! 暂停与中止通过 [`PauseGate`] 从其他线程控制。暂停只在语句之间生效；
//! 中止会打断 `DELAY` 与等待应答。

use crate::error::AutoError;
use crate::plan::{Plan, Step, plan};
use crate::token::{Keyword, Statement};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::{Condvar, Mutex};
use stacker_driver::{CommandStation, DriverError};
use stacker_protocol::{Command, Message, Outcome, ReplyTo, Response};
use stacker_tools::{AutonomousConfig, RobotConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 等待应答时检查中止标志的间隔
const ABORT_POLL: Duration = Duration::from_millis(50);

/// 命令出口
///
/// 解释器只依赖这一个方法；生产环境是 [`CommandStation`]，测试中可以替换为记录器。
pub trait CommandSink: Send + Sync {
    /// 投递一条消息
    fn post(&self, message: Message) -> Result<(), DriverError>;

    fn send_no_wait(&self, command: Command) -> Result<(), DriverError> {
        self.post(Message::new(command))
    }
}

impl CommandSink for CommandStation {
    fn post(&self, message: Message) -> Result<(), DriverError> {
        CommandStation::post(self, message)
    }
}

impl<T: CommandSink + ?Sized> CommandSink for Arc<T> {
    fn post(&self, message: Message) -> Result<(), DriverError> {
        (**self).post(message)
    }
}

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    aborted: bool,
}

/// 暂停/中止控制
///
/// 可克隆，所有克隆共享同一状态。等待方阻塞在条件变量上，
/// `resume`/`abort` 立即唤醒，不做忙等。
///
/// # 示例
///
/// ```rust
/// use stacker_auto::PauseGate;
///
/// let gate = PauseGate::new();
/// let remote = gate.clone();
/// remote.pause();
/// assert!(gate.is_paused());
/// remote.resume();
/// assert!(gate.wait_while_paused().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct PauseGate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.inner.0.lock().paused = true;
    }

    pub fn resume(&self) {
        let (state, cond) = &*self.inner;
        state.lock().paused = false;
        cond.notify_all();
    }

    /// 中止（不可撤销）
    pub fn abort(&self) {
        let (state, cond) = &*self.inner;
        state.lock().aborted = true;
        cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.0.lock().paused
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.0.lock().aborted
    }

    /// 暂停期间阻塞
    ///
    /// # 错误
    ///
    /// 已中止时返回 [`AutoError::Aborted`]。
    pub fn wait_while_paused(&self) -> Result<(), AutoError> {
        let (state, cond) = &*self.inner;
        let mut guard = state.lock();
        while guard.paused && !guard.aborted {
            cond.wait(&mut guard);
        }
        if guard.aborted {
            return Err(AutoError::Aborted);
        }
        Ok(())
    }

    /// 可被中止打断的睡眠
    ///
    /// # 错误
    ///
    /// 睡眠结束前被中止时返回 [`AutoError::Aborted`]。
    pub fn sleep(&self, duration: Duration) -> Result<(), AutoError> {
        let (state, cond) = &*self.inner;
        let deadline = Instant::now().checked_add(duration);
        let mut guard = state.lock();
        loop {
            if guard.aborted {
                return Err(AutoError::Aborted);
            }
            match deadline {
                Some(deadline) => {
                    if Instant::now() >= deadline {
                        return Ok(());
                    }
                    cond.wait_until(&mut guard, deadline);
                },
                None => cond.wait(&mut guard),
            }
        }
    }
}

/// 单条语句的控制流结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// 继续下一行
    Continue,
    /// 脚本正常结束（`END`）
    Done,
}

/// 解释器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpreterState {
    Running,
    Paused,
    Terminated,
}

/// 自动脚本解释器
pub struct Interpreter<S: CommandSink> {
    sink: S,
    gate: PauseGate,
    timing: AutonomousConfig,
    full_speed_inches_per_sec: f64,
    debug: bool,
    terminated: bool,
    last_response: Option<Response>,
    statements: usize,
}

impl<S: CommandSink> Interpreter<S> {
    /// 创建解释器
    ///
    /// # 参数
    ///
    /// - `sink`: 命令出口，通常是 [`CommandStation`]
    /// - `config`: 使用其中的应答超时与底盘满速标定
    pub fn new(sink: S, config: &RobotConfig) -> Self {
        Self {
            sink,
            gate: PauseGate::new(),
            timing: config.autonomous.clone(),
            full_speed_inches_per_sec: config.drivetrain.full_speed_inches_per_sec,
            debug: false,
            terminated: false,
            last_response: None,
            statements: 0,
        }
    }

    /// 使用外部持有的暂停/中止控制
    pub fn with_gate(mut self, gate: PauseGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    pub fn state(&self) -> InterpreterState {
        if self.terminated {
            InterpreterState::Terminated
        } else if self.gate.is_paused() {
            InterpreterState::Paused
        } else {
            InterpreterState::Running
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// 最近一次等待到的应答
    pub fn last_response(&self) -> Option<Response> {
        self.last_response
    }

    /// 已执行的语句数（不含空行与注释）
    pub fn statements(&self) -> usize {
        self.statements
    }

    /// 解释一行
    ///
    /// # 返回
    ///
    /// - `Ok(Flow::Continue)`: 继续下一行（包括空行与注释）
    /// - `Ok(Flow::Done)`: 遇到 `END`，解释器进入终止态
    ///
    /// # 错误
    ///
    /// 任何错误都会使解释器进入终止态；之后的调用返回 [`AutoError::Terminated`]。
    ///
    /// # 示例
    ///
    /// ```rust
    /// use stacker_auto::{Flow, Interpreter};
    /// use stacker_driver::CommandStation;
    /// use stacker_tools::RobotConfig;
    ///
    /// let mut interpreter = Interpreter::new(CommandStation::new(), &RobotConfig::default());
    /// assert_eq!(interpreter.evaluate("# setup").unwrap(), Flow::Continue);
    /// assert!(interpreter.evaluate("BOGUSTOKEN").is_err());
    /// assert!(interpreter.is_terminated());
    /// ```
    pub fn evaluate(&mut self, line: &str) -> Result<Flow, AutoError> {
        if self.terminated {
            return Err(AutoError::Terminated);
        }

        let statement = match Statement::parse(line) {
            Ok(Some(statement)) => statement,
            Ok(None) => return Ok(Flow::Continue),
            Err(e) => return Err(self.terminate(line.trim(), e)),
        };

        if let Err(e) = self.gate.wait_while_paused() {
            return Err(self.terminate(statement.text, e));
        }

        self.statements += 1;
        if self.debug {
            info!("evaluating \"{}\"", statement.text);
        }

        match self.execute(&statement) {
            Ok(Flow::Done) => {
                self.terminated = true;
                info!("script finished at \"{}\"", statement.text);
                Ok(Flow::Done)
            },
            Ok(Flow::Continue) => Ok(Flow::Continue),
            Err(e) => Err(self.terminate(statement.text, e)),
        }
    }

    fn terminate(&mut self, statement: &str, err: AutoError) -> AutoError {
        self.terminated = true;
        error!("script terminated at \"{}\": {}", statement, err);
        err
    }

    fn execute(&mut self, statement: &Statement<'_>) -> Result<Flow, AutoError> {
        let keyword = statement.keyword;
        match keyword {
            Keyword::Mode | Keyword::Begin => {
                debug!("{} {}", keyword, statement.rest);
                Ok(Flow::Continue)
            },
            Keyword::End => Ok(Flow::Done),
            Keyword::Delay => {
                let secs = statement.param(0).max(0.0);
                let duration = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
                debug!("DELAY {:?}", duration);
                self.gate.sleep(duration)?;
                Ok(Flow::Continue)
            },
            Keyword::Message => {
                info!("MESSAGE: {}", statement.rest);
                Ok(Flow::Continue)
            },
            Keyword::Debug => {
                self.debug = statement.int_param(0) != 0;
                info!("debug {}", if self.debug { "on" } else { "off" });
                Ok(Flow::Continue)
            },
            _ if keyword.is_retired() => {
                warn!("{} is retired, ignoring \"{}\"", keyword, statement.text);
                Ok(Flow::Continue)
            },
            _ => {
                if let Some(plan) = plan(statement, self.full_speed_inches_per_sec) {
                    self.run_plan(keyword, plan)?;
                }
                Ok(Flow::Continue)
            },
        }
    }

    fn run_plan(&mut self, keyword: Keyword, plan: Plan) -> Result<(), AutoError> {
        let result = plan
            .steps
            .iter()
            .try_for_each(|step| self.run_step(keyword, *step));

        for command in plan.finally {
            if let Err(e) = self.sink.send_no_wait(command) {
                warn!("{}: cleanup {:?} not delivered: {}", keyword, command, e);
            }
        }
        result
    }

    fn run_step(&mut self, keyword: Keyword, step: Step) -> Result<(), AutoError> {
        match step {
            Step::Post(command) => {
                self.sink.send_no_wait(command)?;
                Ok(())
            },
            Step::Await { command, timeout } => {
                let timeout = self.timing.response_timeout(timeout);
                self.await_response(keyword, command, timeout)
            },
        }
    }

    /// 投递并等待应答，期间按 [`ABORT_POLL`] 检查中止
    fn await_response(
        &mut self,
        keyword: Keyword,
        command: Command,
        timeout: Duration,
    ) -> Result<(), AutoError> {
        let (reply, rx) = ReplyTo::channel();
        self.sink.post(Message::with_reply(command, reply))?;
        let deadline = Instant::now().checked_add(timeout);

        loop {
            if self.gate.is_aborted() {
                return Err(AutoError::Aborted);
            }
            let slice = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(AutoError::ResponseTimeout {
                            keyword: keyword.text(),
                            timeout,
                        });
                    }
                    remaining.min(ABORT_POLL)
                },
                None => ABORT_POLL,
            };

            match rx.recv_timeout(slice) {
                Ok(response) => {
                    self.last_response = Some(response);
                    if self.debug {
                        info!("{} answered {:?}", keyword, response.outcome);
                    }
                    return match response.outcome {
                        Outcome::Ok => Ok(()),
                        Outcome::Error(reason) => Err(AutoError::CommandFailed {
                            keyword: keyword.text(),
                            subsystem: response.source,
                            reason,
                        }),
                    };
                },
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(AutoError::Driver(DriverError::ChannelClosed));
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stacker_protocol::{
        ConveyorCommand, DrivetrainCommand, FailureReason, LifterCommand, Subsystem,
    };
    use std::thread;

    /// 记录所有投递的命令；需要应答的命令按预设结果立即应答
    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<Command>>,
        outcome: Mutex<Option<Outcome>>,
    }

    impl Recorder {
        fn answering(outcome: Outcome) -> Arc<Self> {
            let recorder = Self::default();
            *recorder.outcome.lock() = Some(outcome);
            Arc::new(recorder)
        }

        fn posted(&self) -> Vec<Command> {
            self.posted.lock().clone()
        }
    }

    impl CommandSink for Recorder {
        fn post(&self, message: Message) -> Result<(), DriverError> {
            let (command, reply) = message.into_parts();
            self.posted.lock().push(command);
            if let (Some(reply), Some(outcome)) = (reply, *self.outcome.lock()) {
                let source = command.target().unwrap_or(Subsystem::Drivetrain);
                let _ = reply.send(Response { source, outcome });
            }
            Ok(())
        }
    }

    fn interpreter(sink: Arc<Recorder>) -> Interpreter<Arc<Recorder>> {
        Interpreter::new(sink, &RobotConfig::default())
    }

    #[test]
    fn test_blank_and_comment_post_nothing() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink.clone());
        assert_eq!(interp.evaluate("").unwrap(), Flow::Continue);
        assert_eq!(interp.evaluate("# comment").unwrap(), Flow::Continue);
        assert_eq!(interp.evaluate("   ").unwrap(), Flow::Continue);
        assert!(sink.posted().is_empty());
        assert_eq!(interp.statements(), 0);
        assert_eq!(interp.state(), InterpreterState::Running);
    }

    #[test]
    fn test_unknown_token_terminates() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink.clone());
        let err = interp.evaluate("BOGUSTOKEN").unwrap_err();
        assert!(matches!(err, AutoError::UnknownToken { .. }));
        assert_eq!(interp.state(), InterpreterState::Terminated);
        // 终止态是吸收态
        assert!(matches!(
            interp.evaluate("STOPDRIVE"),
            Err(AutoError::Terminated)
        ));
        assert!(sink.posted().is_empty());
    }

    #[test]
    fn test_missing_parameter_terminates() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink.clone());
        let err = interp.evaluate("TURN 90").unwrap_err();
        assert!(matches!(
            err,
            AutoError::MissingParameter {
                name: "timeout",
                ..
            }
        ));
        assert!(interp.is_terminated());
    }

    #[test]
    fn test_end_is_done() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink);
        assert_eq!(interp.evaluate("BEGIN main").unwrap(), Flow::Continue);
        assert_eq!(interp.evaluate("END").unwrap(), Flow::Done);
        assert!(interp.is_terminated());
    }

    #[test]
    fn test_fire_and_forget_posts_once() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink.clone());
        interp.evaluate("MOVE 0.5, 0.4").unwrap();
        interp.evaluate("TOTESHIFTFWD").unwrap();
        assert_eq!(
            sink.posted(),
            vec![
                Command::Drivetrain(DrivetrainCommand::AutoMove {
                    left: 0.5,
                    right: 0.4
                }),
                Command::Conveyor(ConveyorCommand::ShiftTotesFwd),
            ]
        );
    }

    #[test]
    fn test_error_response_terminates_and_runs_cleanup() {
        let sink = Recorder::answering(Outcome::Error(FailureReason::Timeout));
        let mut interp = interpreter(sink.clone());
        let err = interp.evaluate("STACKUP 2").unwrap_err();
        match err {
            AutoError::CommandFailed {
                keyword,
                subsystem,
                reason,
            } => {
                assert_eq!(keyword, "STACKUP");
                assert_eq!(subsystem, Subsystem::Lifter);
                assert_eq!(reason, FailureReason::Timeout);
            },
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(
            sink.posted(),
            vec![
                Command::Lifter(LifterCommand::RaiseTotes { count: 2 }),
                Command::Conveyor(ConveyorCommand::Stop),
            ]
        );
        assert!(interp.is_terminated());
        assert!(!interp.last_response().unwrap().is_ok());
    }

    #[test]
    fn test_ok_response_continues() {
        let sink = Recorder::answering(Outcome::Ok);
        let mut interp = interpreter(sink.clone());
        assert_eq!(interp.evaluate("TURN 90 2.0").unwrap(), Flow::Continue);
        assert_eq!(interp.state(), InterpreterState::Running);
        assert!(interp.last_response().unwrap().is_ok());
    }

    #[test]
    fn test_no_response_times_out() {
        // 不应答的出口：超时 = 命令超时 + 余量
        let sink = Arc::new(Recorder::default());
        let mut config = RobotConfig::default();
        config.autonomous.response_margin = 0.05;
        let mut interp = Interpreter::new(sink, &config);
        let start = Instant::now();
        let err = interp.evaluate("FRONTLOADTOTE 0.05").unwrap_err();
        assert!(matches!(err, AutoError::ResponseTimeout { keyword: "FRONTLOADTOTE", .. }));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_abort_interrupts_wait() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink);
        let gate = interp.gate().clone();
        let aborter = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            gate.abort();
        });
        let start = Instant::now();
        let err = interp.evaluate("WAITFRONTBEAM").unwrap_err();
        assert!(matches!(err, AutoError::Aborted));
        assert!(start.elapsed() < Duration::from_secs(2));
        aborter.join().unwrap();
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let sink = Arc::new(Recorder::default());
        let gate = PauseGate::new();
        let mut interp = interpreter(sink.clone()).with_gate(gate.clone());
        gate.pause();
        assert_eq!(interp.state(), InterpreterState::Paused);

        let resumer = {
            let gate = gate.clone();
            let sink = sink.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                // 暂停期间没有任何投递
                assert!(sink.posted().is_empty());
                gate.resume();
            })
        };
        let start = Instant::now();
        interp.evaluate("STOPDRIVE").unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(sink.posted().len(), 1);
        resumer.join().unwrap();
    }

    #[test]
    fn test_debug_toggle_and_retired() {
        let sink = Arc::new(Recorder::default());
        let mut interp = interpreter(sink.clone());
        interp.evaluate("DEBUG 1").unwrap();
        assert!(interp.is_debug());
        interp.evaluate("TOTEEXTEND").unwrap();
        interp.evaluate("MESSAGE hello, world").unwrap();
        interp.evaluate("DEBUG 0").unwrap();
        assert!(!interp.is_debug());
        assert!(sink.posted().is_empty());
        assert_eq!(interp.statements(), 4);
    }

    #[test]
    fn test_gate_sleep_aborts() {
        let gate = PauseGate::new();
        gate.abort();
        assert!(matches!(
            gate.sleep(Duration::from_secs(5)),
            Err(AutoError::Aborted)
        ));
        assert!(matches!(gate.wait_while_paused(), Err(AutoError::Aborted)));
    }
}
