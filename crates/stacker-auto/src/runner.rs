//! 自动阶段运行器
//!
//! 把整份脚本逐行交给一个新的 [`Interpreter`]。脚本可以包含多个
//! `BEGIN <name>` 块，调用方选择从哪一块开始执行。

use crate::error::AutoError;
use crate::interpreter::{CommandSink, Flow, Interpreter, PauseGate};
use crate::token::{Keyword, Statement, tokenize};
use serde::{Deserialize, Serialize};
use stacker_protocol::{AutonomousCommand, Command};
use stacker_tools::RobotConfig;
use std::time::Instant;
use tracing::{info, warn};

/// 结束方式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// 执行到 `END`
    Completed { line: usize },
    /// 执行到脚本末尾，没有 `END`
    EndOfScript,
    /// 语句失败
    Failed {
        line: usize,
        statement: String,
        error: String,
    },
    /// 被外部中止
    Aborted { line: usize },
}

/// 一次运行的报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// 选中的块名（`None` 表示从第一行开始）
    pub block: Option<String>,
    /// 执行的语句数（不含空行与注释）
    pub statements: usize,
    pub termination: Termination,
    pub duration_secs: f64,
}

impl RunReport {
    /// 是否正常结束（`END` 或脚本末尾）
    pub fn is_success(&self) -> bool {
        matches!(
            self.termination,
            Termination::Completed { .. } | Termination::EndOfScript
        )
    }
}

/// 查找 `BEGIN <name>` 所在行（从 0 开始）
pub fn find_block(script: &str, name: &str) -> Option<usize> {
    script.lines().position(|line| {
        matches!(
            Statement::parse(line),
            Ok(Some(ref s)) if s.keyword == Keyword::Begin && tokenize(s.rest).next() == Some(name)
        )
    })
}

/// 脚本中声明的所有块名（按出现顺序）
pub fn block_names(script: &str) -> Vec<String> {
    script
        .lines()
        .filter_map(|line| match Statement::parse(line) {
            Ok(Some(s)) if s.keyword == Keyword::Begin => {
                tokenize(s.rest).next().map(str::to_string)
            },
            _ => None,
        })
        .collect()
}

/// 自动阶段运行器
///
/// 每次 [`AutonomousRunner::run`] 使用一个新的解释器，共享同一个 [`PauseGate`]，
/// 因此外部线程可以随时暂停或中止正在运行的脚本。
pub struct AutonomousRunner<S: CommandSink + Clone> {
    sink: S,
    config: RobotConfig,
    gate: PauseGate,
}

impl<S: CommandSink + Clone> AutonomousRunner<S> {
    pub fn new(sink: S, config: RobotConfig) -> Self {
        Self {
            sink,
            config,
            gate: PauseGate::new(),
        }
    }

    /// 暂停/中止控制
    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    /// 运行脚本
    ///
    /// 开始前广播 `Autonomous::Run`，结束后（无论结果）广播 `Autonomous::Complete`。
    ///
    /// # 参数
    ///
    /// - `script`: 整份脚本文本
    /// - `block`: 从 `BEGIN <block>` 行开始；`None` 从第一行开始
    ///
    /// # 错误
    ///
    /// 只有找不到指定块时返回 [`AutoError::BlockNotFound`]；
    /// 执行期间的失败记录在 [`RunReport::termination`] 中。
    pub fn run(&self, script: &str, block: Option<&str>) -> Result<RunReport, AutoError> {
        let start_line = match block {
            Some(name) => {
                find_block(script, name).ok_or_else(|| AutoError::BlockNotFound(name.to_string()))?
            },
            None => 0,
        };

        let started = Instant::now();
        let mut interpreter =
            Interpreter::new(self.sink.clone(), &self.config).with_gate(self.gate.clone());

        self.broadcast(AutonomousCommand::Run);
        info!(
            "autonomous run started at line {} (block {})",
            start_line + 1,
            block.unwrap_or("<none>")
        );

        let mut termination = Termination::EndOfScript;
        for (index, line) in script.lines().enumerate().skip(start_line) {
            let line_no = index + 1;
            match interpreter.evaluate(line) {
                Ok(Flow::Continue) => {},
                Ok(Flow::Done) => {
                    termination = Termination::Completed { line: line_no };
                    break;
                },
                Err(AutoError::Aborted) => {
                    termination = Termination::Aborted { line: line_no };
                    break;
                },
                Err(e) => {
                    termination = Termination::Failed {
                        line: line_no,
                        statement: line.trim().to_string(),
                        error: e.to_string(),
                    };
                    break;
                },
            }
        }

        self.broadcast(AutonomousCommand::Complete);

        let report = RunReport {
            block: block.map(str::to_string),
            statements: interpreter.statements(),
            termination,
            duration_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            "autonomous run finished: {:?} after {} statements ({:.2}s)",
            report.termination, report.statements, report.duration_secs
        );
        Ok(report)
    }

    fn broadcast(&self, command: AutonomousCommand) {
        if let Err(e) = self.sink.send_no_wait(Command::Autonomous(command)) {
            warn!("{:?} broadcast failed: {}", command, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use stacker_driver::DriverError;
    use stacker_protocol::{DrivetrainCommand, Message};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        posted: Mutex<Vec<Command>>,
    }

    impl CommandSink for Recorder {
        fn post(&self, message: Message) -> Result<(), DriverError> {
            self.posted.lock().push(*message.command());
            Ok(())
        }
    }

    const SCRIPT: &str = "\
# two routines
BEGIN left
MOVE 0.5 0.5
END
BEGIN right
MOVE -0.5 -0.5
STOPDRIVE
END
";

    #[test]
    fn test_block_lookup() {
        assert_eq!(find_block(SCRIPT, "left"), Some(1));
        assert_eq!(find_block(SCRIPT, "right"), Some(4));
        assert_eq!(find_block(SCRIPT, "middle"), None);
        assert_eq!(block_names(SCRIPT), vec!["left", "right"]);
    }

    #[test]
    fn test_run_selected_block() {
        let sink = Arc::new(Recorder::default());
        let runner = AutonomousRunner::new(sink.clone(), RobotConfig::default());
        let report = runner.run(SCRIPT, Some("right")).unwrap();

        assert_eq!(report.termination, Termination::Completed { line: 8 });
        assert_eq!(report.statements, 4);
        assert!(report.is_success());
        assert_eq!(
            *sink.posted.lock(),
            vec![
                Command::Autonomous(AutonomousCommand::Run),
                Command::Drivetrain(DrivetrainCommand::AutoMove {
                    left: -0.5,
                    right: -0.5
                }),
                Command::Drivetrain(DrivetrainCommand::Stop),
                Command::Autonomous(AutonomousCommand::Complete),
            ]
        );
    }

    #[test]
    fn test_unknown_block() {
        let runner = AutonomousRunner::new(Arc::new(Recorder::default()), RobotConfig::default());
        assert!(matches!(
            runner.run(SCRIPT, Some("middle")),
            Err(AutoError::BlockNotFound(name)) if name == "middle"
        ));
    }

    #[test]
    fn test_failure_is_reported() {
        let sink = Arc::new(Recorder::default());
        let runner = AutonomousRunner::new(sink.clone(), RobotConfig::default());
        let report = runner.run("MOVE 0 0\nJUMP 3\nMOVE 1 1\n", None).unwrap();
        match &report.termination {
            Termination::Failed {
                line,
                statement,
                error,
            } => {
                assert_eq!(*line, 2);
                assert_eq!(statement, "JUMP 3");
                assert!(error.contains("Unknown token"));
            },
            other => panic!("unexpected termination {:?}", other),
        }
        // Run、MOVE、Complete；失败之后的语句不再执行
        assert_eq!(sink.posted.lock().len(), 3);
        assert!(!report.is_success());
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            block: None,
            statements: 2,
            termination: Termination::Aborted { line: 3 },
            duration_secs: 0.5,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"aborted\""));
        let back: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
