//! 脚本静态检查
//!
//! 只做词法与参数检查，不投递任何命令。

use crate::token::{Keyword, Statement, tokenize};
use serde::{Deserialize, Serialize};

/// 问题级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// 运行时会终止脚本
    Error,
    /// 运行时只记录日志
    Warning,
}

/// 单个问题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// 行号（从 1 开始）
    pub line: usize,
    pub statement: String,
    pub severity: Severity,
    pub problem: String,
}

/// 检查报告
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub lines: usize,
    pub statements: usize,
    pub blocks: Vec<String>,
    pub issues: Vec<Issue>,
}

impl CheckReport {
    pub fn errors(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warnings(&self) -> usize {
        self.issues.len() - self.errors()
    }

    /// 没有会终止脚本的问题
    pub fn is_ok(&self) -> bool {
        self.errors() == 0
    }
}

/// 检查整份脚本
///
/// # 示例
///
/// ```rust
/// use stacker_auto::check;
///
/// let report = check("BEGIN main\nTURN 90\nDELAY x\nEND\n");
/// assert_eq!(report.errors(), 1);
/// assert_eq!(report.warnings(), 1);
/// assert_eq!(report.blocks, vec!["main".to_string()]);
/// ```
pub fn check(script: &str) -> CheckReport {
    let mut report = CheckReport::default();

    for (index, line) in script.lines().enumerate() {
        report.lines += 1;
        let line_no = index + 1;
        let mut issue = |severity, problem: String, statement: &str| {
            report.issues.push(Issue {
                line: line_no,
                statement: statement.to_string(),
                severity,
                problem,
            })
        };

        let statement = match Statement::parse(line) {
            Ok(Some(statement)) => statement,
            Ok(None) => continue,
            Err(e) => {
                issue(Severity::Error, e.to_string(), line.trim());
                continue;
            },
        };

        for raw in &statement.bad_params {
            issue(
                Severity::Warning,
                format!("bad numeric parameter '{}', runs as 0", raw),
                statement.text,
            );
        }
        if statement.keyword.is_retired() {
            issue(
                Severity::Warning,
                format!("{} is retired and does nothing", statement.keyword),
                statement.text,
            );
        }

        report.statements += 1;
        if statement.keyword == Keyword::Begin {
            match tokenize(statement.rest).next() {
                Some(name) if report.blocks.iter().any(|b| b == name) => report.issues.push(Issue {
                    line: line_no,
                    statement: statement.text.to_string(),
                    severity: Severity::Warning,
                    problem: format!("duplicate block '{}', only the first is selectable", name),
                }),
                Some(name) => report.blocks.push(name.to_string()),
                None => {},
            }
        }
    }

    report
}
