//! check 命令
//!
//! 不连接任何硬件，只检查脚本的关键字与参数。

use anyhow::{Context, Result, bail};
use clap::Args;
use stacker_auto::{CheckReport, Severity, check};
use std::fs;
use std::path::PathBuf;

/// 脚本检查参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// 脚本文件路径
    #[arg(short, long)]
    pub script: PathBuf,

    /// 以 JSON 输出报告
    #[arg(long)]
    pub json: bool,
}

impl CheckCommand {
    pub fn execute(&self) -> Result<()> {
        let script = fs::read_to_string(&self.script)
            .with_context(|| format!("failed to read script {}", self.script.display()))?;
        let report = check(&script);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }

        if !report.is_ok() {
            bail!("{} error(s) in {}", report.errors(), self.script.display());
        }
        Ok(())
    }
}

fn print_report(report: &CheckReport) {
    println!("📋 {} 行, {} 条语句", report.lines, report.statements);
    if !report.blocks.is_empty() {
        println!("    块: {}", report.blocks.join(", "));
    }
    for issue in &report.issues {
        let mark = match issue.severity {
            Severity::Error => "❌",
            Severity::Warning => "⚠️",
        };
        println!(
            "{} 第 {} 行: {} ({})",
            mark, issue.line, issue.problem, issue.statement
        );
    }
    if report.issues.is_empty() {
        println!("✅ 没有发现问题");
    }
}
