//! run 命令
//!
//! 在全模拟机器人上执行脚本：切换到自动模式、运行选中的块、再切回禁用。
//! Ctrl-C 中止正在执行的语句。

use crate::commands::config::load_config;
use anyhow::{Context, Result, bail};
use clap::Args;
use stacker_auto::{AutonomousRunner, RunReport, Termination};
use stacker_driver::sim::{SimHandles, sim_robot};
use stacker_sdk::prelude::{RobotMode, SystemClock};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// 脚本执行参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 脚本文件路径
    #[arg(short, long)]
    pub script: PathBuf,

    /// 从 `BEGIN <block>` 开始执行
    #[arg(short, long)]
    pub block: Option<String>,

    /// 配置文件（不指定则为默认值）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 以 JSON 输出报告
    #[arg(long)]
    pub json: bool,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let script = fs::read_to_string(&self.script)
            .with_context(|| format!("failed to read script {}", self.script.display()))?;

        let (robot, handles) = sim_robot(config.clone(), Arc::new(SystemClock))
            .context("failed to assemble simulated robot")?;
        robot
            .broadcast_mode(RobotMode::Autonomous)
            .context("failed to enter autonomous mode")?;

        let runner = AutonomousRunner::new(robot.station().clone(), config);
        let gate = runner.gate().clone();
        ctrlc::set_handler(move || {
            warn!("interrupt received, aborting script");
            gate.abort();
        })
        .context("failed to install Ctrl-C handler")?;

        if !self.json {
            println!("📜 运行脚本: {}", self.script.display());
        }
        let report = runner.run(&script, self.block.as_deref())?;

        if let Err(e) = robot.broadcast_mode(RobotMode::Disabled) {
            warn!("failed to disable robot: {}", e);
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report, &handles);
        }

        if !report.is_success() {
            bail!("script did not complete: {:?}", report.termination);
        }
        Ok(())
    }
}

fn print_report(report: &RunReport, handles: &SimHandles) {
    println!();
    println!("📊 执行结果:");
    if let Some(block) = &report.block {
        println!("  块: {}", block);
    }
    println!("  语句数: {}", report.statements);
    println!("  耗时: {:.2} 秒", report.duration_secs);
    match &report.termination {
        Termination::Completed { line } => println!("  ✅ 在第 {} 行 END 结束", line),
        Termination::EndOfScript => println!("  ✅ 执行到脚本末尾"),
        Termination::Failed {
            line,
            statement,
            error,
        } => println!("  ❌ 第 {} 行失败: {} ({})", line, error, statement),
        Termination::Aborted { line } => println!("  🛑 在第 {} 行被中止", line),
    }

    println!();
    println!("🔧 电机输出:");
    for (name, output) in handles.outputs() {
        println!("  {:<12} {:+.2}", name, output);
    }
}
