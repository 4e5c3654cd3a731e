//! # Stacker CLI
//!
//! 在模拟机器人上运行和检查自动阶段脚本。
//!
//! ```bash
//! # 静态检查
//! stacker-cli check --script auto.txt
//!
//! # 运行指定块（Ctrl-C 中止）
//! stacker-cli run --script auto.txt --block two_tote --json
//!
//! # 生成默认配置并查看
//! stacker-cli config init robot.toml
//! stacker-cli config show --config robot.toml
//!
//! # 关键字表
//! stacker-cli keywords
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckCommand, ConfigCommand, RunCommand};

/// Stacker CLI - 自动脚本命令行工具
#[derive(Parser, Debug)]
#[command(name = "stacker-cli")]
#[command(about = "Run and check tote-stacker autonomous scripts", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在模拟机器人上运行脚本
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 静态检查脚本
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),

    /// 列出脚本关键字
    Keywords,
}

fn main() -> Result<()> {
    stacker_sdk::init_logger(&["stacker_cli=info"]);

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Check { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
        Commands::Keywords => {
            commands::keywords::print_keywords();
            Ok(())
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "stacker-cli",
            "run",
            "--script",
            "auto.txt",
            "--block",
            "left",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { args } => {
                assert_eq!(args.script.to_str(), Some("auto.txt"));
                assert_eq!(args.block.as_deref(), Some("left"));
                assert!(args.json);
                assert!(args.config.is_none());
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["stacker-cli", "config", "init", "robot.toml"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config(ConfigCommand::Init { force: false, .. })
        ));
    }
}
