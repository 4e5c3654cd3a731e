//! 配置管理命令
//!
//! 机器人参数保存在 TOML 文件中；不指定文件时使用内置默认值。

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use stacker_tools::RobotConfig;
use std::path::{Path, PathBuf};

/// 加载配置（`None` 使用默认值）
pub fn load_config(path: Option<&Path>) -> Result<RobotConfig> {
    match path {
        Some(path) => RobotConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(RobotConfig::default()),
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 打印生效的配置（TOML）
    Show {
        /// 配置文件（不指定则为默认值）
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// 写出默认配置
    Init {
        /// 目标文件
        path: PathBuf,

        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        match self {
            ConfigCommand::Show { config } => {
                let config = load_config(config.as_deref())?;
                let text = config.to_toml_string().context("failed to serialize config")?;
                print!("{}", text);
                Ok(())
            },
            ConfigCommand::Init { path, force } => {
                if path.exists() && !force {
                    bail!("{} already exists (use --force to overwrite)", path.display());
                }
                RobotConfig::default()
                    .save_to_file(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("✅ 已写入默认配置: {}", path.display());
                Ok(())
            },
        }
    }
}
