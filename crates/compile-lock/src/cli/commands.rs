//! CLI 命令定义

use clap::{Parser, Subcommand, ValueEnum};

/// 编译任务分布式锁工具
#[derive(Parser, Debug)]
#[command(name = "compile-lock")]
#[command(version, about = "在多个进程之间互斥地执行同名编译任务")]
#[command(propagate_version = true)]
pub struct Cli {
    /// 存储后端
    #[arg(long, value_enum, global = true, default_value_t = StoreKind::Redis)]
    pub store: StoreKind,

    #[command(subcommand)]
    pub command: Commands,
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// 共享 Redis（多进程）
    Redis,
    /// 进程内存储（仅单进程有效）
    Memory,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 查询构建完成标记，存在时退出码为 0
    Exists {
        /// 任务名
        name: String,
    },

    /// 获取锁后执行命令，退出码沿用子进程
    Run {
        /// 任务名
        name: String,

        /// 要执行的命令及参数（置于 `--` 之后）
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// 写入构建完成标记
    Mark {
        /// 任务名
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_trailing_command() {
        let cli = Cli::try_parse_from(["compile-lock", "run", "foo", "--", "make", "-j8"]).unwrap();

        assert_eq!(cli.store, StoreKind::Redis);
        match cli.command {
            Commands::Run { name, command } => {
                assert_eq!(name, "foo");
                assert_eq!(command, vec!["make", "-j8"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_command() {
        assert!(Cli::try_parse_from(["compile-lock", "run", "foo"]).is_err());
    }

    #[test]
    fn test_store_flag_is_global() {
        let cli = Cli::try_parse_from(["compile-lock", "exists", "bar", "--store", "memory"]).unwrap();

        assert_eq!(cli.store, StoreKind::Memory);
        assert!(matches!(cli.command, Commands::Exists { name } if name == "bar"));
    }
}
