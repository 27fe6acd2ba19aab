//! 命令执行器
//!
//! 将子命令转化为锁与标记操作。存储错误在这里以 `anyhow` 的形式返回给 main，
//! 锁子系统内部的失败则不会出现在这里。

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{info, warn};

use crate::existence;
use crate::lock::CompileLock;
use crate::store::LockStore;

use super::commands::Commands;

/// 子进程被信号终止或无法映射的退出码
const FAILURE_CODE: u8 = 1;

/// 命令执行器
pub struct CommandRunner<S> {
    lock: CompileLock<S>,
}

impl<S: LockStore + 'static> CommandRunner<S> {
    pub fn new(lock: CompileLock<S>) -> Self {
        Self { lock }
    }

    /// 执行子命令，返回进程退出码
    pub async fn execute(&self, command: Commands) -> Result<u8> {
        match command {
            Commands::Exists { name } => Ok(self.run_exists(&name).await),
            Commands::Mark { name } => self.run_mark(&name).await,
            Commands::Run { name, command } => self.run_command(&name, &command).await,
        }
    }

    /// 执行 exists 命令：打印 `true` / `false`
    pub async fn run_exists(&self, name: &str) -> u8 {
        let present = self.lock.check_existence(name).await;
        println!("{}", present);
        if present { 0 } else { FAILURE_CODE }
    }

    /// 执行 mark 命令
    pub async fn run_mark(&self, name: &str) -> Result<u8> {
        let suffix = &self.lock.config().metadata_suffix;
        existence::mark_complete(&**self.lock.store(), name, suffix)
            .await
            .with_context(|| format!("failed to write build marker for {}", name))?;
        info!(name, "Build marker written");
        Ok(0)
    }

    /// 执行 run 命令
    ///
    /// 无论子进程是否启动成功，锁都会被释放。
    pub async fn run_command(&self, name: &str, command: &[String]) -> Result<u8> {
        let (program, args) = command
            .split_first()
            .context("no command given")?;

        let release = self.lock.acquire_lock(name).await;
        if !release.is_held() {
            warn!(name, "Running without exclusivity, another process may be compiling the same task");
        }

        let status = Command::new(program).args(args).status().await;
        let report = release.release().await;
        if !report.is_clean() && !report.is_skipped() {
            warn!(name, report = ?report, "Lock release was not clean");
        }

        let status = status.with_context(|| format!("failed to spawn {}", program))?;
        info!(name, status = %status, "Command finished");
        Ok(status
            .code()
            .and_then(|code| u8::try_from(code).ok())
            .unwrap_or(FAILURE_CODE))
    }
}
