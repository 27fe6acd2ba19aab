//! compile-lock 命令行入口

use anyhow::Result;
use clap::Parser;
use compile_lock::cli::{Cli, CommandRunner, Commands, StoreKind};
use compile_lock::{CompileLock, LockConfig, LockStore, MemoryStore, RedisStore};
use compile_lock_shared::{config::AppConfig, observability};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // .env 不存在时忽略
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // 1. 加载配置，失败时在日志初始化后告警
    let (config, load_error) = match AppConfig::load("compile-lock") {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // 2. 初始化可观测性
    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config)?;
    if let Some(e) = load_error {
        warn!("Failed to load config, using defaults: {}", e);
    }
    info!(environment = %config.environment, store = ?cli.store, "Configuration loaded");

    // 3. 锁参数
    let lock_config = LockConfig::from(&config.lock);
    lock_config.validate()?;

    // 4. 构造存储并执行命令
    let code = match cli.store {
        StoreKind::Redis => {
            let store = RedisStore::connect(&config.redis).await?;
            store.health_check().await?;
            info!(instance_id = %store.instance_id(), "Redis store ready");
            dispatch(Arc::new(store), lock_config, cli.command).await?
        }
        StoreKind::Memory => {
            warn!("Using in-process store, locks are not shared with other processes");
            dispatch(Arc::new(MemoryStore::new()), lock_config, cli.command).await?
        }
    };

    Ok(ExitCode::from(code))
}

async fn dispatch<S: LockStore + 'static>(
    store: Arc<S>,
    lock_config: LockConfig,
    command: Commands,
) -> Result<u8> {
    CommandRunner::new(CompileLock::new(store, lock_config))
        .execute(command)
        .await
}
