//! 编译锁管理器
//!
//! 获取流程：
//! 1. 以固定租约尝试原子获取
//! 2. 成功：写入心跳、启动心跳任务、返回释放句柄
//! 3. 失败：未超过最长等待则休眠后重试；超过后执行一次陈旧检测，
//!    回收成功立即重试，否则放弃并返回空句柄

use compile_lock_shared::observability::metrics;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::{Heartbeat, HeartbeatSettings, HeartbeatStamp, write_heartbeat};
use super::release::LockRelease;
use super::stale::StaleLockDetector;
use crate::clock::{Clock, SystemClock};
use crate::config::LockConfig;
use crate::existence;
use crate::keys::LockKeys;
use crate::store::LockStore;

/// 编译锁管理器
///
/// 存储客户端在进程启动时构造并注入，多个管理器可共享同一个客户端。
pub struct CompileLock<S> {
    store: Arc<S>,
    config: LockConfig,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for CompileLock<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: LockStore + 'static> CompileLock<S> {
    /// 创建锁管理器
    ///
    /// # Arguments
    /// - `store`: 存储客户端
    /// - `config`: 锁配置
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// 使用默认配置创建锁管理器
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, LockConfig::default())
    }

    /// 替换心跳时间源
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 查询构建完成标记是否存在
    #[instrument(skip(self))]
    pub async fn check_existence(&self, name: &str) -> bool {
        existence::check_existence(&*self.store, name, &self.config.metadata_suffix).await
    }

    /// 获取锁
    ///
    /// 最多等待 `max_wait` 加一次陈旧检测。始终返回释放句柄；
    /// 超时未获得锁时返回空句柄（`is_held()` 为 false），不会报错。
    #[instrument(skip(self))]
    pub async fn acquire_lock(&self, name: &str) -> LockRelease<S> {
        if name.is_empty() {
            warn!("Empty lock name, continuing without a lock");
            return LockRelease::noop(String::new());
        }

        let keys = LockKeys::for_name(name);
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut reclaim_attempted = false;

        loop {
            attempts += 1;
            if let Some(release) = self.attempt(&keys).await {
                let waited = started.elapsed();
                metrics::record_lock_acquire("acquired");
                metrics::observe_lock_wait(waited);
                info!(
                    resource = %keys.resource(),
                    attempts,
                    waited_ms = waited.as_millis() as u64,
                    "Lock acquired"
                );
                return release;
            }

            if started.elapsed() < self.config.max_wait {
                tokio::time::sleep(self.config.retry_delay).await;
                continue;
            }

            if !reclaim_attempted {
                reclaim_attempted = true;
                if self.detector().try_reclaim(&*self.store, keys.resource(), keys.heartbeat()).await {
                    continue;
                }
            }

            warn!(
                resource = %keys.resource(),
                attempts,
                max_wait_ms = self.config.max_wait.as_millis() as u64,
                "Lock acquisition exhausted, continuing without exclusivity"
            );
            metrics::record_lock_acquire("exhausted");
            return LockRelease::noop(keys.resource());
        }
    }

    /// 尝试获取锁，不重试
    ///
    /// 锁不可用时立即返回 None。
    #[instrument(skip(self))]
    pub async fn try_acquire_once(&self, name: &str) -> Option<LockRelease<S>> {
        if name.is_empty() {
            return None;
        }
        self.attempt(&LockKeys::for_name(name)).await
    }

    fn detector(&self) -> StaleLockDetector {
        StaleLockDetector::new(self.config.stale_after(), self.clock.clone())
    }

    async fn attempt(&self, keys: &LockKeys) -> Option<LockRelease<S>> {
        let handle = match self.store.acquire(keys.resource(), self.config.lock_ttl).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                debug!(resource = %keys.resource(), "Lock held by another process");
                return None;
            }
            Err(e) => {
                warn!(
                    resource = %keys.resource(),
                    error = %e,
                    retryable = e.is_retryable(),
                    "Lock acquire failed"
                );
                return None;
            }
        };

        let mut stamp = HeartbeatStamp::new(self.clock.clone());
        let written = write_heartbeat(
            &*self.store,
            keys.heartbeat(),
            stamp.next(),
            self.config.heartbeat_expiry(),
        )
        .await;
        if written.is_failed() {
            // 首次心跳失败不影响持有，由后续心跳补写
            warn!(resource = %keys.resource(), outcome = ?written, "Initial heartbeat write failed");
        }

        let heartbeat = Heartbeat::start(
            self.store.clone(),
            handle.clone(),
            keys.heartbeat().to_string(),
            HeartbeatSettings::from(&self.config),
            stamp,
        );

        Some(LockRelease::held(
            self.store.clone(),
            handle,
            keys.heartbeat().to_string(),
            heartbeat,
        ))
    }
}
