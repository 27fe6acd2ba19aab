//! 陈旧锁检测
//!
//! 仅在获取锁已等待到上限后调用一次。判定遵循保守原则：
//! 只要查询存储时出错，就认为锁仍然有效，绝不基于不完整的信息强制回收。

use compile_lock_shared::error::Result;
use compile_lock_shared::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::store::{KeyValueStore, RemainingLease};

/// 锁的陈旧程度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// 锁已不存在，直接重试获取即可
    Free,
    /// 锁没有设置过期时间
    NoExpiry,
    /// 心跳超时；`age` 为 `None` 表示心跳缺失（视为无限久）
    HeartbeatStale { age: Option<Duration> },
    /// 持有者可能仍存活
    Alive { age: Duration },
}

impl Staleness {
    pub fn is_reclaimable(&self) -> bool {
        !matches!(self, Self::Alive { .. })
    }
}

/// 陈旧锁检测器
pub struct StaleLockDetector {
    stale_after: Duration,
    clock: Arc<dyn Clock>,
}

impl StaleLockDetector {
    pub fn new(stale_after: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { stale_after, clock }
    }

    /// 判定锁的陈旧程度，不修改存储
    pub async fn assess<K: KeyValueStore>(
        &self,
        store: &K,
        resource: &str,
        heartbeat_key: &str,
    ) -> Result<Staleness> {
        match store.remaining_lease(resource).await? {
            RemainingLease::Absent => return Ok(Staleness::Free),
            RemainingLease::NoExpiry => return Ok(Staleness::NoExpiry),
            RemainingLease::Remaining(_) => {}
        }

        match self.heartbeat_age(store, heartbeat_key).await? {
            None => Ok(Staleness::HeartbeatStale { age: None }),
            Some(age) if age > self.stale_after => Ok(Staleness::HeartbeatStale { age: Some(age) }),
            Some(age) => Ok(Staleness::Alive { age }),
        }
    }

    /// 尝试回收锁
    ///
    /// 返回 true 表示调用方可以立即重试获取：锁本就空闲，或已被强制清除。
    pub async fn try_reclaim<K: KeyValueStore>(
        &self,
        store: &K,
        resource: &str,
        heartbeat_key: &str,
    ) -> bool {
        let staleness = match self.assess(store, resource, heartbeat_key).await {
            Ok(staleness) => staleness,
            Err(e) => {
                warn!(
                    resource = %resource,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Staleness check failed, treating lock as held"
                );
                metrics::record_lock_reclaim("error");
                return false;
            }
        };

        match staleness {
            Staleness::Free => {
                debug!(resource = %resource, "Lock disappeared while waiting");
                metrics::record_lock_reclaim("free");
                true
            }
            Staleness::Alive { age } => {
                info!(
                    resource = %resource,
                    heartbeat_age_ms = age.as_millis() as u64,
                    "Lock holder still alive, not reclaiming"
                );
                metrics::record_lock_reclaim("alive");
                false
            }
            Staleness::NoExpiry | Staleness::HeartbeatStale { .. } => {
                if let Err(e) = store.delete(resource).await {
                    warn!(resource = %resource, error = %e, "Failed to delete stale lock");
                    metrics::record_lock_reclaim("error");
                    return false;
                }
                // 锁已清除；残留的心跳 key 会被下一个持有者覆盖
                if let Err(e) = store.delete(heartbeat_key).await {
                    warn!(key = %heartbeat_key, error = %e, "Failed to delete stale heartbeat");
                }
                warn!(resource = %resource, staleness = ?staleness, "Force-reclaimed stale lock");
                metrics::record_lock_reclaim("reclaimed");
                true
            }
        }
    }

    async fn heartbeat_age<K: KeyValueStore>(
        &self,
        store: &K,
        heartbeat_key: &str,
    ) -> Result<Option<Duration>> {
        let Some(raw) = store.get(heartbeat_key).await? else {
            return Ok(None);
        };
        let Ok(timestamp) = raw.trim().parse::<i64>() else {
            warn!(key = %heartbeat_key, value = %raw, "Unparseable heartbeat, treating as missing");
            return Ok(None);
        };
        // 时钟偏差可能让时间戳位于未来，此时年龄按 0 处理
        let age_ms = (self.clock.now_millis() - timestamp).max(0);
        Ok(Some(Duration::from_millis(age_ms as u64)))
    }
}
