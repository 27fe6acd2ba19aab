//! 锁释放句柄
//!
//! `LockRelease` 是放弃锁的唯一途径，可重复调用且永远不会失败。
//! 获取失败时返回的是不持有任何锁的空句柄，调用方的使用方式保持不变。

use compile_lock_shared::observability::metrics;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::heartbeat::Heartbeat;
use super::outcome::{ReleaseReport, StepOutcome};
use crate::store::{LockHandle, LockStore};

struct HeldLock<S> {
    store: Arc<S>,
    handle: LockHandle,
    heartbeat_key: String,
    heartbeat: Heartbeat,
}

/// 锁释放句柄
///
/// ## 注意事项
///
/// 建议显式调用 `release()`。Drop 无法执行异步操作，只会停止心跳，
/// 锁最终通过租约过期释放。
pub struct LockRelease<S> {
    resource: String,
    held: Mutex<Option<HeldLock<S>>>,
}

impl<S: LockStore + 'static> LockRelease<S> {
    pub(crate) fn held(
        store: Arc<S>,
        handle: LockHandle,
        heartbeat_key: String,
        heartbeat: Heartbeat,
    ) -> Self {
        Self {
            resource: handle.resource().to_string(),
            held: Mutex::new(Some(HeldLock {
                store,
                handle,
                heartbeat_key,
                heartbeat,
            })),
        }
    }

    /// 未获得锁时的空句柄
    pub(crate) fn noop(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            held: Mutex::new(None),
        }
    }

    /// 锁资源 key
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// 是否确实持有锁
    ///
    /// 获取超时后返回的空句柄为 false；调用方可据此判断是否在无互斥保护下运行。
    pub fn is_held(&self) -> bool {
        self.held.lock().is_some()
    }

    /// 释放锁
    ///
    /// 依次停止心跳、释放租约、删除心跳 key，每一步独立执行，失败不影响后续步骤。
/// 租约已被他人持有时跳过删除心跳 key。
    /// 空句柄或重复调用时返回全部为 `Skipped` 的报告。
    #[instrument(skip(self), fields(resource = %self.resource))]
    pub async fn release(&self) -> ReleaseReport {
        let taken = self.held.lock().take();
        let Some(mut held) = taken else {
            return ReleaseReport::skipped();
        };

        let heartbeat_stopped = held.heartbeat.stop().await;
        let lease_released = StepOutcome::from_ownership(held.store.release(&held.handle).await);
        // 锁已归属新的持有者时，心跳 key 也属于对方，不能删除
        let heartbeat_deleted = if lease_released == StepOutcome::NotOwned {
            StepOutcome::Skipped
        } else {
            StepOutcome::from_result(held.store.delete(&held.heartbeat_key).await)
        };

        let report = ReleaseReport {
            heartbeat_stopped,
            lease_released,
            heartbeat_deleted,
        };

        metrics::record_lock_release();
        if report.is_clean() {
            debug!("Lock released");
        } else if report.lease_released == StepOutcome::NotOwned {
            // 锁已经过期或被回收，说明在持有期间失去了互斥保护
            warn!(report = ?report, "Lock was already expired or reclaimed at release");
        } else {
            warn!(report = ?report, "Lock release completed with failures");
        }
        report
    }
}

impl<S> Drop for LockRelease<S> {
    fn drop(&mut self) {
        if self.held.get_mut().take().is_some() {
            // HeldLock 中的 Heartbeat 在此处被 drop，心跳随之停止
            warn!(
                resource = %self.resource,
                "LockRelease dropped without explicit release - lock will expire via TTL"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::config::LockConfig;
    use crate::lock::heartbeat::{HeartbeatSettings, HeartbeatStamp};
    use crate::store::{DistributedMutex, KeyValueStore, MemoryStore, StoreOp};
    use std::time::Duration;

    async fn acquire(store: &Arc<MemoryStore>) -> LockRelease<MemoryStore> {
        let config = LockConfig::default();
        let handle = store
            .acquire("compile-foo", config.lock_ttl)
            .await
            .unwrap()
            .unwrap();
        store.set("compile-foo:hb", "0").await.unwrap();
        let heartbeat = Heartbeat::start(
            store.clone(),
            handle.clone(),
            "compile-foo:hb".to_string(),
            HeartbeatSettings::from(&config),
            HeartbeatStamp::new(Arc::new(TokioClock::new())),
        );
        LockRelease::held(store.clone(), handle, "compile-foo:hb".to_string(), heartbeat)
    }

    #[tokio::test]
    async fn test_release_clears_both_keys() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;
        assert!(release.is_held());
        assert_eq!(release.resource(), "compile-foo");

        let report = release.release().await;

        assert!(report.is_clean());
        assert!(!release.is_held());
        assert!(!store.exists("compile-foo").await.unwrap());
        assert!(!store.exists("compile-foo:hb").await.unwrap());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;

        assert!(release.release().await.is_clean());
        assert!(release.release().await.is_skipped());
        assert!(release.release().await.is_skipped());
    }

    #[tokio::test]
    async fn test_noop_release_touches_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.set("compile-foo", "someone-else").await.unwrap();
        let release: LockRelease<MemoryStore> = LockRelease::noop("compile-foo");

        assert!(!release.is_held());
        assert!(release.release().await.is_skipped());
        assert_eq!(store.peek("compile-foo").as_deref(), Some("someone-else"));
    }

    #[tokio::test]
    async fn test_release_never_fails_when_store_is_down() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;
        store.set_offline(true);

        let report = release.release().await;

        assert_eq!(report.heartbeat_stopped, StepOutcome::Done);
        assert!(report.lease_released.is_failed());
        assert!(report.heartbeat_deleted.is_failed());
        assert!(!release.is_held());
    }

    #[tokio::test]
    async fn test_heartbeat_key_deleted_even_if_unlock_fails() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;
        store.fail_next(StoreOp::Release, 1);

        let report = release.release().await;

        assert!(report.lease_released.is_failed());
        assert_eq!(report.heartbeat_deleted, StepOutcome::Done);
        assert!(!store.exists("compile-foo:hb").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_lease_lost_reports_not_owned() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;
        // 模拟另一个进程回收了锁
        store.delete("compile-foo").await.unwrap();
        store
            .acquire("compile-foo", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();

        let report = release.release().await;

        assert_eq!(report.lease_released, StepOutcome::NotOwned);
        assert_eq!(report.heartbeat_deleted, StepOutcome::Skipped);
        assert!(store.exists("compile-foo").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_after_lease_lost_keeps_new_holders_heartbeat() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;
        store.delete("compile-foo").await.unwrap();
        store
            .acquire("compile-foo", Duration::from_secs(30))
            .await
            .unwrap()
            .unwrap();
        store.set("compile-foo:hb", "1700000000000").await.unwrap();

        release.release().await;

        assert_eq!(store.peek("compile-foo:hb").as_deref(), Some("1700000000000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_without_release_lets_lease_expire() {
        let store = Arc::new(MemoryStore::new());
        let release = acquire(&store).await;

        drop(release);
        tokio::time::sleep(Duration::from_millis(6_000)).await;

        assert!(!store.exists("compile-foo").await.unwrap());
    }
}
