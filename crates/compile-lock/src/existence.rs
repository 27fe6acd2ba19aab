//! 构建完成标记
//!
//! 与锁机制无关的纯查询：`<name><suffix>` 存在即表示该产物已经构建完成。

use chrono::Utc;
use compile_lock_shared::error::Result;
use tracing::{debug, instrument, warn};

use crate::keys::marker_key;
use crate::store::KeyValueStore;

/// 查询构建完成标记是否存在
///
/// 查询失败按不存在处理，调用方会走一次正常构建流程。
#[instrument(skip(store))]
pub async fn check_existence<K: KeyValueStore + ?Sized>(store: &K, name: &str, suffix: &str) -> bool {
    let key = marker_key(name, suffix);
    match store.exists(&key).await {
        Ok(present) => {
            debug!(key = %key, present, "Checked build marker");
            present
        }
        Err(e) => {
            warn!(key = %key, error = %e, code = e.code(), "Build marker check failed, treating as absent");
            false
        }
    }
}

/// 写入构建完成标记，值为当前时间戳（毫秒）
#[instrument(skip(store))]
pub async fn mark_complete<K: KeyValueStore + ?Sized>(store: &K, name: &str, suffix: &str) -> Result<()> {
    let key = marker_key(name, suffix);
    store.set(&key, &Utc::now().timestamp_millis().to_string()).await?;
    debug!(key = %key, "Build marker written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockKeyValueStore, StoreOp};
    use compile_lock_shared::error::StoreError;

    #[tokio::test]
    async fn test_marker_absent_then_present() {
        let store = MemoryStore::new();
        assert!(!check_existence(&store, "bar", ".metadata").await);

        store.set("bar.metadata", "{}").await.unwrap();

        assert!(check_existence(&store, "bar", ".metadata").await);
        // 不同后缀互不影响
        assert!(!check_existence(&store, "bar", ":meta").await);
    }

    #[tokio::test]
    async fn test_mark_complete_writes_timestamp() {
        let store = MemoryStore::new();

        mark_complete(&store, "bar", ".metadata").await.unwrap();

        assert!(check_existence(&store, "bar", ".metadata").await);
        let value: i64 = store.peek("bar.metadata").unwrap().parse().unwrap();
        assert!(value > 0);
        // 标记不会触碰锁 key
        assert!(store.peek("compile-bar").is_none());
    }

    #[tokio::test]
    async fn test_store_error_reads_as_absent() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_exists()
            .withf(|key| key == "bar.metadata")
            .times(1)
            .returning(|_| Err(StoreError::Unavailable("connection refused".into())));

        assert!(!check_existence(&store, "bar", ".metadata").await);
    }

    #[tokio::test]
    async fn test_mark_complete_propagates_store_error() {
        let store = MemoryStore::new();
        store.fail_next(StoreOp::Set, 1);

        let err = mark_complete(&store, "bar", ".metadata").await.unwrap_err();
        assert_eq!(err.code(), "STORE_UNAVAILABLE");
    }
}
