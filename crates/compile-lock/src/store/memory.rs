//! 内存存储实现
//!
//! 所有操作在一把互斥锁内完成，因此 `acquire` 天然是原子的。
//! 过期时间基于 `tokio::time::Instant`，可配合暂停的测试时钟使用。

use async_trait::async_trait;
use compile_lock_shared::error::{Result, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use super::{DistributedMutex, KeyValueStore, LockHandle, RemainingLease};

/// 可注入故障的存储操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    Get,
    Set,
    Delete,
    RemainingLease,
    SetExpiry,
    Acquire,
    Extend,
    Release,
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    /// 每种操作接下来需要失败的次数
    failures: HashMap<StoreOp, u32>,
    offline: bool,
}

impl State {
    fn check(&mut self, op: StoreOp) -> Result<()> {
        if self.offline {
            return Err(StoreError::Unavailable(format!("store offline ({:?})", op)));
        }
        if let Some(remaining) = self.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable(format!("injected failure ({:?})", op)));
            }
        }
        Ok(())
    }

    /// 取出仍然有效的条目，顺便清除已过期的条目
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来 `times` 次 `op` 操作返回 `StoreError::Unavailable`
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        *self.state.lock().failures.entry(op).or_insert(0) += times;
    }

    /// 离线期间所有操作均失败
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// 直接读取当前值，不经过故障注入
    pub fn peek(&self, key: &str) -> Option<String> {
        self.state.lock().live(key).map(|e| e.value.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut state = self.state.lock();
        state.check(StoreOp::Exists)?;
        Ok(state.live(key).is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.state.lock();
        state.check(StoreOp::Get)?;
        Ok(state.live(key).map(|e| e.value.clone()))
    }

    /// 与 Redis `SET` 一致：覆盖值并清除过期时间
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check(StoreOp::Set)?;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check(StoreOp::Delete)?;
        state.entries.remove(key);
        Ok(())
    }

    async fn remaining_lease(&self, key: &str) -> Result<RemainingLease> {
        let mut state = self.state.lock();
        state.check(StoreOp::RemainingLease)?;
        let now = Instant::now();
        Ok(match state.live(key) {
            None => RemainingLease::Absent,
            Some(Entry {
                expires_at: None, ..
            }) => RemainingLease::NoExpiry,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => RemainingLease::Remaining(at.saturating_duration_since(now)),
        })
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.check(StoreOp::SetExpiry)?;
        if let Some(entry) = state.live(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[async_trait]
impl DistributedMutex for MemoryStore {
    async fn acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockHandle>> {
        let mut state = self.state.lock();
        state.check(StoreOp::Acquire)?;
        if state.live(resource).is_some() {
            return Ok(None);
        }
        let token = Uuid::new_v4().to_string();
        state.entries.insert(
            resource.to_string(),
            Entry {
                value: token.clone(),
                expires_at: Some(Instant::now() + lease),
            },
        );
        Ok(Some(LockHandle::new(resource, token)))
    }

    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool> {
        let mut state = self.state.lock();
        state.check(StoreOp::Extend)?;
        match state.live(handle.resource()) {
            Some(entry) if entry.value == handle.token() => {
                entry.expires_at = Some(Instant::now() + lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let mut state = self.state.lock();
        state.check(StoreOp::Release)?;
        let owned = state
            .live(handle.resource())
            .is_some_and(|entry| entry.value == handle.token());
        if owned {
            state.entries.remove(handle.resource());
        }
        Ok(owned)
    }
}
