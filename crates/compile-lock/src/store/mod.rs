//! 存储能力抽象
//!
//! 锁协议只依赖两组能力：普通 KV 操作（含租约查询）与原子互斥原语。
//! 进程启动时构造具体实现并注入 `CompileLock`。
//!
//! - `RedisStore`: 单节点 Redis，基于 `SET NX PX` 与 token 校验脚本
//! - `MemoryStore`: 进程内实现，支持故障注入，用于测试与单进程运行

mod memory;
mod redis;

pub use memory::{MemoryStore, StoreOp};
pub use redis::RedisStore;

use async_trait::async_trait;
use compile_lock_shared::error::Result;
use std::time::Duration;

/// key 的剩余租约
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingLease {
    /// key 不存在
    Absent,
    /// key 存在但没有过期时间
    NoExpiry,
    /// 剩余时长
    Remaining(Duration),
}

impl RemainingLease {
    /// 解析 Redis `PTTL` 返回值：-2 表示不存在，-1 表示无过期时间
    pub fn from_pttl(pttl: i64) -> Self {
        match pttl {
            -2 => Self::Absent,
            ms if ms < 0 => Self::NoExpiry,
            ms => Self::Remaining(Duration::from_millis(ms as u64)),
        }
    }
}

/// 锁句柄
///
/// 由互斥原语在获取成功时签发。续约与释放都必须出示同一个 token，
/// 因此即使资源名在重新获取后相同，也无法误操作他人的锁。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    resource: String,
    token: String,
}

impl LockHandle {
    pub fn new(resource: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            token: token.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// KV 存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn remaining_lease(&self, key: &str) -> Result<RemainingLease>;
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// 原子互斥原语
///
/// `extend` 与 `release` 返回 false 表示该句柄已不再持有锁（租约过期或被回收）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributedMutex: Send + Sync {
    /// 资源空闲时原子地获取锁，已被占用返回 `None`
    async fn acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockHandle>>;
    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool>;
    async fn release(&self, handle: &LockHandle) -> Result<bool>;
}

/// 同时具备两组能力的存储
pub trait LockStore: KeyValueStore + DistributedMutex {}

impl<T: KeyValueStore + DistributedMutex> LockStore for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_lease_from_pttl() {
        assert_eq!(RemainingLease::from_pttl(-2), RemainingLease::Absent);
        assert_eq!(RemainingLease::from_pttl(-1), RemainingLease::NoExpiry);
        assert_eq!(
            RemainingLease::from_pttl(4_321),
            RemainingLease::Remaining(Duration::from_millis(4_321))
        );
        assert_eq!(
            RemainingLease::from_pttl(0),
            RemainingLease::Remaining(Duration::ZERO)
        );
    }

    #[test]
    fn test_lock_handle_accessors() {
        let handle = LockHandle::new("compile-foo", "instance:token");
        assert_eq!(handle.resource(), "compile-foo");
        assert_eq!(handle.token(), "instance:token");
        assert_ne!(handle, LockHandle::new("compile-foo", "instance:other"));
    }
}
