//! Redis 存储实现
//!
//! 锁使用 `SET key token NX PX ms` 获取，续约与释放通过 Lua 脚本
//! 原子地校验 token，避免操作其他客户端持有的锁。

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use compile_lock_shared::config::RedisConfig;
use compile_lock_shared::error::{Result, StoreError};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{DistributedMutex, KeyValueStore, LockHandle, RemainingLease};

/// 仅当 token 匹配时延长租约
const EXTEND_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("pexpire", KEYS[1], ARGV[2])
    else
        return 0
    end
"#;

/// 仅当 token 匹配时删除
const RELEASE_SCRIPT: &str = r#"
    if redis.call("get", KEYS[1]) == ARGV[1] then
        return redis.call("del", KEYS[1])
    else
        return 0
    end
"#;

/// Redis 存储客户端
///
/// 进程启动时建立一条由 `ConnectionManager` 管理的多路复用连接，
/// 所有操作共享这条连接，断线后自动重连。
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    /// 实例唯一标识，用于区分不同进程持有的锁
    instance_id: String,
}

impl RedisStore {
    /// 连接 Redis
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())?;
        let conn = client.get_connection_manager().await?;
        info!("Redis connection established");
        Ok(Self {
            conn,
            instance_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// 获取连接句柄，克隆开销很小，不会新建连接
    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.conn();
        ::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }

    fn new_token(&self) -> String {
        token_for(&self.instance_id)
    }
}

/// token 格式: instance_id:uuid
fn token_for(instance_id: &str) -> String {
    format!("{}:{}", instance_id, Uuid::new_v4())
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn remaining_lease(&self, key: &str) -> Result<RemainingLease> {
        let mut conn = self.conn();
        let pttl: i64 = ::redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        if pttl < -2 {
            return Err(StoreError::InvalidValue {
                key: key.to_string(),
                value: pttl.to_string(),
            });
        }
        Ok(RemainingLease::from_pttl(pttl))
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn();
        let _: i64 = ::redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DistributedMutex for RedisStore {
    #[instrument(skip(self), fields(instance_id = %self.instance_id))]
    async fn acquire(&self, resource: &str, lease: Duration) -> Result<Option<LockHandle>> {
        let token = self.new_token();
        let mut conn = self.conn();

        // SET key value NX PX milliseconds
        let result: Option<String> = ::redis::cmd("SET")
            .arg(resource)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        // SET NX 成功时返回 "OK"，失败时返回 None
        if result.is_some() {
            debug!(resource = %resource, "Redis lock acquired");
            Ok(Some(LockHandle::new(resource, token)))
        } else {
            Ok(None)
        }
    }

    async fn extend(&self, handle: &LockHandle, lease: Duration) -> Result<bool> {
        let mut conn = self.conn();
        let extended: i32 = Script::new(EXTEND_SCRIPT)
            .key(handle.resource())
            .arg(handle.token())
            .arg(lease.as_millis() as u64)
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, handle: &LockHandle) -> Result<bool> {
        let mut conn = self.conn();
        let deleted: i32 = Script::new(RELEASE_SCRIPT)
            .key(handle.resource())
            .arg(handle.token())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
