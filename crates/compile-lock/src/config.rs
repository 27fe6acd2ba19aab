//! 运行时锁参数

use compile_lock_shared::config::LockSettings;
use std::time::Duration;

use crate::error::LockError;

/// 锁配置
///
/// 心跳周期、心跳过期时间与陈旧判定阈值均由 `lock_ttl` 派生：
/// 心跳周期为 0.7 倍租约，心跳 key 过期时间与陈旧阈值为 2 倍租约。
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// 锁租约时长
    pub lock_ttl: Duration,
    /// 获取锁的最长等待时间（超过后进行一次陈旧检测）
    pub max_wait: Duration,
    /// 重试间隔
    pub retry_delay: Duration,
    /// 构建完成标记的 key 后缀
    pub metadata_suffix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_millis(5_000),
            max_wait: Duration::from_millis(15_000),
            retry_delay: Duration::from_millis(200),
            metadata_suffix: ".metadata".to_string(),
        }
    }
}

impl LockConfig {
    /// 心跳周期
    pub fn heartbeat_interval(&self) -> Duration {
        self.lock_ttl * 7 / 10
    }

    /// 心跳 key 的过期时间
    pub fn heartbeat_expiry(&self) -> Duration {
        self.lock_ttl * 2
    }

    /// 心跳超过该时长未刷新即视为持有者已失效
    pub fn stale_after(&self) -> Duration {
        self.lock_ttl * 2
    }

    pub fn validate(&self) -> Result<(), LockError> {
        if self.heartbeat_interval().is_zero() {
            return Err(LockError::InvalidConfig {
                field: "lock_ttl",
                message: format!("too short to derive a heartbeat interval: {:?}", self.lock_ttl),
            });
        }
        if self.metadata_suffix.is_empty() {
            return Err(LockError::InvalidConfig {
                field: "metadata_suffix",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl From<&LockSettings> for LockConfig {
    fn from(settings: &LockSettings) -> Self {
        Self {
            lock_ttl: Duration::from_millis(settings.ttl_ms),
            max_wait: Duration::from_millis(settings.max_wait_ms),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            metadata_suffix: settings.metadata_suffix.clone(),
        }
    }
}
