//! 测试工具模块
//!
//! 提供集成测试所需的配置辅助函数和唯一名称生成器。

use uuid::Uuid;

use crate::config::{LockSettings, RedisConfig};

/// 创建测试用 Redis 配置
///
/// 优先使用环境变量，否则使用本地 db 1
pub fn test_redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
    }
}

/// 缩短了时长的锁参数，便于集成测试快速结束
pub fn fast_lock_settings() -> LockSettings {
    LockSettings {
        ttl_ms: 1_000,
        max_wait_ms: 2_000,
        retry_delay_ms: 50,
        ..LockSettings::default()
    }
}

/// 生成唯一的构建名称
pub fn unique_build_name() -> String {
    format!("test-build-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_build_name() {
        let a = unique_build_name();
        let b = unique_build_name();
        assert!(a.starts_with("test-build-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fast_lock_settings_keep_suffix() {
        let settings = fast_lock_settings();
        assert_eq!(settings.ttl_ms, 1_000);
        assert_eq!(settings.metadata_suffix, ".metadata");
    }
}
