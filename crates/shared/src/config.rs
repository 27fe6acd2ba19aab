//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

/// Redis 配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
        }
    }
}

/// 分布式锁参数
///
/// 所有时长以毫秒为单位，便于通过环境变量覆盖。
/// 心跳周期与心跳过期时间由 `lock_ttl` 派生，不单独配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// 锁租约时长
    pub ttl_ms: u64,
    /// 获取锁的最长等待时间
    pub max_wait_ms: u64,
    /// 两次获取尝试之间的间隔
    pub retry_delay_ms: u64,
    /// 构建完成标记的 key 后缀
    pub metadata_suffix: String,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            max_wait_ms: 15_000,
            retry_delay_ms: 200,
            metadata_suffix: ".metadata".to_string(),
        }
    }
}

/// 环境变量配置源
///
/// `COMPILE_LOCK_` 前缀，`__` 分隔层级，数值字符串会被解析为数字。
pub fn env_source() -> Environment {
    Environment::with_prefix("COMPILE_LOCK")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub redis: RedisConfig,
    pub lock: LockSettings,
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "compile-lock".to_string(),
            environment: "development".to_string(),
            redis: RedisConfig::default(),
            lock: LockSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. 环境变量（COMPILE_LOCK_ 前缀，`__` 分隔层级，如 COMPILE_LOCK_LOCK__TTL_MS -> lock.ttl_ms）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("COMPILE_LOCK_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir), env_source())
    }

    /// 按给定的配置目录与环境变量源加载配置，层级顺序与 [`AppConfig::load`] 相同
    pub fn load_from(
        service_name: &str,
        env: &str,
        config_dir: &Path,
        environment: Environment,
    ) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(environment);

        builder.build()?.try_deserialize()
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{FileFormat, Map};
    use std::path::PathBuf;

    fn from_toml(source: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("config should deserialize")
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.redis.url, "redis://localhost:6379");
        assert_eq!(config.lock.ttl_ms, 5_000);
        assert_eq!(config.lock.max_wait_ms, 15_000);
        assert_eq!(config.lock.retry_delay_ms, 200);
        assert_eq!(config.lock.metadata_suffix, ".metadata");
    }

    #[test]
    fn test_partial_lock_section_keeps_defaults() {
        let config = from_toml(
            r#"
            [lock]
            ttl_ms = 8000
            "#,
        );
        assert_eq!(config.lock.ttl_ms, 8_000);
        assert_eq!(config.lock.max_wait_ms, 15_000);
        assert_eq!(config.lock.metadata_suffix, ".metadata");
        assert_eq!(config.service_name, "compile-lock");
    }

    #[test]
    fn test_redis_and_suffix_override() {
        let config = from_toml(
            r#"
            environment = "production"

            [redis]
            url = "redis://cache.internal:6380/2"

            [lock]
            metadata_suffix = ":meta"
            "#,
        );
        assert_eq!(config.redis.url, "redis://cache.internal:6380/2");
        assert_eq!(config.lock.metadata_suffix, ":meta");
        assert!(config.is_production());
    }

    fn vars(pairs: &[(&str, &str)]) -> Environment {
        let map: Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        env_source().source(Some(map))
    }

    fn repo_config_dir() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    #[test]
    fn test_env_vars_override_nested_fields() {
        let config = AppConfig::load_from(
            "compile-lock",
            "development",
            Path::new("does-not-exist"),
            vars(&[
                ("COMPILE_LOCK_LOCK__TTL_MS", "8000"),
                ("COMPILE_LOCK_REDIS__URL", "redis://cache.internal:6380/2"),
                ("COMPILE_LOCK_LOCK__METADATA_SUFFIX", ":meta"),
            ]),
        )
        .expect("config should load");

        assert_eq!(config.lock.ttl_ms, 8_000);
        assert_eq!(config.redis.url, "redis://cache.internal:6380/2");
        assert_eq!(config.lock.metadata_suffix, ":meta");
        assert_eq!(config.lock.max_wait_ms, 15_000);
        assert_eq!(config.service_name, "compile-lock");
    }

    #[test]
    fn test_env_vars_win_over_config_files() {
        let files_only =
            AppConfig::load_from("compile-lock", "production", &repo_config_dir(), vars(&[]))
                .expect("config should load");
        let overridden = AppConfig::load_from(
            "compile-lock",
            "production",
            &repo_config_dir(),
            vars(&[
                ("COMPILE_LOCK_LOCK__MAX_WAIT_MS", "30000"),
                ("COMPILE_LOCK_OBSERVABILITY__METRICS_PORT", "9191"),
            ]),
        )
        .expect("config should load");

        assert!(overridden.is_production());
        assert_eq!(overridden.lock.max_wait_ms, 30_000);
        assert_eq!(overridden.observability.metrics_port, 9191);
        // 未覆盖的项保持文件中的值
        assert_eq!(overridden.lock.ttl_ms, files_only.lock.ttl_ms);
        assert_eq!(overridden.redis.url, files_only.redis.url);
    }

    #[test]
    fn test_unprefixed_vars_are_ignored() {
        let config = AppConfig::load_from(
            "compile-lock",
            "development",
            Path::new("does-not-exist"),
            vars(&[("LOCK__TTL_MS", "1"), ("REDIS_URL", "redis://elsewhere:6379")]),
        )
        .expect("config should load");

        assert_eq!(config.lock.ttl_ms, 5_000);
        assert_eq!(config.redis.url, "redis://localhost:6379");
    }
}
