//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化和管理。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 服务名称，用于标识日志和指标的来源
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// 日志级别（如 "info", "debug"），`RUST_LOG` 优先
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 是否启用 JSON 格式日志
    #[serde(default)]
    pub json_logs: bool,

    /// 是否启动 Prometheus 指标导出
    #[serde(default)]
    pub metrics_enabled: bool,

    /// Prometheus 指标导出端口
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_service_name() -> String {
    "compile-lock".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            json_logs: false,
            metrics_enabled: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl ObservabilityConfig {
    /// 注入服务名
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 可观测性资源守卫
///
/// 持有 Prometheus 导出器的生命周期，drop 时导出器随之停止。
pub struct ObservabilityGuard {
    metrics: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 创建一个空的 Guard（用于测试或禁用可观测性时）
    pub fn empty() -> Self {
        Self { metrics: None }
    }

    /// 当前指标快照，未启用指标时返回 None
    pub fn metrics_snapshot(&self) -> Option<String> {
        self.metrics.as_ref().map(|m| m.render())
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        ::tracing::debug!("Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 初始化顺序：
/// 1. Tracing（日志）
/// 2. Metrics（仅在 `metrics_enabled` 时安装 Prometheus 导出器）
///
/// 需要在 tokio runtime 内调用，导出器的 HTTP listener 运行在 runtime 上。
pub fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    let metrics = if config.metrics_enabled {
        Some(metrics::init(config)?)
    } else {
        None
    };

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        "Observability initialized"
    );

    Ok(ObservabilityGuard { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.log_level, "info");
        assert!(!config.json_logs);
        assert!(!config.metrics_enabled);
    }

    #[test]
    fn test_with_service_name() {
        let config = ObservabilityConfig::default().with_service_name("ci-runner");
        assert_eq!(config.service_name, "ci-runner");
    }
}
