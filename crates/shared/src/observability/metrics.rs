//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 未安装 recorder 时，所有记录函数均为空操作。

use anyhow::{Result, anyhow};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::ObservabilityConfig;

/// Metrics 资源守卫
///
/// 持有全局 recorder 的句柄与导出器任务，drop 时停止导出器。
pub struct MetricsHandle {
    handle: PrometheusHandle,
    exporter: JoinHandle<()>,
}

impl MetricsHandle {
    /// 渲染当前指标快照（Prometheus 文本格式）
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.exporter.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 安装全局 recorder，并在指定端口启动 HTTP listener 暴露指标。
/// 需要在 tokio runtime 内调用。
pub fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let (recorder, exporter) = PrometheusBuilder::new().with_http_listener(addr).build()?;
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|_| anyhow!("a global metrics recorder is already installed"))?;

    let exporter = tokio::spawn(async move {
        if let Err(e) = exporter.await {
            error!(error = ?e, "Metrics exporter stopped");
        }
    });
    info!("Metrics exporter listening on {}", addr);

    register_common_metrics(&config.service_name);
    Ok(MetricsHandle { handle, exporter })
}

/// 注册锁相关指标的描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(
        "compile_lock_acquire_total",
        "Lock acquisitions by outcome (acquired, exhausted)"
    );
    metrics::describe_histogram!(
        "compile_lock_wait_seconds",
        "Time spent waiting before a lock was acquired"
    );
    metrics::describe_counter!(
        "compile_lock_reclaim_total",
        "Stale-lock detector decisions by outcome"
    );
    metrics::describe_counter!(
        "compile_lock_heartbeat_total",
        "Heartbeat ticks by outcome (ok, failed, lost)"
    );
    metrics::describe_counter!("compile_lock_release_total", "Lock releases");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次获取锁的结果
#[inline]
pub fn record_lock_acquire(outcome: &'static str) {
    metrics::counter!("compile_lock_acquire_total", "outcome" => outcome).increment(1);
}

/// 记录获取锁前的等待时长
#[inline]
pub fn observe_lock_wait(waited: Duration) {
    metrics::histogram!("compile_lock_wait_seconds").record(waited.as_secs_f64());
}

/// 记录一次陈旧锁判定
#[inline]
pub fn record_lock_reclaim(outcome: &'static str) {
    metrics::counter!("compile_lock_reclaim_total", "outcome" => outcome).increment(1);
}

/// 记录一次心跳
#[inline]
pub fn record_heartbeat(outcome: &'static str) {
    metrics::counter!("compile_lock_heartbeat_total", "outcome" => outcome).increment(1);
}

/// 记录一次释放
#[inline]
pub fn record_lock_release() {
    metrics::counter!("compile_lock_release_total").increment(1);
}
