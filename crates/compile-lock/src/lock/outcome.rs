//! 尽力而为步骤的结果
//!
//! 心跳与释放中的每一步都不会向调用方传播错误，而是产出一个 `StepOutcome`。
//! 报告在固定位置被记录日志后丢弃，测试可以直接断言其内容。

use compile_lock_shared::error::Result;
use compile_lock_shared::observability::metrics;
use tracing::warn;

/// 单个步骤的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// 句柄已不再持有锁
    NotOwned,
    /// 未执行（前置条件不满足或已释放）
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    /// 用于 `extend` / `release` 这类返回是否仍持有锁的操作
    pub fn from_ownership(result: Result<bool>) -> Self {
        match result {
            Ok(true) => Self::Done,
            Ok(false) => Self::NotOwned,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// 一次心跳的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub extend: StepOutcome,
    pub heartbeat: StepOutcome,
}

impl TickReport {
    pub fn is_ok(&self) -> bool {
        self.extend.is_done() && self.heartbeat.is_done()
    }

    /// 记录并丢弃本次结果，失败留给下一次心跳或租约过期处理
    pub fn discard(self, resource: &str) {
        if self.is_ok() {
            metrics::record_heartbeat("ok");
            return;
        }
        if self.extend == StepOutcome::NotOwned {
            metrics::record_heartbeat("lost");
            warn!(resource = %resource, "Heartbeat found the lease no longer owned");
        } else {
            metrics::record_heartbeat("failed");
            warn!(
                resource = %resource,
                extend = ?self.extend,
                heartbeat = ?self.heartbeat,
                "Heartbeat tick failed, waiting for next tick"
            );
        }
    }
}

/// 一次释放的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    pub heartbeat_stopped: StepOutcome,
    pub lease_released: StepOutcome,
    pub heartbeat_deleted: StepOutcome,
}

impl ReleaseReport {
    /// 未持有锁或重复释放
    pub fn skipped() -> Self {
        Self {
            heartbeat_stopped: StepOutcome::Skipped,
            lease_released: StepOutcome::Skipped,
            heartbeat_deleted: StepOutcome::Skipped,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.heartbeat_stopped.is_done()
            && self.lease_released.is_done()
            && self.heartbeat_deleted.is_done()
    }

    pub fn is_skipped(&self) -> bool {
        *self == Self::skipped()
    }
}
