//! 心跳时间源
//!
//! 心跳 key 中保存的是 Unix 毫秒时间戳。生产环境使用系统时钟，
//! 测试中使用随 tokio 虚拟时间推进的时钟，保证与存储过期时间一致。

use chrono::Utc;
use tokio::time::Instant;

/// 毫秒级时间源
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// 随 tokio 时间推进的时钟
///
/// 创建时记录当前系统时间作为基准，此后按 `tokio::time::Instant` 的流逝递增，
/// 在 `start_paused` 测试中与 `tokio::time::advance` 同步。
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
    base_millis: i64,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            base_millis: Utc::now().timestamp_millis(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> i64 {
        self.base_millis + self.origin.elapsed().as_millis() as i64
    }
}
