//! 心跳续约
//!
//! 持有锁期间以 0.7 倍租约的周期运行：延长租约，并刷新心跳时间戳。
//! 单次失败只记录日志，不立即重试，由下一次心跳或租约自然过期兜底。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use super::outcome::{StepOutcome, TickReport};
use crate::clock::Clock;
use crate::config::LockConfig;
use crate::store::{KeyValueStore, LockHandle, LockStore};

/// 心跳参数
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatSettings {
    /// 心跳周期
    pub interval: Duration,
    /// 每次续约的租约时长
    pub lease: Duration,
    /// 心跳 key 的过期时间
    pub heartbeat_expiry: Duration,
}

impl From<&LockConfig> for HeartbeatSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            interval: config.heartbeat_interval(),
            lease: config.lock_ttl,
            heartbeat_expiry: config.heartbeat_expiry(),
        }
    }
}

/// 单调不减的心跳时间戳
///
/// 墙上时钟回拨时沿用上一次写入的值。
pub(crate) struct HeartbeatStamp {
    clock: Arc<dyn Clock>,
    last: i64,
}

impl HeartbeatStamp {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            last: i64::MIN,
        }
    }

    pub(crate) fn next(&mut self) -> i64 {
        self.last = self.last.max(self.clock.now_millis());
        self.last
    }
}

/// 写入心跳时间戳并重置其过期时间
///
/// `set` 与 `set_expiry` 是两次调用。后者失败时心跳 key 会暂时没有过期时间，
/// 陈旧判定仍以时间戳的年龄为准，残留的 key 不会让失效的持有者显得存活。
pub(crate) async fn write_heartbeat<K: KeyValueStore>(
    store: &K,
    heartbeat_key: &str,
    timestamp: i64,
    expiry: Duration,
) -> StepOutcome {
    if let Err(e) = store.set(heartbeat_key, &timestamp.to_string()).await {
        return StepOutcome::Failed(e.to_string());
    }
    StepOutcome::from_result(store.set_expiry(heartbeat_key, expiry).await)
}

/// 执行一次心跳
///
/// 租约已不属于本句柄时不再写心跳，避免替新的持有者伪造存活信号。
pub(crate) async fn beat<S: LockStore>(
    store: &S,
    handle: &LockHandle,
    heartbeat_key: &str,
    settings: &HeartbeatSettings,
    stamp: &mut HeartbeatStamp,
) -> TickReport {
    let extend = StepOutcome::from_ownership(store.extend(handle, settings.lease).await);
    let heartbeat = if extend == StepOutcome::NotOwned {
        StepOutcome::Skipped
    } else {
        write_heartbeat(store, heartbeat_key, stamp.next(), settings.heartbeat_expiry).await
    };
    TickReport { extend, heartbeat }
}

/// 运行中的心跳任务
///
/// 由 `LockRelease` 独占持有。`stop` 返回后不会再有任何心跳执行。
pub struct Heartbeat {
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Heartbeat {
    pub(crate) fn start<S: LockStore + 'static>(
        store: Arc<S>,
        handle: LockHandle,
        heartbeat_key: String,
        settings: HeartbeatSettings,
        stamp: HeartbeatStamp,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(store, handle, heartbeat_key, settings, stamp, stop_rx));
        Self {
            stop_tx,
            task: Some(task),
        }
    }

    /// 停止心跳并等待任务退出
    ///
    /// 正在执行的心跳会先完成；重复调用返回 `Skipped`。
    pub async fn stop(&mut self) -> StepOutcome {
        let Some(task) = self.task.take() else {
            return StepOutcome::Skipped;
        };
        // 接收端已退出时发送失败，无需处理
        let _ = self.stop_tx.send(true);
        join_outcome(task.await)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.stop_tx.send(true);
        }
    }
}

fn join_outcome(result: Result<(), tokio::task::JoinError>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Done,
        Err(e) => StepOutcome::Failed(e.to_string()),
    }
}

async fn run<S: LockStore>(
    store: Arc<S>,
    handle: LockHandle,
    heartbeat_key: String,
    settings: HeartbeatSettings,
    mut stamp: HeartbeatStamp,
    mut stop_rx: watch::Receiver<bool>,
) {
    let period = settings.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(resource = %handle.resource(), interval_ms = period.as_millis() as u64, "Heartbeat started");

    loop {
        tokio::select! {
            biased;
            // 发送端被丢弃同样视为停止
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {
                if *stop_rx.borrow() {
                    break;
                }
                beat(&*store, &handle, &heartbeat_key, &settings, &mut stamp)
                    .await
                    .discard(handle.resource());
            }
        }
    }

    debug!(resource = %handle.resource(), "Heartbeat stopped");
}
