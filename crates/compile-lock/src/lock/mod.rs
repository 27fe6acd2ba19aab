//! 分布式锁模块
//!
//! 在存储提供的原子互斥原语之上实现租约生命周期管理。
//!
//! ## 设计理念
//!
//! - **有界等待**: 获取锁最多等待 `max_wait` 加一次陈旧检测，绝不无限阻塞
//! - **心跳续约**: 持有期间周期性延长租约，进程崩溃后锁随租约过期
//! - **保守回收**: 只有在确认心跳超时或租约无过期时间时才强制清除
//! - **错误不外泄**: 获取、续约、释放的失败都被吸收为可观测的结果
//!
//! ## 使用示例
//!
//! ```ignore
//! let lock = CompileLock::new(store, LockConfig::default());
//!
//! let release = lock.acquire_lock("my-artifact").await;
//! if !release.is_held() {
//!     warn!("running without exclusivity");
//! }
//!
//! compile().await?;
//!
//! release.release().await;
//! ```

mod heartbeat;
mod manager;
mod outcome;
mod release;
mod stale;

pub use heartbeat::{Heartbeat, HeartbeatSettings};
pub use manager::CompileLock;
pub use outcome::{ReleaseReport, StepOutcome, TickReport};
pub use release::LockRelease;
pub use stale::{StaleLockDetector, Staleness};
