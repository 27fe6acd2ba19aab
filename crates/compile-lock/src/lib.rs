//! 编译任务分布式锁
//!
//! 让多个互不共享内存的进程通过共享 KV 存储互斥地执行同名编译任务。
//!
//! ## 核心功能
//!
//! - **获取锁**：有界重试，等待超时后尝试回收陈旧锁
//! - **心跳续约**：持有期间周期性延长租约并刷新存活时间戳
//! - **陈旧锁回收**：持有者崩溃或停滞时安全地强制清除
//! - **构建标记**：查询构建完成标记是否存在
//!
//! ## 模块结构
//!
//! - `store`: 存储能力抽象及 Redis / 内存实现
//! - `lock`: 获取、心跳、陈旧检测与释放
//! - `existence`: 构建完成标记
//! - `keys`: 存储 key 命名约定
//! - `config`: 运行时锁参数
//! - `clock`: 心跳时间戳的时间源

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod existence;
pub mod keys;
pub mod lock;
pub mod store;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::LockConfig;
pub use error::LockError;
pub use keys::LockKeys;
pub use lock::{
    CompileLock, HeartbeatSettings, LockRelease, ReleaseReport, StaleLockDetector, Staleness,
    StepOutcome, TickReport,
};
pub use store::{
    DistributedMutex, KeyValueStore, LockHandle, LockStore, MemoryStore, RedisStore,
    RemainingLease, StoreOp,
};
