//! CLI 模块
//!
//! - `exists` - 查询构建完成标记
//! - `run` - 在锁保护下执行编译命令
//! - `mark` - 写入构建完成标记
//!
//! # 使用示例
//!
//! ```bash
//! # 产物已存在时跳过构建
//! compile-lock exists my-artifact || compile-lock run my-artifact -- make -j8
//!
//! # 构建成功后写入标记
//! compile-lock mark my-artifact
//!
//! # 单进程本地运行，不依赖 Redis
//! compile-lock --store memory run my-artifact -- cargo build
//! ```

pub mod commands;
pub mod runner;

pub use commands::{Cli, Commands, StoreKind};
pub use runner::CommandRunner;
