//! 锁模块错误类型
//!
//! 锁的获取、续约与释放不向调用方返回错误；这里仅包含启动阶段的配置错误。

use thiserror::Error;

/// 锁模块错误类型
#[derive(Debug, Error)]
pub enum LockError {
    #[error("无效的锁配置: {field} - {message}")]
    InvalidConfig { field: &'static str, message: String },
}
