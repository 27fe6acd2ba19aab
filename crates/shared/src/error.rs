//! 统一错误处理模块
//!
//! 定义存储适配层共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 存储错误类型
#[derive(Debug, Error)]
pub enum StoreError {
    // ==================== 连接错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("存储不可用: {0}")]
    Unavailable(String),

    // ==================== 数据错误 ====================
    #[error("无效的存储值: key={key}, value={value}")]
    InvalidValue { key: String, value: String },
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Redis(_) => "REDIS_ERROR",
            Self::Unavailable(_) => "STORE_UNAVAILABLE",
            Self::InvalidValue { .. } => "INVALID_VALUE",
        }
    }

    /// 是否为瞬时错误（下一个周期可能恢复）
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Redis(e) => e.is_timeout() || e.is_connection_dropped() || e.is_io_error(),
            Self::Unavailable(_) => true,
            Self::InvalidValue { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = StoreError::InvalidValue {
            key: "compile-foo:hb".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(err.code(), "INVALID_VALUE");
        assert_eq!(StoreError::Unavailable("down".into()).code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_is_retryable() {
        assert!(StoreError::Unavailable("connection refused".into()).is_retryable());
        let invalid = StoreError::InvalidValue {
            key: "compile-foo".to_string(),
            value: "-7".to_string(),
        };
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn test_error_message_contains_key() {
        let err = StoreError::InvalidValue {
            key: "compile-foo:hb".to_string(),
            value: "not-a-number".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("compile-foo:hb"));
        assert!(message.contains("not-a-number"));
    }
}
