//! 错误代码和错误类别定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
///
/// 错误代码按类别分组，每个类别占用1000个代码范围：
/// - 1000-1999: 参数相关错误
/// - 2000-2999: 注册表查询相关错误
/// - 3000-3999: 序列化相关错误
/// - 4000-4999: 后端存储相关错误
/// - 5000-5999: 监听相关错误
/// - 6000-6999: 配置相关错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 参数相关错误 (1000-1999)
    // ============================================================
    InvalidArgument = 1000,

    // ============================================================
    // 注册表查询相关错误 (2000-2999)
    // ============================================================
    ServiceNotFound = 2000,

    // ============================================================
    // 序列化相关错误 (3000-3999)
    // ============================================================
    SerializationError = 3000,
    DeserializationError = 3001,

    // ============================================================
    // 后端存储相关错误 (4000-4999)
    // ============================================================
    UpstreamError = 4000,

    // ============================================================
    // 监听相关错误 (5000-5999)
    // ============================================================
    WatcherClosed = 5000,

    // ============================================================
    // 配置相关错误 (6000-6999)
    // ============================================================
    ConfigurationError = 6000,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Argument,
    Lookup,
    Serialization,
    Upstream,
    Watch,
    Configuration,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::InvalidArgument),
            2000 => Some(ErrorCode::ServiceNotFound),
            3000 => Some(ErrorCode::SerializationError),
            3001 => Some(ErrorCode::DeserializationError),
            4000 => Some(ErrorCode::UpstreamError),
            5000 => Some(ErrorCode::WatcherClosed),
            6000 => Some(ErrorCode::ConfigurationError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::DeserializationError => "DESERIALIZATION_ERROR",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
            ErrorCode::WatcherClosed => "WATCHER_CLOSED",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() / 1000 {
            1 => ErrorCategory::Argument,
            2 => ErrorCategory::Lookup,
            3 => ErrorCategory::Serialization,
            4 => ErrorCategory::Upstream,
            5 => ErrorCategory::Watch,
            _ => ErrorCategory::Configuration,
        }
    }
}
