//! 注册表统一错误类型

use super::code::ErrorCode;
use crate::store::StoreError;
use thiserror::Error;

/// 注册表统一错误类型
///
/// 后端存储错误原样透传（`Upstream`），本层不做重试也不附加推断语义。
#[derive(Error, Debug)]
pub enum RegistryError {
    /// 参数非法（例如注册一个没有节点的服务）
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 按选择器查不到任何记录
    #[error("service not found")]
    NotFound,

    /// 服务描述 JSON 解码失败
    #[error("could not unmarshal service '{name}'")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// 服务描述 JSON 编码失败
    #[error("could not marshal service '{name}'")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// 后端存储调用失败
    #[error(transparent)]
    Upstream(#[from] StoreError),

    /// 监听通道已关闭
    #[error("result chan closed")]
    ClosedChannel,

    /// 配置错误
    #[error("configuration error: {0}")]
    Config(String),
}

impl RegistryError {
    /// 创建参数错误
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RegistryError::InvalidArgument(msg.into())
    }

    /// 创建配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        RegistryError::Config(msg.into())
    }

    /// 获取对应的错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            RegistryError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            RegistryError::NotFound => ErrorCode::ServiceNotFound,
            RegistryError::Decode { .. } => ErrorCode::DeserializationError,
            RegistryError::Encode { .. } => ErrorCode::SerializationError,
            RegistryError::Upstream(_) => ErrorCode::UpstreamError,
            RegistryError::ClosedChannel => ErrorCode::WatcherClosed,
            RegistryError::Config(_) => ErrorCode::ConfigurationError,
        }
    }

    /// 是否为 NotFound
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound)
    }
}

/// 注册表结果类型
pub type Result<T> = std::result::Result<T, RegistryError>;
