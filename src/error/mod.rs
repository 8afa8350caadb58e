//! 错误处理模块
//!
//! 提供注册表统一错误类型与错误代码分类

pub mod code;
pub mod registry_error;

// 重新导出公共类型
pub use code::{ErrorCategory, ErrorCode};
pub use registry_error::{RegistryError, Result};
