//! 服务注册发现模块
//!
//! 以 Kubernetes Secret 为存储的服务注册表：注册、注销、查询、列举与监听。

pub mod kubernetes;
pub mod selector;
pub mod trait_def;
pub mod watcher;

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::store::SecretStore;

pub use kubernetes::{KubernetesRegistry, encode_secret};
pub use selector::{
    annotation_key, format_selector, is_service_key, sanitize_name, service_selector,
    type_selector,
};
pub use trait_def::{RegisterOptions, Registry, RegistryOptions, WatchOptions, Watcher};
pub use watcher::KubernetesWatcher;

/// 注册表类型别名
pub type ServiceRegistry = Box<dyn Registry>;

/// 从配置创建注册表实例
pub fn create_registry(
    store: Arc<dyn SecretStore>,
    config: &RegistryConfig,
) -> Result<ServiceRegistry> {
    let registry = KubernetesRegistry::new(store, config.to_options())?;
    Ok(Box::new(registry))
}
