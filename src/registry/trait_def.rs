//! 服务注册发现 Trait 定义

use crate::error::Result;
use crate::types::{DiscoveryEvent, ServiceRecord};
use async_trait::async_trait;
use std::time::Duration;

/// 默认操作超时
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// 默认命名空间
pub const DEFAULT_NAMESPACE: &str = "default";

/// 注册表选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Secret 所在的命名空间
    pub namespace: String,
    /// 单次后端调用的超时，由存储客户端使用
    pub timeout: Duration,
    /// 控制面地址（为空表示集群内模式）
    pub addrs: Vec<String>,
    /// 进程实例 ID；为空时从 `HOSTNAME` 环境变量获取
    pub instance_id: Option<String>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: DEFAULT_TIMEOUT,
            addrs: Vec::new(),
            instance_id: None,
        }
    }
}

impl RegistryOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

/// 注册选项
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// 注册有效期；Secret 后端没有租约机制，设置后会被忽略
    pub ttl: Option<Duration>,
}

/// 监听选项
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    /// 只监听指定服务；为空时监听全部服务
    pub service: Option<String>,
}

impl WatchOptions {
    /// 只监听指定服务
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            service: Some(name.into()),
        }
    }
}

/// 服务注册发现 Trait
#[async_trait]
pub trait Registry: Send + Sync {
    /// 注册表选项
    fn options(&self) -> &RegistryOptions;

    /// 注册服务（当前进程实例）
    async fn register(&self, service: &ServiceRecord, opts: RegisterOptions) -> Result<()>;

    /// 注销服务（当前进程实例）
    async fn deregister(&self, service: &ServiceRecord) -> Result<()>;

    /// 获取指定名称的服务
    async fn get_service(&self, name: &str) -> Result<Vec<ServiceRecord>>;

    /// 列出所有服务名称
    async fn list_services(&self) -> Result<Vec<ServiceRecord>>;

    /// 监听服务变化
    async fn watch(&self, opts: WatchOptions) -> Result<Box<dyn Watcher>>;

    /// 注册表实现名称
    fn name(&self) -> &'static str;
}

/// 服务变化监听器
#[async_trait]
pub trait Watcher: Send + Sync {
    /// 阻塞直到有新的事件；关闭后返回 `RegistryError::ClosedChannel`
    async fn next(&self) -> Result<DiscoveryEvent>;

    /// 停止监听（可重复调用）
    fn stop(&self);
}
