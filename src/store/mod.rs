//! Secret 存储抽象
//!
//! 注册表把每个进程实例持久化为一个 Secret 对象。与控制面 API Server 的
//! REST 交互（认证、TLS、请求重试）以及 watch 报文的流式解码都在本 crate
//! 之外，这里只定义注册表需要的最小接口。

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use memory::MemorySecretStore;

/// 标签选择器：label key -> label value
pub type Selector = BTreeMap<String, String>;

/// 后端存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// 对象不存在
    #[error("secret '{0}' not found")]
    NotFound(String),

    /// 传输层失败（HTTP、连接、鉴权等）
    #[error("store transport error: {0}")]
    Transport(String),
}

/// Secret 对象元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub labels: HashMap<String, Option<String>>,

    #[serde(default)]
    pub annotations: HashMap<String, Option<String>>,
}

/// Secret 对象（一个注册进程实例对应一个）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ObjectMeta>,

    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl Secret {
    /// 对象名称（未设置元数据时为空字符串）
    pub fn name(&self) -> &str {
        self.metadata.as_ref().map(|m| m.name.as_str()).unwrap_or("")
    }

    /// 检查标签是否满足选择器的全部条件
    pub fn matches(&self, selector: &Selector) -> bool {
        let Some(meta) = &self.metadata else {
            return selector.is_empty();
        };
        selector.iter().all(|(key, value)| {
            meta.labels
                .get(key)
                .and_then(|v| v.as_deref())
                .map(|v| v == value)
                .unwrap_or(false)
        })
    }
}

/// Watch 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Added,
    Modified,
    Deleted,
    Error,
}

/// 一条原始 watch 通知，`object` 为对象的 JSON 文本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub object: String,
}

/// 一个打开的 watch 订阅
///
/// `stop()` 之后 `next()` 立即返回 `None`；上游结束时同样返回 `None`。
pub struct SecretWatch {
    events: BoxStream<'static, WatchEvent>,
    cancel: CancellationToken,
}

impl SecretWatch {
    pub fn new<S>(events: S, cancel: CancellationToken) -> Self
    where
        S: Stream<Item = WatchEvent> + Send + 'static,
    {
        Self {
            events: events.boxed(),
            cancel,
        }
    }

    /// 等待下一条通知
    pub async fn next(&mut self) -> Option<WatchEvent> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            event = self.events.next() => event,
        }
    }

    /// 取消订阅（幂等）
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// 获取取消句柄，用于在持有订阅的任务之外停止它
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Secret 存储客户端
///
/// 注意：由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// 按标签选择器列出 Secret
    async fn list_secrets(&self, selector: &Selector) -> Result<Vec<Secret>, StoreError>;

    /// 以 `name` 为键写入 Secret（已存在则整体替换）
    async fn create_secret(&self, name: &str, secret: Secret) -> Result<Secret, StoreError>;

    /// 删除 Secret，不存在时返回 `StoreError::NotFound`
    async fn delete_secret(&self, name: &str) -> Result<(), StoreError>;

    /// 打开按标签选择器过滤的 watch 订阅
    async fn watch_secrets(&self, selector: &Selector) -> Result<SecretWatch, StoreError>;
}
