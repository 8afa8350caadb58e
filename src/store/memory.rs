//! 内存 Secret 存储
//!
//! 行为上模拟控制面的 Secret 资源：按标签过滤、按名称整体替换写入、删除、
//! 以及 ADDED / MODIFIED / DELETED 通知的 watch 扇出。用于本地开发与测试。
//!
//! 每个 watch 订阅使用有界缓冲区；缓冲区满时写操作等待订阅方消费，
//! 因此下游的背压会一直传到写入方。

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 每个 watch 订阅默认缓冲的通知数
pub const DEFAULT_WATCH_BUFFER: usize = 16;
use uuid::Uuid;

use super::{EventKind, Secret, SecretStore, SecretWatch, Selector, StoreError, WatchEvent};

struct WatchSink {
    selector: Selector,
    tx: mpsc::Sender<WatchEvent>,
    cancel: CancellationToken,
}

impl WatchSink {
    fn is_alive(&self) -> bool {
        !self.tx.is_closed() && !self.cancel.is_cancelled()
    }
}

#[derive(Default)]
struct Inner {
    secrets: BTreeMap<String, Secret>,
    sinks: Vec<WatchSink>,
    injected_failure: Option<StoreError>,
}

impl Inner {
    fn take_failure(&mut self) -> Result<(), StoreError> {
        match self.injected_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn broadcast(&mut self, kind: EventKind, secret: &Secret) {
        self.sinks.retain(WatchSink::is_alive);
        if self.sinks.is_empty() {
            return;
        }

        let object = match serde_json::to_string(secret) {
            Ok(object) => object,
            Err(e) => {
                warn!("Failed to encode secret '{}' for watchers: {}", secret.name(), e);
                return;
            }
        };

        for sink in self.sinks.iter().filter(|s| secret.matches(&s.selector)) {
            let event = WatchEvent {
                kind,
                object: object.clone(),
            };
            tokio::select! {
                _ = sink.tx.send(event) => {}
                _ = sink.cancel.cancelled() => {}
            }
        }
    }
}

/// 内存 Secret 存储
pub struct MemorySecretStore {
    namespace: String,
    watch_buffer: usize,
    inner: Mutex<Inner>,
}

impl MemorySecretStore {
    /// 创建指定命名空间的空存储
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_watch_buffer(namespace, DEFAULT_WATCH_BUFFER)
    }

    /// 创建存储并指定每个 watch 订阅的缓冲大小（至少为 1）
    pub fn with_watch_buffer(namespace: impl Into<String>, watch_buffer: usize) -> Self {
        Self {
            namespace: namespace.into(),
            watch_buffer: watch_buffer.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 读取单个 Secret
    pub async fn get(&self, name: &str) -> Option<Secret> {
        self.inner.lock().await.secrets.get(name).cloned()
    }

    /// 当前存储的 Secret 数量
    pub async fn len(&self) -> usize {
        self.inner.lock().await.secrets.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 下一次调用（任意操作）返回给定错误
    pub async fn fail_next(&self, err: StoreError) {
        self.inner.lock().await.injected_failure = Some(err);
    }

    /// 结束所有打开的 watch 流，模拟上游连接断开
    pub async fn close_watches(&self) {
        let mut inner = self.inner.lock().await;
        let sinks = std::mem::take(&mut inner.sinks);
        debug!("Closing {} memory store watch stream(s)", sinks.len());
    }

    /// 直接写入原始 Secret 而不经过注册表编码，用于构造异常数据
    pub async fn insert_raw(&self, secret: Secret) {
        let mut inner = self.inner.lock().await;
        let name = secret.name().to_string();
        inner.broadcast(EventKind::Added, &secret).await;
        inner.secrets.insert(name, secret);
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn list_secrets(&self, selector: &Selector) -> Result<Vec<Secret>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;

        Ok(inner
            .secrets
            .values()
            .filter(|s| s.matches(selector))
            .cloned()
            .collect())
    }

    async fn create_secret(&self, name: &str, mut secret: Secret) -> Result<Secret, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;

        let previous = inner.secrets.get(name).and_then(|s| s.metadata.clone());
        let meta = secret.metadata.get_or_insert_with(Default::default);
        meta.name = name.to_string();
        meta.namespace = Some(self.namespace.clone());
        match previous {
            Some(prev) => {
                meta.uid = prev.uid;
                meta.creation_timestamp = prev.creation_timestamp;
            }
            None => {
                meta.uid = Some(Uuid::new_v4().to_string());
                meta.creation_timestamp = Some(Utc::now());
            }
        }

        let kind = if inner.secrets.contains_key(name) {
            EventKind::Modified
        } else {
            EventKind::Added
        };
        inner.broadcast(kind, &secret).await;
        inner.secrets.insert(name.to_string(), secret.clone());

        Ok(secret)
    }

    async fn delete_secret(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;

        let secret = inner
            .secrets
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        inner.broadcast(EventKind::Deleted, &secret).await;

        Ok(())
    }

    async fn watch_secrets(&self, selector: &Selector) -> Result<SecretWatch, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.take_failure()?;

        let (tx, rx) = mpsc::channel(self.watch_buffer);
        let cancel = CancellationToken::new();
        inner.sinks.push(WatchSink {
            selector: selector.clone(),
            tx,
            cancel: cancel.clone(),
        });

        let events = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });

        Ok(SecretWatch::new(events, cancel))
    }
}
