//! Secret watch 到服务事件的转换

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::selector::{format_selector, is_service_key, service_selector, type_selector};
use super::trait_def::{WatchOptions, Watcher};
use crate::error::{RegistryError, Result};
use crate::store::{EventKind, Secret, SecretStore, SecretWatch, WatchEvent};
use crate::types::{DiscoveryEvent, EventAction, ServiceRecord};

/// 监听会话的共享状态
struct WatchState {
    /// 投递通道是否已关闭
    closed: AtomicBool,
    /// 显式 `stop()` 信号
    stopped: CancellationToken,
    /// 上游订阅的取消句柄
    subscription: CancellationToken,
    selector: String,
}

impl WatchState {
    /// 关闭会话，只有第一次调用生效
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.subscription.cancel();
        debug!(selector = %self.selector, "Kubernetes watcher closed");
        true
    }
}

/// Kubernetes Secret 监听器
///
/// 一个后台转发任务是投递通道唯一的写入方。通道容量为 1，消费方慢时转发
/// 任务阻塞，不丢事件。
pub struct KubernetesWatcher {
    next: Mutex<mpsc::Receiver<DiscoveryEvent>>,
    state: Arc<WatchState>,
}

impl KubernetesWatcher {
    /// 打开订阅并启动转发任务
    pub(crate) async fn new(store: &dyn SecretStore, opts: WatchOptions) -> Result<Self> {
        let selector = match opts.service.as_deref() {
            Some(service) if !service.is_empty() => service_selector(service),
            _ => type_selector(),
        };

        let subscription = store.watch_secrets(&selector).await?;
        let (tx, rx) = mpsc::channel(1);
        let state = Arc::new(WatchState {
            closed: AtomicBool::new(false),
            stopped: CancellationToken::new(),
            subscription: subscription.stop_handle(),
            selector: format_selector(&selector),
        });

        info!(selector = %state.selector, "Kubernetes watcher started");
        tokio::spawn(forward(subscription, tx, state.clone()));

        Ok(Self {
            next: Mutex::new(rx),
            state,
        })
    }

    /// 会话是否已关闭
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Watcher for KubernetesWatcher {
    async fn next(&self) -> Result<DiscoveryEvent> {
        if self.state.stopped.is_cancelled() {
            return Err(RegistryError::ClosedChannel);
        }

        let mut rx = self.next.lock().await;
        tokio::select! {
            biased;
            _ = self.state.stopped.cancelled() => Err(RegistryError::ClosedChannel),
            event = rx.recv() => event.ok_or(RegistryError::ClosedChannel),
        }
    }

    fn stop(&self) {
        self.state.stopped.cancel();
        self.state.close();
    }
}

impl Drop for KubernetesWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 转发任务：读取原始通知，解码后逐条阻塞投递
///
/// 任务退出时 `tx` 被释放，投递通道随之关闭。
async fn forward(
    mut subscription: SecretWatch,
    tx: mpsc::Sender<DiscoveryEvent>,
    state: Arc<WatchState>,
) {
    'events: while let Some(event) = subscription.next().await {
        for result in handle_event(&event) {
            tokio::select! {
                biased;
                _ = state.stopped.cancelled() => break 'events,
                sent = tx.send(result) => {
                    if sent.is_err() {
                        break 'events;
                    }
                }
            }
        }
    }

    if state.close() {
        debug!(selector = %state.selector, "Kubernetes watch stream ended");
    }
}

/// 把一条原始通知解码为零个或多个服务事件
///
/// 只处理 ADDED 与 DELETED，其余类型忽略。
pub(crate) fn handle_event(event: &WatchEvent) -> Vec<DiscoveryEvent> {
    let action = match event.kind {
        EventKind::Added => EventAction::Create,
        EventKind::Deleted => EventAction::Delete,
        EventKind::Modified | EventKind::Error => return Vec::new(),
    };

    match serde_json::from_str::<Secret>(&event.object) {
        Ok(secret) => build_secret_results(&secret, action),
        Err(e) => {
            warn!("K8s Watcher: couldn't unmarshal event object from secret: {}", e);
            Vec::new()
        }
    }
}

/// 从 Secret 注解中取出所有服务描述；单条解码失败只跳过该条
fn build_secret_results(secret: &Secret, action: EventAction) -> Vec<DiscoveryEvent> {
    let Some(meta) = &secret.metadata else {
        return Vec::new();
    };

    let mut entries: Vec<(&String, &String)> = meta
        .annotations
        .iter()
        .filter(|(key, _)| is_service_key(key))
        .filter_map(|(key, value)| value.as_ref().map(|v| (key, v)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    entries
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_str::<ServiceRecord>(value) {
            Ok(service) => Some(DiscoveryEvent { action, service }),
            Err(e) => {
                warn!(
                    secret = %meta.name,
                    annotation = %key,
                    "Skipping undecodable service annotation: {}",
                    e
                );
                None
            }
        })
        .collect()
}
