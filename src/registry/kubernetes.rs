//! Kubernetes Secret 服务注册发现实现
//!
//! 每个注册的进程实例对应一个以实例 ID 命名的 Secret：
//! - 标签 `micro.mu/type=service` 与 `micro.mu/selector-<name>=service`
//! - 注解与数据各一条 `micro.mu/service-<name>`，值为服务描述的 JSON

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::selector::{
    LABEL_TYPE_KEY, LABEL_TYPE_VALUE_SERVICE, SVC_SELECTOR_VALUE, annotation_key,
    format_selector, is_service_key, selector_key, service_selector, type_selector,
};
use super::trait_def::{RegisterOptions, Registry, RegistryOptions, WatchOptions, Watcher};
use super::watcher::KubernetesWatcher;
use crate::error::{RegistryError, Result};
use crate::store::{ObjectMeta, Secret, SecretStore};
use crate::types::ServiceRecord;

/// 提供进程实例 ID 的环境变量
pub const HOSTNAME_ENV: &str = "HOSTNAME";

/// Kubernetes Secret 服务注册发现
pub struct KubernetesRegistry {
    store: Arc<dyn SecretStore>,
    options: RegistryOptions,
    instance_id: String,
}

impl KubernetesRegistry {
    /// 创建注册表
    ///
    /// 实例 ID 取 `options.instance_id`，未设置时读取 `HOSTNAME`。
    pub fn new(store: Arc<dyn SecretStore>, options: RegistryOptions) -> Result<Self> {
        let instance_id = resolve_instance_id(options.instance_id.as_deref())?;

        debug!(
            namespace = %options.namespace,
            instance_id = %instance_id,
            "Kubernetes registry created"
        );

        Ok(Self {
            store,
            options,
            instance_id,
        })
    }

    /// 当前进程实例 ID（即 Secret 名称）
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn check_nodes(service: &ServiceRecord, op: &str) -> Result<()> {
        if service.nodes.is_empty() {
            return Err(RegistryError::invalid_argument(format!(
                "you must {} at least one node",
                op
            )));
        }
        Ok(())
    }
}

fn resolve_instance_id(configured: Option<&str>) -> Result<String> {
    if let Some(id) = configured.filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }

    match std::env::var(HOSTNAME_ENV) {
        Ok(host) if !host.is_empty() => Ok(host),
        _ => Err(RegistryError::config(format!(
            "instance id not configured and {} is unset",
            HOSTNAME_ENV
        ))),
    }
}

/// 把服务描述编码成实例 Secret
pub fn encode_secret(
    instance_id: &str,
    namespace: &str,
    service: &ServiceRecord,
) -> Result<Secret> {
    let payload = serde_json::to_string(service).map_err(|source| RegistryError::Encode {
        name: service.name.clone(),
        source,
    })?;
    let key = annotation_key(&service.name);

    let labels = HashMap::from([
        (
            LABEL_TYPE_KEY.to_string(),
            Some(LABEL_TYPE_VALUE_SERVICE.to_string()),
        ),
        (
            selector_key(&service.name),
            Some(SVC_SELECTOR_VALUE.to_string()),
        ),
    ]);

    Ok(Secret {
        metadata: Some(ObjectMeta {
            name: instance_id.to_string(),
            namespace: Some(namespace.to_string()),
            labels,
            annotations: HashMap::from([(key.clone(), Some(payload.clone()))]),
            ..Default::default()
        }),
        data: HashMap::from([(key, payload)]),
    })
}

/// 读取 Secret 中指定键的服务描述，优先数据、其次注解
fn service_payload<'a>(secret: &'a Secret, key: &str) -> Option<&'a str> {
    secret.data.get(key).map(String::as_str).or_else(|| {
        secret
            .metadata
            .as_ref()
            .and_then(|meta| meta.annotations.get(key))
            .and_then(|v| v.as_deref())
    })
}

/// 列出 Secret 中所有保存服务描述的值（注解与数据）
fn service_payloads(secret: &Secret) -> impl Iterator<Item = (&str, &str)> {
    let annotations = secret
        .metadata
        .iter()
        .flat_map(|meta| meta.annotations.iter())
        .filter_map(|(k, v)| v.as_deref().map(|v| (k.as_str(), v)));
    let data = secret.data.iter().map(|(k, v)| (k.as_str(), v.as_str()));

    annotations.chain(data).filter(|(k, _)| is_service_key(k))
}

#[async_trait]
impl Registry for KubernetesRegistry {
    fn options(&self) -> &RegistryOptions {
        &self.options
    }

    async fn register(&self, service: &ServiceRecord, opts: RegisterOptions) -> Result<()> {
        Self::check_nodes(service, "register")?;

        if let Some(ttl) = opts.ttl {
            debug!(ttl = ?ttl, "Kubernetes registry has no leases, ignoring register TTL");
        }

        let secret = encode_secret(&self.instance_id, &self.options.namespace, service)?;
        self.store.create_secret(&self.instance_id, secret).await?;

        info!(
            "Service registered: {} (instance {}, {} node(s))",
            service.name,
            self.instance_id,
            service.nodes.len()
        );
        Ok(())
    }

    async fn deregister(&self, service: &ServiceRecord) -> Result<()> {
        Self::check_nodes(service, "deregister")?;

        self.store.delete_secret(&self.instance_id).await?;

        info!(
            "Service deregistered: {} (instance {})",
            service.name, self.instance_id
        );
        Ok(())
    }

    async fn get_service(&self, name: &str) -> Result<Vec<ServiceRecord>> {
        let selector = service_selector(name);
        let secrets = self.store.list_secrets(&selector).await?;
        debug!(
            selector = %format_selector(&selector),
            "Found {} secret(s) for service {}",
            secrets.len(),
            name
        );

        if secrets.is_empty() {
            return Err(RegistryError::NotFound);
        }

        let key = annotation_key(name);
        let mut services = Vec::with_capacity(secrets.len());
        for secret in &secrets {
            let Some(payload) = service_payload(secret, &key) else {
                continue;
            };

            let service = serde_json::from_str::<ServiceRecord>(payload).map_err(|source| {
                RegistryError::Decode {
                    name: name.to_string(),
                    source,
                }
            })?;
            services.push(service);
        }

        Ok(services)
    }

    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        let secrets = self.store.list_secrets(&type_selector()).await?;

        let mut names = BTreeSet::new();
        for secret in &secrets {
            for (key, payload) in service_payloads(secret) {
                match serde_json::from_str::<ServiceRecord>(payload) {
                    Ok(service) => {
                        names.insert(service.name);
                    }
                    Err(e) => {
                        warn!(
                            secret = %secret.name(),
                            key = %key,
                            "Skipping undecodable service entry: {}",
                            e
                        );
                    }
                }
            }
        }

        debug!("Listed {} service(s) from {} secret(s)", names.len(), secrets.len());
        Ok(names.into_iter().map(ServiceRecord::new).collect())
    }

    async fn watch(&self, opts: WatchOptions) -> Result<Box<dyn Watcher>> {
        let watcher = KubernetesWatcher::new(self.store.as_ref(), opts).await?;
        Ok(Box::new(watcher))
    }

    fn name(&self) -> &'static str {
        "kubernetes"
    }
}
