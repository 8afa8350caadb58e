//! Kubernetes 注册表集成测试
//!
//! 使用内存 Secret 存储运行，不需要真实的控制面。

use flare_kube_registry::registry::selector::{
    LABEL_TYPE_KEY, SVC_SELECTOR_PREFIX, annotation_key, service_selector, type_selector,
};
use flare_kube_registry::{
    ErrorCategory, ErrorCode, KubernetesRegistry, MemorySecretStore, Node, ObjectMeta,
    RegisterOptions, Registry, RegistryConfig, RegistryError, RegistryOptions, Secret,
    SecretStore, ServiceRecord, StoreError, create_registry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TEST_NAMESPACE: &str = "flare-test";

const GO_WRITER_PAYLOAD: &str = concat!(
    r#"{"name":"greeter","version":"","metadata":null,"endpoints":null,"#,
    r#""nodes":[{"id":"n1","address":"10.0.0.1","port":8080,"metadata":null}]}"#
);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 创建测试用的内存存储
fn create_store() -> Arc<MemorySecretStore> {
    init_tracing();
    Arc::new(MemorySecretStore::new(TEST_NAMESPACE))
}

/// 创建绑定到指定实例 ID 的注册表
fn create_registry_for(store: &Arc<MemorySecretStore>, instance_id: &str) -> KubernetesRegistry {
    let options = RegistryOptions::default()
        .with_namespace(TEST_NAMESPACE)
        .with_instance_id(instance_id);
    KubernetesRegistry::new(store.clone(), options).expect("Failed to create registry")
}

/// 创建测试用的服务
fn create_test_service(name: &str, node_id: &str, port: u16) -> ServiceRecord {
    ServiceRecord::new(name)
        .with_version("1.0.0")
        .with_metadata("env", "test")
        .with_node(Node::new(node_id, "10.0.0.1", port).with_metadata("zone", "a"))
}

/// 构造一个绕过注册表编码的原始 Secret
fn raw_secret(name: &str, service: &str, payload: &str) -> Secret {
    let mut labels = HashMap::new();
    for (k, v) in type_selector().into_iter().chain(service_selector(service)) {
        labels.insert(k, Some(v));
    }

    Secret {
        metadata: Some(ObjectMeta {
            name: name.to_string(),
            labels,
            annotations: HashMap::from([(annotation_key(service), Some(payload.to_string()))]),
            ..Default::default()
        }),
        data: HashMap::from([(annotation_key(service), payload.to_string())]),
    }
}

/// 测试：端到端注册、查询、列举、注销
#[tokio::test]
async fn test_register_lookup_deregister_scenario() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    let service = ServiceRecord::new("greeter").with_node(Node::new("n1", "10.0.0.1", 8080));

    // 注册服务
    registry
        .register(&service, RegisterOptions::default())
        .await
        .expect("Failed to register service");

    // 查询服务
    let services = registry
        .get_service("greeter")
        .await
        .expect("Failed to get service");
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].name, "greeter");
    assert_eq!(services[0].nodes, vec![Node::new("n1", "10.0.0.1", 8080)]);

    // 列举服务
    let listed = registry.list_services().await.expect("Failed to list services");
    assert_eq!(listed, vec![ServiceRecord::new("greeter")]);

    // 注销服务
    registry
        .deregister(&service)
        .await
        .expect("Failed to deregister service");

    let err = registry.get_service("greeter").await.unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
}

/// 测试：注册后查询得到等价的服务描述
#[tokio::test]
async fn test_register_round_trip() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    let service = create_test_service("go.micro.srv.greeter", "node-1", 9090);
    registry
        .register(&service, RegisterOptions::default())
        .await
        .expect("Failed to register service");

    let services = registry
        .get_service("go.micro.srv.greeter")
        .await
        .expect("Failed to get service");
    assert_eq!(services, vec![service]);
}

/// 测试：Secret 的标签、注解与数据符合编码约定
#[tokio::test]
async fn test_backing_secret_layout() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-7");

    let service = create_test_service("foo/bar:baz", "node-1", 9090);
    registry
        .register(&service, RegisterOptions::default())
        .await
        .expect("Failed to register service");

    let secret = store.get("pod-7").await.expect("Secret not written");
    let meta = secret.metadata.as_ref().expect("Secret has no metadata");
    assert_eq!(meta.name, "pod-7");
    assert_eq!(meta.namespace.as_deref(), Some(TEST_NAMESPACE));
    assert!(meta.uid.is_some());
    assert!(meta.creation_timestamp.is_some());

    assert_eq!(meta.labels.len(), 2);
    assert_eq!(
        meta.labels.get(LABEL_TYPE_KEY),
        Some(&Some("service".to_string()))
    );
    let selector_key = format!("{}foo_bar_baz", SVC_SELECTOR_PREFIX);
    assert_eq!(
        meta.labels.get(&selector_key),
        Some(&Some("service".to_string()))
    );

    let key = "micro.mu/service-foo_bar_baz";
    assert_eq!(secret.data.len(), 1);
    let payload = secret.data.get(key).expect("Payload entry missing");
    let decoded: ServiceRecord = serde_json::from_str(payload).expect("Payload is not JSON");
    assert_eq!(decoded, service);
    assert_eq!(meta.annotations.get(key), Some(&Some(payload.clone())));
}

/// 测试：没有节点的服务不能注册，也不会访问存储
#[tokio::test]
async fn test_register_without_nodes_is_rejected() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    // 预置一次存储故障：如果注册访问了存储，这个故障会被消耗掉
    store
        .fail_next(StoreError::Transport("injected".to_string()))
        .await;

    let err = registry
        .register(&ServiceRecord::new("empty"), RegisterOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));
    assert_eq!(err.code(), ErrorCode::InvalidArgument);
    assert_eq!(err.code().category(), ErrorCategory::Argument);

    let err = registry
        .deregister(&ServiceRecord::new("empty"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidArgument(_)));

    // 故障仍在，说明前两次调用都没有触达存储
    let err = registry.list_services().await.unwrap_err();
    assert!(matches!(err, RegistryError::Upstream(_)));
    assert!(store.is_empty().await);
}

/// 测试：查询不存在的服务返回 NotFound
#[tokio::test]
async fn test_get_missing_service_is_not_found() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    registry
        .register(&create_test_service("alpha", "n1", 1), RegisterOptions::default())
        .await
        .expect("Failed to register service");

    let err = registry.get_service("beta").await.unwrap_err();
    assert!(matches!(err, RegistryError::NotFound));
    assert_eq!(err.code(), ErrorCode::ServiceNotFound);
}

/// 测试：列举服务按名称去重
#[tokio::test]
async fn test_list_services_deduplicates_by_name() {
    let store = create_store();

    for (instance, name) in [("pod-a1", "a"), ("pod-a2", "a"), ("pod-a3", "a"), ("pod-b1", "b")] {
        create_registry_for(&store, instance)
            .register(&create_test_service(name, instance, 80), RegisterOptions::default())
            .await
            .expect("Failed to register service");
    }

    let registry = create_registry_for(&store, "observer");
    let listed = registry.list_services().await.expect("Failed to list services");
    let names: Vec<_> = listed.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(listed.iter().all(|s| s.nodes.is_empty() && s.version.is_empty()));
}

/// 测试：每个实例各自返回一条记录，不合并节点
#[tokio::test]
async fn test_get_service_returns_one_record_per_instance() {
    let store = create_store();

    for (instance, port) in [("pod-1", 8001), ("pod-2", 8002)] {
        create_registry_for(&store, instance)
            .register(&create_test_service("greeter", instance, port), RegisterOptions::default())
            .await
            .expect("Failed to register service");
    }

    let registry = create_registry_for(&store, "pod-1");
    let mut services = registry
        .get_service("greeter")
        .await
        .expect("Failed to get service");
    services.sort_by_key(|s| s.nodes[0].port);

    assert_eq!(services.len(), 2);
    assert_eq!(services[0].nodes.len(), 1);
    assert_eq!(services[0].nodes[0].id, "pod-1");
    assert_eq!(services[1].nodes[0].id, "pod-2");
}

/// 测试：同一实例重复注册会覆盖之前的 Secret
#[tokio::test]
async fn test_reregister_same_instance_overwrites() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    let v1 = create_test_service("greeter", "n1", 8080);
    let v2 = v1.clone().with_version("2.0.0");

    registry
        .register(&v1, RegisterOptions::default())
        .await
        .expect("Failed to register v1");
    let uid = store.get("pod-1").await.and_then(|s| s.metadata).and_then(|m| m.uid);

    registry
        .register(
            &v2,
            RegisterOptions {
                ttl: Some(Duration::from_secs(30)),
            },
        )
        .await
        .expect("Failed to register v2");

    assert_eq!(store.len().await, 1);
    let stored_uid = store.get("pod-1").await.and_then(|s| s.metadata).and_then(|m| m.uid);
    assert_eq!(stored_uid, uid);

    let services = registry.get_service("greeter").await.expect("Failed to get service");
    assert_eq!(services, vec![v2]);
}

/// 测试：GetService 遇到无法解码的记录整体失败
#[tokio::test]
async fn test_get_service_fails_on_corrupt_record() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    registry
        .register(&create_test_service("broken", "n1", 1), RegisterOptions::default())
        .await
        .expect("Failed to register service");
    store.insert_raw(raw_secret("pod-corrupt", "broken", "{not json")).await;

    let err = registry.get_service("broken").await.unwrap_err();
    assert!(matches!(&err, RegistryError::Decode { name, .. } if name == "broken"));
    assert_eq!(err.to_string(), "could not unmarshal service 'broken'");
    assert_eq!(err.code(), ErrorCode::DeserializationError);
}

/// 测试：ListServices 跳过无法解码的记录
#[tokio::test]
async fn test_list_services_skips_corrupt_record() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    registry
        .register(&create_test_service("healthy", "n1", 1), RegisterOptions::default())
        .await
        .expect("Failed to register service");
    store.insert_raw(raw_secret("pod-corrupt", "broken", "{not json")).await;

    let listed = registry.list_services().await.expect("Failed to list services");
    assert_eq!(listed, vec![ServiceRecord::new("healthy")]);
}

/// 测试：集合字段为 null 的记录（Go 写入方的 nil map/slice）可以正常解码
#[tokio::test]
async fn test_get_service_accepts_null_collections() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    store
        .insert_raw(raw_secret("pod-go", "greeter", GO_WRITER_PAYLOAD))
        .await;

    let services = registry.get_service("greeter").await.expect("Failed to get service");
    assert_eq!(
        services,
        vec![ServiceRecord::new("greeter").with_node(Node::new("n1", "10.0.0.1", 8080))]
    );
    assert!(services[0].metadata.is_empty() && services[0].endpoints.is_empty());

    let listed = registry.list_services().await.expect("Failed to list services");
    assert_eq!(listed, vec![ServiceRecord::new("greeter")]);
}

/// 测试：没有服务描述条目的 Secret 被忽略
#[tokio::test]
async fn test_get_service_ignores_secret_without_payload() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    let mut secret = raw_secret("pod-empty", "quiet", "{}");
    secret.data.clear();
    if let Some(meta) = secret.metadata.as_mut() {
        meta.annotations.clear();
    }
    store.insert_raw(secret).await;

    let services = registry.get_service("quiet").await.expect("Failed to get service");
    assert!(services.is_empty());
}

/// 测试：存储错误原样透传
#[tokio::test]
async fn test_upstream_errors_are_propagated_verbatim() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-1");

    store
        .fail_next(StoreError::Transport("connection reset".to_string()))
        .await;
    let err = registry
        .register(&create_test_service("greeter", "n1", 1), RegisterOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        RegistryError::Upstream(StoreError::Transport(msg)) if msg == "connection reset"
    ));
    assert_eq!(err.to_string(), "store transport error: connection reset");
    assert!(store.is_empty().await);

    store
        .fail_next(StoreError::Transport("timeout".to_string()))
        .await;
    let err = registry.get_service("greeter").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UpstreamError);
}

/// 测试：注销不存在的实例返回存储错误
#[tokio::test]
async fn test_deregister_missing_instance_surfaces_store_error() {
    let store = create_store();
    let registry = create_registry_for(&store, "pod-ghost");

    let err = registry
        .deregister(&create_test_service("greeter", "n1", 1))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        RegistryError::Upstream(StoreError::NotFound(name)) if name == "pod-ghost"
    ));
}

/// 测试：注销只删除当前实例
#[tokio::test]
async fn test_deregister_only_removes_own_instance() {
    let store = create_store();
    let first = create_registry_for(&store, "pod-1");
    let second = create_registry_for(&store, "pod-2");

    let service = create_test_service("greeter", "n1", 1);
    first
        .register(&service, RegisterOptions::default())
        .await
        .expect("Failed to register first instance");
    second
        .register(&service, RegisterOptions::default())
        .await
        .expect("Failed to register second instance");

    first.deregister(&service).await.expect("Failed to deregister");

    assert!(store.get("pod-1").await.is_none());
    assert!(store.get("pod-2").await.is_some());
    let services = second.get_service("greeter").await.expect("Failed to get service");
    assert_eq!(services.len(), 1);
}

/// 测试：从配置创建注册表
#[tokio::test]
async fn test_create_registry_from_config() {
    let store = create_store();
    let config = RegistryConfig {
        namespace: TEST_NAMESPACE.to_string(),
        timeout_secs: 0,
        addrs: vec![String::new()],
        instance_id: Some("pod-config".to_string()),
    };

    let registry = create_registry(store.clone(), &config).expect("Failed to create registry");
    assert_eq!(registry.name(), "kubernetes");
    assert_eq!(registry.options().namespace, TEST_NAMESPACE);
    assert_eq!(registry.options().timeout, Duration::from_secs(1));
    assert!(registry.options().addrs.is_empty());

    registry
        .register(&create_test_service("cfg", "n1", 1), RegisterOptions::default())
        .await
        .expect("Failed to register service");
    assert!(store.get("pod-config").await.is_some());

    let listed = store
        .list_secrets(&type_selector())
        .await
        .expect("Failed to list secrets");
    assert_eq!(listed.len(), 1);
}
