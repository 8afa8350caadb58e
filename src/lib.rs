//! Flare Kubernetes Registry
//!
//! Stores service registrations as Kubernetes Secrets and exposes a
//! register / deregister / lookup / list / watch discovery API, plus a
//! bounded TTL pool for outbound gRPC connections.

pub mod client;
pub mod config;
pub mod error;
pub mod pool;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use client::{GrpcDialer, GrpcPool};
pub use config::{Config, PoolConfig, RegistryConfig};
pub use error::{ErrorCategory, ErrorCode, RegistryError, Result};
pub use pool::{ConnPool, Dialer, PoolOptions, PooledConn};
pub use registry::{
    KubernetesRegistry, KubernetesWatcher, RegisterOptions, Registry, RegistryOptions,
    ServiceRegistry, WatchOptions, Watcher, create_registry,
};
pub use store::{
    EventKind, MemorySecretStore, ObjectMeta, Secret, SecretStore, SecretWatch, Selector,
    StoreError, WatchEvent,
};
pub use types::{DiscoveryEvent, EventAction, Endpoint, Node, ServiceRecord};
