use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::pool::PoolOptions;
use crate::registry::RegistryOptions;
use crate::registry::trait_def::DEFAULT_NAMESPACE;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub addrs: Vec<String>,
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default = "default_pool_size")]
    pub size: usize,
    #[serde(default = "default_pool_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_timeout_secs() -> u64 {
    1
}

fn default_pool_size() -> usize {
    1
}

fn default_pool_ttl_secs() -> u64 {
    60
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            timeout_secs: default_timeout_secs(),
            addrs: Vec::new(),
            instance_id: None,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            ttl_secs: default_pool_ttl_secs(),
        }
    }
}

impl RegistryConfig {
    /// 转换为注册表选项，超时为 0 时使用默认值
    pub fn to_options(&self) -> RegistryOptions {
        let defaults = RegistryOptions::default();
        RegistryOptions {
            namespace: self.namespace.clone(),
            timeout: match self.timeout_secs {
                0 => defaults.timeout,
                secs => Duration::from_secs(secs),
            },
            addrs: self.addrs.iter().filter(|a| !a.is_empty()).cloned().collect(),
            instance_id: self.instance_id.clone(),
        }
    }
}

impl PoolConfig {
    pub fn to_options(&self) -> PoolOptions {
        PoolOptions {
            size: self.size,
            ttl: Duration::from_secs(self.ttl_secs),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config file {}", path))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}
