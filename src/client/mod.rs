//! gRPC 客户端模块
//!
//! 提供基于 tonic Channel 的拨号器，供连接池使用

use crate::pool::{ConnPool, Dialer, PoolOptions};
use async_trait::async_trait;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// gRPC 连接池
pub type GrpcPool = ConnPool<GrpcDialer>;

/// gRPC 拨号器
#[derive(Debug, Clone)]
pub struct GrpcDialer {
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for GrpcDialer {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl GrpcDialer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 以该拨号器创建连接池
    pub fn into_pool(self, options: PoolOptions) -> GrpcPool {
        ConnPool::new(self, options)
    }
}

/// 补全 URI scheme，`10.0.0.1:8080` -> `http://10.0.0.1:8080`
pub fn endpoint_uri(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

#[async_trait]
impl Dialer for GrpcDialer {
    type Conn = Channel;
    type Error = tonic::transport::Error;

    async fn dial(&self, addr: &str) -> Result<Channel, Self::Error> {
        Endpoint::from_shared(endpoint_uri(addr))?
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .connect()
            .await
    }
}
