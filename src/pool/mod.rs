//! 出站连接池
//!
//! 按目标地址缓存可复用连接，每个地址最多保留 `size` 条，空闲超过 `ttl`
//! 的连接在下次 `get` 时丢弃。拨号在锁外进行，锁只保护池内簿记。

use async_trait::async_trait;
use std::collections::HashMap;
use std::ops::Deref;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// 连接拨号器
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: Send;
    type Error: std::error::Error + Send + Sync + 'static;

    /// 建立到 `addr` 的新连接
    async fn dial(&self, addr: &str) -> Result<Self::Conn, Self::Error>;
}

/// 连接池选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// 每个地址最多保留的空闲连接数，0 表示不复用
    pub size: usize,
    /// 连接最长存活时间
    pub ttl: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            size: 1,
            ttl: Duration::from_secs(60),
        }
    }
}

/// 池化连接
#[derive(Debug)]
pub struct PooledConn<C> {
    conn: C,
    created: Instant,
}

impl<C> PooledConn<C> {
    /// 连接已存在的时长
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for PooledConn<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

/// 连接池
pub struct ConnPool<D: Dialer> {
    dialer: D,
    options: PoolOptions,
    conns: Mutex<HashMap<String, Vec<PooledConn<D::Conn>>>>,
}

impl<D: Dialer> ConnPool<D> {
    pub fn new(dialer: D, options: PoolOptions) -> Self {
        Self {
            dialer,
            options,
            conns: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> PoolOptions {
        self.options
    }

    /// 取一条到 `addr` 的连接：优先复用未过期的空闲连接，否则新建
    pub async fn get(&self, addr: &str) -> Result<PooledConn<D::Conn>, D::Error> {
        if let Some(conn) = self.take_idle(addr).await {
            return Ok(conn);
        }

        let conn = self.dialer.dial(addr).await?;
        debug!("Dialed new connection to {}", addr);
        Ok(PooledConn {
            conn,
            created: Instant::now(),
        })
    }

    async fn take_idle(&self, addr: &str) -> Option<PooledConn<D::Conn>> {
        let mut conns = self.conns.lock().await;
        let idle = conns.get_mut(addr)?;
        let mut found = None;
        while let Some(conn) = idle.pop() {
            if conn.age() > self.options.ttl {
                debug!("Discarding expired connection to {}", addr);
                continue;
            }
            found = Some(conn);
            break;
        }
        if idle.is_empty() {
            conns.remove(addr);
        }
        found
    }

    /// 归还连接
    ///
    /// 调用出错或该地址的空闲连接已满时丢弃（关闭）连接。
    pub async fn release(
        &self,
        addr: &str,
        conn: PooledConn<D::Conn>,
        err: Option<&(dyn std::error::Error + Send + Sync)>,
    ) {
        if let Some(err) = err {
            debug!("Discarding connection to {} after error: {}", addr, err);
            return;
        }
        if self.options.size == 0 {
            debug!("Pooling disabled, discarding connection to {}", addr);
            return;
        }

        let rejected = {
            let mut conns = self.conns.lock().await;
            let idle = conns.entry(addr.to_string()).or_default();
            if idle.len() >= self.options.size {
                Some(conn)
            } else {
                idle.push(conn);
                None
            }
        };

        if rejected.is_some() {
            debug!("Pool for {} is full, discarding connection", addr);
        }
    }

    /// `addr` 当前保留的空闲连接数
    pub async fn idle_len(&self, addr: &str) -> usize {
        self.conns
            .lock()
            .await
            .get(addr)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// 当前持有空闲连接的地址数
    pub async fn addr_count(&self) -> usize {
        self.conns.lock().await.len()
    }
}
