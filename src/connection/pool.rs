//! Per-pool-key connection pool.
//!
//! A semaphore bounds the number of checked-out connections; a deque holds
//! idle connections for reuse. The idle queue uses `parking_lot::Mutex`
//! (sync, held very briefly) so `release` never suspends.
//!
//! Connections come back through [`ConnectionPool::release`] with an
//! explicit keep-alive decision. A [`Pooled`] handle dropped without
//! release discards its connection and frees the slot.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::router::CommandExecutor;

/// Default maximum number of live connections per pool.
pub const DEFAULT_MAX_SIZE: usize = 8;

/// Default time an idle connection may sit unused before being dropped.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Pool sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_size: usize,
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Builds the connections of one pool.
pub trait Connector: Send + Sync + 'static {
    type Connection: CommandExecutor + 'static;

    /// Open a fresh connection.
    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection>> + Send;

    /// Name of the pool this connector serves.
    fn pool_key(&self) -> &str;

    /// Replace a presumed dead connection with a fresh one. No backoff and
    /// no retry; callers re-invoke on failure.
    fn reconnect(
        &self,
        conn: &mut Self::Connection,
    ) -> impl std::future::Future<Output = Result<()>> + Send {
        async move {
            warn!(pool = self.pool_key(), "redis reconnecting...");
            *conn = self.connect().await?;
            Ok(())
        }
    }
}

/// A connection checked out of a pool.
pub struct Pooled<T> {
    conn: T,
    _permit: OwnedSemaphorePermit,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.conn
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.conn
    }
}

struct Idle<T> {
    conn: T,
    since: Instant,
}

/// Bounded pool of connections produced by a [`Connector`].
pub struct ConnectionPool<C: Connector> {
    connector: C,
    /// Idle connections ready for reuse (sync mutex, held very briefly).
    idle: SyncMutex<VecDeque<Idle<C::Connection>>>,
    /// Limits total checked-out connections.
    semaphore: Arc<Semaphore>,
    config: PoolConfig,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector,
            idle: SyncMutex::new(VecDeque::with_capacity(config.max_size)),
            semaphore: Arc::new(Semaphore::new(config.max_size)),
            config,
        }
    }

    /// Check a connection out, waiting while the pool is exhausted.
    ///
    /// Reuses the most recently released idle connection when one is fresh;
    /// otherwise asks the connector for a new one.
    pub async fn acquire(&self) -> Result<Pooled<C::Connection>> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionLost("pool semaphore closed".into()))?;

        let reused = {
            let mut idle = self.idle.lock();
            self.take_fresh(&mut idle)
        };

        let conn = match reused {
            Some(conn) => conn,
            None => {
                debug!(pool = self.pool_key(), "opening connection");
                self.connector.connect().await?
            }
        };

        Ok(Pooled {
            conn,
            _permit: permit,
        })
    }

    /// Check a connection back in. With `keep_alive` it becomes reusable
    /// unless it still carries per-user state (see
    /// [`CommandExecutor::is_reusable`]); otherwise it is dropped. The slot is
    /// freed either way.
    pub fn release(&self, pooled: Pooled<C::Connection>, keep_alive: bool) {
        let Pooled { conn, _permit } = pooled;
        if !keep_alive {
            debug!(pool = self.pool_key(), "discarding connection");
            return;
        }
        if !conn.is_reusable() {
            warn!(pool = self.pool_key(), "discarding connection with open transaction");
            return;
        }
        let timeout = self.config.idle_timeout;
        let mut idle = self.idle.lock();
        idle.retain(|entry| entry.since.elapsed() <= timeout);
        if idle.len() < self.config.max_size {
            idle.push_back(Idle {
                conn,
                since: Instant::now(),
            });
        }
    }

    /// Replace the connection held by `pooled` with a fresh one.
    pub async fn reconnect(&self, pooled: &mut Pooled<C::Connection>) -> Result<()> {
        self.connector.reconnect(&mut pooled.conn).await
    }

    /// Free slots (max size minus checked-out connections).
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn pool_key(&self) -> &str {
        self.connector.pool_key()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Pop the most recent idle connection, dropping stale ones (LIFO).
    fn take_fresh(&self, idle: &mut VecDeque<Idle<C::Connection>>) -> Option<C::Connection> {
        while let Some(entry) = idle.pop_back() {
            if entry.since.elapsed() > self.config.idle_timeout {
                debug!(pool = self.pool_key(), "dropping stale idle connection");
                continue;
            }
            return Some(entry.conn);
        }
        None
    }
}

// ── Tests ──────────────────────────────────────────────────────────
