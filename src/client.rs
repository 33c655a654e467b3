//! Ready-made client over the default factory and pool.
//!
//! ```no_run
//! # async fn demo() -> rsedis::Result<()> {
//! let client = rsedis::Client::from_url("tcp://127.0.0.1:6379/0")?;
//! client.call("SET", &["greeting", "hello"]).await?;
//! let pending = client.defer_call("GET", &["greeting"]).await?;
//! let value = pending.resolve().await?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```

use redis::Value;

use crate::config::{Endpoint, TopologyConfig};
use crate::connection::{ConnectionFactory, PoolConfig};
use crate::dispatch::{CommandDispatcher, PendingResult};
use crate::error::Result;
use crate::runtime;

/// Pool key used by [`Client::from_url`].
pub const DEFAULT_POOL_KEY: &str = "default";

/// Pooled client for one set of service URIs.
#[derive(Clone)]
pub struct Client {
    dispatcher: CommandDispatcher<ConnectionFactory>,
}

impl Client {
    /// Client for `services`, all describing the same deployment. Every URI
    /// is validated up front; connections open lazily on first use.
    pub fn new(pool_key: impl Into<String>, services: Vec<String>, pool: PoolConfig) -> Result<Self> {
        for uri in &services {
            TopologyConfig::parse(uri)?;
        }
        let factory = ConnectionFactory::new(pool_key, services)?;
        Ok(Self {
            dispatcher: CommandDispatcher::from_connector(factory, pool),
        })
    }

    /// Client for a single URI with the default pool settings.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(DEFAULT_POOL_KEY, vec![url.to_string()], PoolConfig::default())
    }

    pub async fn call(&self, name: &str, args: &[&str]) -> Result<Value> {
        self.dispatcher.call(name, args).await
    }

    pub async fn defer_call(&self, name: &str, args: &[&str]) -> Result<PendingResult<ConnectionFactory>> {
        self.dispatcher.defer_call(name, args).await
    }

    /// Blocking [`call`](Self::call) on the shared runtime.
    ///
    /// Must not be used from inside an async context.
    pub fn call_blocking(&self, name: &str, args: &[&str]) -> Result<Value> {
        runtime::block_on(self.call(name, args))
    }

    /// Endpoint that writes currently go to.
    pub async fn current_primary(&self) -> Result<Endpoint> {
        self.dispatcher.pool().connector().current_primary().await
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<ConnectionFactory> {
        &self.dispatcher
    }
}

// ── Tests ──────────────────────────────────────────────────────────
