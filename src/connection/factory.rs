//! Topology-aware connection construction.
//!
//! A [`ConnectionFactory`] owns the service URIs of one pool key. Each
//! connect parses the (shuffled) list, then builds the driver client that
//! matches the topology:
//!
//! - standalone: one multiplexed connection to the first address
//! - sentinel: the driver's sentinel client, which discovers the primary on
//!   every connect
//! - cluster: a cluster client over every seed, wrapped in a
//!   [`ClusterAdapter`] carrying the transaction and scripting overrides

use std::sync::Arc;

use rand::seq::SliceRandom;
use redis::aio::MultiplexedConnection;
use redis::cluster::ClusterClientBuilder;
use redis::cluster_async::ClusterConnection;
use redis::sentinel::{SentinelClient, SentinelServerType};
use redis::Value;
use tracing::debug;

use crate::config::{Endpoint, Topology, TopologyConfig};
use crate::connection::pool::Connector;
use crate::error::{Error, Result};
use crate::router::{
    ClusterAdapter, Command, CommandExecutor, Driver, OverrideRegistry, PendingReply,
    SentinelDiscovery, SentinelResolver,
};

// ── Connection ────────────────────────────────────────────────────

enum Link {
    Node(Driver<MultiplexedConnection>),
    Cluster(ClusterAdapter<Driver<ClusterConnection>>),
}

/// Live handle bound to one topology.
pub struct Connection {
    topology: Topology,
    deferred: bool,
    link: Link,
}

impl Connection {
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Whether a deferred call is waiting on this connection.
    pub fn is_deferred(&self) -> bool {
        self.deferred
    }
}

impl CommandExecutor for Connection {
    async fn invoke(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        match &mut self.link {
            Link::Node(driver) => driver.invoke(name, args).await,
            Link::Cluster(adapter) => adapter.invoke(name, args).await,
        }
    }

    async fn invoke_batch(&mut self, commands: &[Command], atomic: bool) -> Result<Vec<Value>> {
        match &mut self.link {
            Link::Node(driver) => driver.invoke_batch(commands, atomic).await,
            Link::Cluster(adapter) => adapter.invoke_batch(commands, atomic).await,
        }
    }

    async fn submit(&mut self, name: &str, args: &[&str]) -> Result<PendingReply> {
        match &mut self.link {
            Link::Node(driver) => driver.submit(name, args).await,
            Link::Cluster(adapter) => adapter.submit(name, args).await,
        }
    }

    fn set_deferred(&mut self, on: bool) {
        self.deferred = on;
    }

    fn is_reusable(&self) -> bool {
        match &self.link {
            Link::Node(driver) => driver.is_reusable(),
            Link::Cluster(adapter) => adapter.is_reusable(),
        }
    }
}

// ── Factory ───────────────────────────────────────────────────────

/// Builds connections for one pool key from its service URIs.
pub struct ConnectionFactory<R = SentinelDiscovery> {
    pool_key: String,
    services: Vec<String>,
    resolver: R,
}

impl ConnectionFactory {
    pub fn new(pool_key: impl Into<String>, services: Vec<String>) -> Result<Self> {
        Self::with_resolver(pool_key, services, SentinelDiscovery::default())
    }
}

impl<R: SentinelResolver> ConnectionFactory<R> {
    /// Factory using `resolver` for primary lookups. Fails with
    /// [`Error::Config`] when `services` is empty.
    pub fn with_resolver(
        pool_key: impl Into<String>,
        services: Vec<String>,
        resolver: R,
    ) -> Result<Self> {
        let pool_key = pool_key.into();
        if services.is_empty() {
            return Err(Error::Config(format!("pool '{pool_key}' has no service URIs")));
        }
        Ok(Self {
            pool_key,
            services,
            resolver,
        })
    }

    /// The configured service URIs, optionally shuffled.
    pub fn service_list(&self, randomize: bool) -> Vec<String> {
        let mut services = self.services.clone();
        if randomize {
            services.shuffle(&mut rand::rng());
        }
        services
    }

    /// Parse the service list: the first URI of a shuffled list drives the
    /// configuration, every URI contributes a seed endpoint.
    pub fn resolve_config(&self) -> Result<TopologyConfig> {
        let services = self.service_list(true);
        let first = services
            .first()
            .ok_or_else(|| Error::Config(format!("pool '{}' has no service URIs", self.pool_key)))?;
        let config = TopologyConfig::parse(first)?;
        let seeds = services
            .iter()
            .map(|uri| Endpoint::from_uri(uri))
            .collect::<Result<Vec<_>>>()?;
        Ok(config.with_seeds(seeds))
    }

    /// Open a connection for this pool. No retry on failure.
    pub async fn create_connection(&self) -> Result<Connection> {
        let config = self.resolve_config()?;
        self.connect_to(&config).await
    }

    /// Open a connection for an already resolved configuration, bounded by
    /// its connect timeout.
    pub async fn connect_to(&self, config: &TopologyConfig) -> Result<Connection> {
        let timeout = config.connect_timeout();
        tokio::time::timeout(timeout, open(config))
            .await
            .map_err(|_| {
                Error::ConnectionLost(format!(
                    "connect to {} timed out after {timeout:?}",
                    config.primary()
                ))
            })?
    }

    /// Endpoint that writes currently go to. Sentinel topologies ask the
    /// resolver; the others answer with the first configured address.
    pub async fn current_primary(&self) -> Result<Endpoint> {
        let config = self.resolve_config()?;
        match &config.topology {
            Topology::Sentinel { service_name } => {
                self.resolver
                    .discover_primary(config.addresses(), service_name)
                    .await
            }
            Topology::Standalone | Topology::Cluster => Ok(config.primary().clone()),
        }
    }
}

async fn open(config: &TopologyConfig) -> Result<Connection> {
    let password = config.parameters.password.as_deref();
    let link = match &config.topology {
        Topology::Standalone => {
            let client = redis::Client::open(config.primary().driver_url())?;
            let mut driver = Driver::new(client.get_multiplexed_async_connection().await?);
            driver.init(password, config.parameters.database).await?;
            Link::Node(driver)
        }
        Topology::Sentinel { service_name } => {
            let sentinels: Vec<String> = config.addresses().iter().map(Endpoint::driver_url).collect();
            let mut client = SentinelClient::build(
                sentinels,
                service_name.clone(),
                None,
                SentinelServerType::Master,
            )?;
            let mut driver = Driver::new(client.get_async_connection().await?);
            driver.init(password, None).await?;
            Link::Node(driver)
        }
        Topology::Cluster => {
            let seeds: Vec<String> = config.addresses().iter().map(Endpoint::driver_url).collect();
            let mut builder = ClusterClientBuilder::new(seeds);
            if let Some(pass) = password {
                builder = builder.password(pass.to_string());
            }
            let conn = builder.build()?.get_async_connection().await?;
            let overrides = Arc::new(OverrideRegistry::cluster());
            Link::Cluster(ClusterAdapter::new(Driver::new(conn), overrides))
        }
    };
    debug!(
        topology = config.topology.name(),
        primary = %config.primary(),
        "connection established"
    );
    Ok(Connection {
        topology: config.topology.clone(),
        deferred: false,
        link,
    })
}

impl<R: SentinelResolver + 'static> Connector for ConnectionFactory<R> {
    type Connection = Connection;

    async fn connect(&self) -> Result<Connection> {
        self.create_connection().await
    }

    fn pool_key(&self) -> &str {
        &self.pool_key
    }
}

// ── Tests ──────────────────────────────────────────────────────────
