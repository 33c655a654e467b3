//! Connection URI parsing.
//!
//! A pool is configured with one or more URIs of the form
//! `scheme://host:port[/database][?key=value&...]`. Recognized query keys:
//! - `password`: AUTH password
//! - `cluster`: presence flag, selects the cluster topology
//! - `sentinel`: selects the sentinel topology unless `0`, `false`, `no` or `off`
//! - `master`: sentinel service name (default `mymaster`)
//! - `timeout`: connect timeout in seconds (default 5)
//!
//! Anything else lands in [`TopologyConfig::extra`] for the driver.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tracing::warn;
use url::{Host, Url};

use crate::error::{Error, Result};

/// Sentinel service name used when the URI has no `master` key.
pub const DEFAULT_SERVICE_NAME: &str = "mymaster";

/// Connection establishment bound when the URI has no `timeout` key.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const EXAMPLE_URI: &str = "tcp://127.0.0.1:6379/1?password=password";

/// A `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Extract the endpoint of a service URI, ignoring everything else.
    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = parse_url(uri)?;
        endpoint_of(&url, uri)
    }

    /// URL understood by the driver for a plain connection to this endpoint.
    pub(crate) fn driver_url(&self) -> String {
        if self.host.contains(':') {
            format!("redis://[{}]:{}", self.host, self.port)
        } else {
            format!("redis://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How to reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Single node.
    Standalone,
    /// Primary supervised by sentinels; `service_name` is the master group.
    Sentinel { service_name: String },
    /// Sharded cluster reached through seed nodes.
    Cluster,
}

impl Topology {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Standalone => "standalone",
            Self::Sentinel { .. } => "sentinel",
            Self::Cluster => "cluster",
        }
    }
}

/// Options handed to the driver on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    pub password: Option<String>,
    /// Database index. Never set for cluster configurations.
    pub database: Option<i64>,
}

/// Structured form of a connection URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Target node, sentinels, or cluster seeds. Never empty.
    addresses: Vec<Endpoint>,
    pub topology: Topology,
    pub parameters: Parameters,
    /// Unrecognized query options.
    pub extra: BTreeMap<String, String>,
}

impl TopologyConfig {
    /// Parse a connection URI.
    ///
    /// Only host and port are mandatory; a URI missing either fails with
    /// [`Error::Config`].
    pub fn parse(uri: &str) -> Result<Self> {
        let url = parse_url(uri)?;
        let endpoint = endpoint_of(&url, uri)?;

        let mut options: BTreeMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let password = options.remove("password").filter(|p| !p.is_empty());
        let cluster = options.remove("cluster").is_some();

        let database = if cluster {
            None
        } else {
            database_of(url.path(), uri)
        };

        let topology = if is_flag_set(options.remove("sentinel").as_deref()) {
            let service_name = options
                .remove("master")
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
            Topology::Sentinel { service_name }
        } else if cluster {
            Topology::Cluster
        } else {
            Topology::Standalone
        };

        Ok(Self {
            addresses: vec![endpoint],
            topology,
            parameters: Parameters { password, database },
            extra: options,
        })
    }

    /// Replace the address list with the pool's seed endpoints.
    ///
    /// Standalone keeps only the first seed; sentinel and cluster keep all of
    /// them. An empty list leaves the parsed address in place.
    pub fn with_seeds(mut self, seeds: Vec<Endpoint>) -> Self {
        if seeds.is_empty() {
            return self;
        }
        self.addresses = seeds;
        if self.topology == Topology::Standalone {
            self.addresses.truncate(1);
        }
        self
    }

    /// Target node, sentinels, or cluster seeds.
    pub fn addresses(&self) -> &[Endpoint] {
        &self.addresses
    }

    /// First configured endpoint: the node itself, or the first seed.
    pub fn primary(&self) -> &Endpoint {
        &self.addresses[0]
    }

    /// Sentinel master group, if this is a sentinel topology.
    pub fn service_name(&self) -> Option<&str> {
        match &self.topology {
            Topology::Sentinel { service_name } => Some(service_name),
            _ => None,
        }
    }

    /// Connection establishment bound from the `timeout` option, in seconds.
    pub fn connect_timeout(&self) -> Duration {
        self.extra
            .get("timeout")
            .and_then(|t| t.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }
}

// ── URI helpers ────────────────────────────────────────────────────

fn format_error(uri: &str) -> Error {
    Error::Config(format!(
        "redis connection format is incorrect uri={uri}, eg:{EXAMPLE_URI}"
    ))
}

fn parse_url(uri: &str) -> Result<Url> {
    Url::parse(uri).map_err(|_| format_error(uri))
}

fn endpoint_of(url: &Url, uri: &str) -> Result<Endpoint> {
    let host = match url.host() {
        Some(Host::Domain(d)) if !d.is_empty() => d.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        _ => return Err(format_error(uri)),
    };
    let port = url.port().ok_or_else(|| format_error(uri))?;
    Ok(Endpoint { host, port })
}

/// `None`, `0`, `false`, `no` and `off` are unset; anything else is set.
fn is_flag_set(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => !matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
    }
}

/// Database index from the URI path. An empty path means no database; a path
/// without leading digits falls back to index 0.
fn database_of(path: &str, uri: &str) -> Option<i64> {
    if path.is_empty() {
        return None;
    }
    let stripped = path.replace('/', "");
    let digits: String = stripped.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != stripped.len() {
        warn!(uri, "database path is not numeric, using leading digits");
    }
    Some(digits.parse().unwrap_or(0))
}

// ── Tests ──────────────────────────────────────────────────────────
