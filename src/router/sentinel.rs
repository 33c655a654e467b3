//! Sentinel primary discovery.
//!
//! Connections to a sentinel topology are built by the driver's own
//! sentinel-aware client, which re-discovers the primary on every connect.
//! [`SentinelResolver`] is the explicit lookup used when the caller needs
//! to know *which* node is primary right now.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::{Endpoint, DEFAULT_CONNECT_TIMEOUT};
use crate::error::{Error, Result};

/// Looks up the current primary of a sentinel-supervised service.
pub trait SentinelResolver: Send + Sync {
    /// Ask each sentinel in order until one names the primary of
    /// `service_name`. Fails with [`Error::Discovery`] when none does.
    fn discover_primary(
        &self,
        sentinels: &[Endpoint],
        service_name: &str,
    ) -> impl std::future::Future<Output = Result<Endpoint>> + Send;
}

/// Resolver that queries sentinels with `SENTINEL get-master-addr-by-name`.
#[derive(Debug, Clone)]
pub struct SentinelDiscovery {
    connect_timeout: Duration,
}

impl SentinelDiscovery {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    async fn ask(&self, sentinel: &Endpoint, service_name: &str) -> Result<Endpoint> {
        let client = redis::Client::open(sentinel.driver_url())?;
        let mut conn = tokio::time::timeout(
            self.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| Error::Discovery(format!("sentinel {sentinel} connect timed out")))??;

        let addr: Option<(String, u16)> = redis::cmd("SENTINEL")
            .arg("get-master-addr-by-name")
            .arg(service_name)
            .query_async(&mut conn)
            .await?;

        addr.map(|(host, port)| Endpoint::new(host, port))
            .ok_or_else(|| {
                Error::Discovery(format!(
                    "master '{service_name}' not found by sentinel at {sentinel}"
                ))
            })
    }
}

impl Default for SentinelDiscovery {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl SentinelResolver for SentinelDiscovery {
    async fn discover_primary(&self, sentinels: &[Endpoint], service_name: &str) -> Result<Endpoint> {
        let mut last_err = None;

        for sentinel in sentinels {
            match self.ask(sentinel, service_name).await {
                Ok(primary) => {
                    debug!(%sentinel, %primary, service_name, "primary discovered");
                    return Ok(primary);
                }
                Err(e) => {
                    warn!(%sentinel, error = %e, "sentinel skipped");
                    last_err = Some(e);
                }
            }
        }

        Err(match last_err {
            Some(Error::Discovery(msg)) => Error::Discovery(msg),
            Some(other) => Error::Discovery(other.to_string()),
            None => Error::Discovery("could not contact any sentinel".into()),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────
