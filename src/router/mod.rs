pub mod cluster;
pub mod sentinel;
pub mod standalone;

pub use cluster::{ClusterAdapter, CommandOverride, OverrideRegistry};
pub use sentinel::{SentinelDiscovery, SentinelResolver};
pub use standalone::Driver;

use redis::Value;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// One command with its arguments, as queued in batches and transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new(name: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }
}

/// Common interface for topology-specific connections.
///
/// The standalone and sentinel drivers talk to one node; the cluster
/// adapter wraps a cluster driver and intercepts the commands it cannot
/// route by itself.
pub trait CommandExecutor: Send {
    /// Execute a command and wait for its reply.
    fn invoke(
        &mut self,
        name: &str,
        args: &[&str],
    ) -> impl std::future::Future<Output = Result<Value>> + Send;

    /// Execute several commands in one round trip. With `atomic` the batch is
    /// wrapped in MULTI/EXEC and the replies are the EXEC result.
    fn invoke_batch(
        &mut self,
        commands: &[Command],
        atomic: bool,
    ) -> impl std::future::Future<Output = Result<Vec<Value>>> + Send;

    /// Send a command without waiting for its reply.
    fn submit(
        &mut self,
        name: &str,
        args: &[&str],
    ) -> impl std::future::Future<Output = Result<PendingReply>> + Send;

    /// Toggle deferred-reply mode. No-op for executors without such a mode.
    fn set_deferred(&mut self, _on: bool) {}

    /// Whether the connection may go back to the idle set. False while
    /// client-side state (an open transaction) would leak to the next user.
    fn is_reusable(&self) -> bool {
        true
    }
}

/// Reply of a submitted command.
#[derive(Debug)]
pub enum PendingReply {
    /// Already computed, e.g. an intercepted cluster command.
    Ready(Result<Value>),
    /// Still on the wire.
    InFlight(JoinHandle<Result<Value>>),
}

impl PendingReply {
    pub fn ready(value: Value) -> Self {
        Self::Ready(Ok(value))
    }

    pub fn in_flight(handle: JoinHandle<Result<Value>>) -> Self {
        Self::InFlight(handle)
    }

    /// Wait for the reply.
    pub async fn wait(self) -> Result<Value> {
        match self {
            Self::Ready(result) => result,
            Self::InFlight(handle) => handle
                .await
                .map_err(|e| Error::ConnectionLost(format!("reply task failed: {e}")))?,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_arg_refs() {
        let cmd = Command::new("SET", &["k", "v"]);
        assert_eq!(cmd.name, "SET");
        assert_eq!(cmd.arg_refs(), vec!["k", "v"]);
    }

    #[tokio::test]
    async fn ready_reply() {
        let reply = PendingReply::ready(Value::Int(3));
        assert_eq!(reply.wait().await.unwrap(), Value::Int(3));
    }

    #[tokio::test]
    async fn in_flight_reply() {
        let handle = tokio::spawn(async { Ok(Value::Okay) });
        let reply = PendingReply::in_flight(handle);
        assert_eq!(reply.wait().await.unwrap(), Value::Okay);
    }

    #[tokio::test]
    async fn aborted_reply_is_connection_lost() {
        let handle: JoinHandle<Result<Value>> = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            Ok(Value::Nil)
        });
        handle.abort();
        let err = PendingReply::in_flight(handle).wait().await.unwrap_err();
        assert!(err.is_connection_lost());
    }
}
