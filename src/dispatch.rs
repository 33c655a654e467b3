//! Synchronous and deferred command dispatch over a connection pool.
//!
//! Every command checks a connection out of the pool. [`CommandDispatcher::call`]
//! releases it before returning. [`CommandDispatcher::defer_call`] hands it
//! to a [`PendingResult`] instead, and the connection stays checked out
//! until [`PendingResult::resolve`] reads the reply.
//!
//! Command names are forwarded verbatim; there is no command catalogue.
//!
//! A connection that reports [`Error::ConnectionLost`](crate::Error::ConnectionLost) is discarded on
//! release rather than returned to the idle set.

use std::sync::Arc;

use redis::Value;

use crate::connection::pool::{ConnectionPool, Connector, PoolConfig, Pooled};
use crate::error::Result;
use crate::router::{Command, CommandExecutor, PendingReply};

fn keep_alive<T>(result: &Result<T>) -> bool {
    !matches!(result, Err(e) if e.is_connection_lost())
}

/// Pool-backed command entry point.
pub struct CommandDispatcher<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
}

impl<C: Connector> Clone for CommandDispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            pool: Arc::clone(&self.pool),
        }
    }
}

impl<C: Connector> CommandDispatcher<C> {
    pub fn new(pool: Arc<ConnectionPool<C>>) -> Self {
        Self { pool }
    }

    pub fn from_connector(connector: C, config: PoolConfig) -> Self {
        Self::new(Arc::new(ConnectionPool::new(connector, config)))
    }

    /// Execute a command and return its reply.
    ///
    /// The connection goes back to the pool whether the command succeeds or
    /// not. If the returned future is dropped mid-command the connection is
    /// discarded and its slot freed.
    pub async fn call(&self, name: &str, args: &[&str]) -> Result<Value> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.invoke(name, args).await;
        self.pool.release(conn, keep_alive(&result));
        result
    }

    /// Execute a batch on one connection. See [`CommandExecutor::invoke_batch`].
    pub async fn call_batch(&self, commands: &[Command], atomic: bool) -> Result<Vec<Value>> {
        let mut conn = self.pool.acquire().await?;
        let result = conn.invoke_batch(commands, atomic).await;
        self.pool.release(conn, keep_alive(&result));
        result
    }

    /// Send a command without waiting for its reply.
    ///
    /// The connection stays checked out until the returned [`PendingResult`]
    /// is resolved. There is no timeout: a result that is never resolved
    /// holds its slot until it is dropped.
    pub async fn defer_call(&self, name: &str, args: &[&str]) -> Result<PendingResult<C>> {
        let mut conn = self.pool.acquire().await?;
        conn.set_deferred(true);
        match conn.submit(name, args).await {
            Ok(reply) => Ok(PendingResult {
                pool: Arc::clone(&self.pool),
                conn,
                reply,
            }),
            Err(e) => {
                conn.set_deferred(false);
                self.pool.release(conn, !e.is_connection_lost());
                Err(e)
            }
        }
    }

    /// Check a connection out for a sequence of commands that must share it,
    /// such as MULTI ... EXEC. Hand it back with [`release`](Self::release).
    pub async fn connection(&self) -> Result<Pooled<C::Connection>> {
        self.pool.acquire().await
    }

    pub fn release(&self, conn: Pooled<C::Connection>, keep_alive: bool) {
        self.pool.release(conn, keep_alive);
    }

    /// Replace a held connection after a lost-connection error.
    pub async fn reconnect(&self, conn: &mut Pooled<C::Connection>) -> Result<()> {
        self.pool.reconnect(conn).await
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }
}

/// Reply of a deferred call, owning the connection it was sent on.
#[must_use = "an unresolved PendingResult keeps its connection checked out"]
pub struct PendingResult<C: Connector> {
    pool: Arc<ConnectionPool<C>>,
    conn: Pooled<C::Connection>,
    reply: PendingReply,
}

impl<C: Connector> PendingResult<C> {
    /// Read the reply, then release the connection.
    pub async fn resolve(self) -> Result<Value> {
        let Self {
            pool,
            mut conn,
            reply,
        } = self;
        let result = reply.wait().await;
        conn.set_deferred(false);
        pool.release(conn, keep_alive(&result));
        result
    }

    /// Whether the reply is already available without touching the wire.
    pub fn is_ready(&self) -> bool {
        match &self.reply {
            PendingReply::Ready(_) => true,
            PendingReply::InFlight(handle) => handle.is_finished(),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    /// Echoes the command name; `DROP` loses the connection, `FAIL` is
    /// rejected by the store.
    struct Echo;

    fn reply(name: &str) -> Result<Value> {
        match name {
            "DROP" => Err(Error::ConnectionLost("reset by peer".into())),
            "FAIL" => Err(Error::command("ERR failed")),
            other => Ok(Value::SimpleString(other.to_string())),
        }
    }

    impl CommandExecutor for Echo {
        async fn invoke(&mut self, name: &str, _args: &[&str]) -> Result<Value> {
            reply(name)
        }

        async fn invoke_batch(&mut self, commands: &[Command], _atomic: bool) -> Result<Vec<Value>> {
            commands.iter().map(|c| reply(&c.name)).collect()
        }

        async fn submit(&mut self, name: &str, _args: &[&str]) -> Result<PendingReply> {
            let name = name.to_string();
            Ok(PendingReply::in_flight(tokio::spawn(async move { reply(&name) })))
        }
    }

    struct EchoConnector;

    impl Connector for EchoConnector {
        type Connection = Echo;

        async fn connect(&self) -> Result<Echo> {
            Ok(Echo)
        }

        fn pool_key(&self) -> &str {
            "echo"
        }
    }

    fn dispatcher() -> CommandDispatcher<EchoConnector> {
        CommandDispatcher::from_connector(
            EchoConnector,
            PoolConfig {
                max_size: 2,
                ..PoolConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn call_returns_reply_and_releases() {
        let d = dispatcher();
        let v = d.call("PING", &[]).await.unwrap();
        assert_eq!(v, Value::SimpleString("PING".into()));
        assert_eq!(d.pool().available(), 2);
        assert_eq!(d.pool().idle_count(), 1);
    }

    #[tokio::test]
    async fn command_error_keeps_connection() {
        let d = dispatcher();
        assert!(d.call("FAIL", &[]).await.is_err());
        assert_eq!(d.pool().available(), 2);
        assert_eq!(d.pool().idle_count(), 1);
    }

    #[tokio::test]
    async fn connection_lost_discards_connection() {
        let d = dispatcher();
        assert!(d.call("DROP", &[]).await.unwrap_err().is_connection_lost());
        assert_eq!(d.pool().available(), 2);
        assert_eq!(d.pool().idle_count(), 0);
    }

    #[tokio::test]
    async fn deferred_holds_slot_until_resolved() {
        let d = dispatcher();
        let pending = d.defer_call("GET", &["k"]).await.unwrap();
        assert_eq!(d.pool().available(), 1);

        let v = pending.resolve().await.unwrap();
        assert_eq!(v, Value::SimpleString("GET".into()));
        assert_eq!(d.pool().available(), 2);
    }

    #[tokio::test]
    async fn deferred_error_surfaces_on_resolve() {
        let d = dispatcher();
        let pending = d.defer_call("FAIL", &[]).await.unwrap();
        assert!(pending.resolve().await.is_err());
        assert_eq!(d.pool().available(), 2);
    }

    #[tokio::test]
    async fn dropped_pending_frees_slot() {
        let d = dispatcher();
        let pending = d.defer_call("GET", &["k"]).await.unwrap();
        drop(pending);
        assert_eq!(d.pool().available(), 2);
        assert_eq!(d.pool().idle_count(), 0);
    }

    #[tokio::test]
    async fn held_connection() {
        let d = dispatcher();
        let mut conn = d.connection().await.unwrap();
        assert_eq!(d.pool().available(), 1);
        conn.invoke("MULTI", &[]).await.unwrap();
        d.release(conn, true);
        assert_eq!(d.pool().available(), 2);
    }

    #[tokio::test]
    async fn batch_on_one_connection() {
        let d = dispatcher();
        let cmds = vec![Command::new("SET", &["k", "v"]), Command::new("GET", &["k"])];
        let replies = d.call_batch(&cmds, false).await.unwrap();
        assert_eq!(replies.len(), 2);
        assert_eq!(d.pool().available(), 2);
    }
}
