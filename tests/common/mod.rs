//! Shared helpers for integration tests.
//!
//! Most tests run against an in-memory store behind the same traits the real
//! drivers implement, so pool and dispatch properties can be checked without
//! a server. `live_client` connects to `REDIS_URL` when it is set.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rsedis::router::{ClusterAdapter, OverrideRegistry};
use rsedis::{
    Client, Command, CommandDispatcher, CommandExecutor, Connector, Error, PendingReply,
    PoolConfig, Result, Value,
};

// ── In-memory store ──

#[derive(Default)]
struct StoreInner {
    data: HashMap<String, String>,
    executed: Vec<Command>,
}

/// Key/value store shared by every connection of a test.
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    /// Every command that reached the store, in order.
    pub fn executed(&self) -> Vec<Command> {
        self.inner.lock().executed.clone()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().data.get(key).cloned()
    }

    fn apply(&self, name: &str, args: &[&str]) -> Result<Value> {
        let mut inner = self.inner.lock();
        inner.executed.push(Command::new(name, args));
        match (name.to_ascii_uppercase().as_str(), args) {
            ("PING", _) => Ok(Value::SimpleString("PONG".into())),
            ("SET", [key, value, ..]) => {
                inner.data.insert(key.to_string(), value.to_string());
                Ok(Value::Okay)
            }
            ("GET", [key]) => Ok(inner
                .data
                .get(*key)
                .map(|v| Value::BulkString(v.clone().into_bytes()))
                .unwrap_or(Value::Nil)),
            ("INCR", [key]) => {
                let current = inner.data.get(*key).map(String::as_str).unwrap_or("0");
                let n: i64 = current
                    .parse()
                    .map_err(|_| Error::command("ERR value is not an integer or out of range"))?;
                inner.data.insert(key.to_string(), (n + 1).to_string());
                Ok(Value::Int(n + 1))
            }
            ("DEL", keys) => {
                let removed = keys.iter().filter(|k| inner.data.remove(**k).is_some()).count();
                Ok(Value::Int(removed as i64))
            }
            ("EVAL" | "EVALSHA", [_, numkeys, ..]) => Ok(Value::Int(numkeys.parse().unwrap_or(0))),
            ("FAIL", _) => Err(Error::command("ERR injected failure")),
            ("DROP", _) => Err(Error::ConnectionLost("connection reset by peer".into())),
            (other, _) => Err(Error::command(format!("ERR unknown command '{other}'"))),
        }
    }
}

/// Connection to a [`Store`].
pub struct MemoryConnection {
    store: Store,
}

impl CommandExecutor for MemoryConnection {
    async fn invoke(&mut self, name: &str, args: &[&str]) -> Result<Value> {
        self.store.apply(name, args)
    }

    async fn invoke_batch(&mut self, commands: &[Command], _atomic: bool) -> Result<Vec<Value>> {
        commands
            .iter()
            .map(|c| self.store.apply(&c.name, &c.arg_refs()))
            .collect()
    }

    async fn submit(&mut self, name: &str, args: &[&str]) -> Result<PendingReply> {
        let result = self.store.apply(name, args);
        Ok(PendingReply::in_flight(tokio::spawn(async move { result })))
    }
}

// ── Connectors ──

/// Opens plain connections to a shared store and counts them.
#[derive(Default)]
pub struct MemoryConnector {
    pub store: Store,
    opened: AtomicUsize,
}

impl MemoryConnector {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.store.clone(),
        })
    }

    fn pool_key(&self) -> &str {
        "memory"
    }
}

/// Opens cluster-adapted connections to a shared store.
#[derive(Default)]
pub struct ClusterMemoryConnector {
    pub store: Store,
}

impl Connector for ClusterMemoryConnector {
    type Connection = ClusterAdapter<MemoryConnection>;

    async fn connect(&self) -> Result<Self::Connection> {
        Ok(ClusterAdapter::new(
            MemoryConnection {
                store: self.store.clone(),
            },
            Arc::new(OverrideRegistry::cluster()),
        ))
    }

    fn pool_key(&self) -> &str {
        "memory-cluster"
    }
}

pub fn pool_config(max_size: usize) -> PoolConfig {
    PoolConfig {
        max_size,
        ..PoolConfig::default()
    }
}

pub fn memory_dispatcher(max_size: usize) -> CommandDispatcher<MemoryConnector> {
    CommandDispatcher::from_connector(MemoryConnector::default(), pool_config(max_size))
}

pub fn cluster_dispatcher(max_size: usize) -> CommandDispatcher<ClusterMemoryConnector> {
    CommandDispatcher::from_connector(ClusterMemoryConnector::default(), pool_config(max_size))
}

pub fn bulk(s: &str) -> Value {
    Value::BulkString(s.as_bytes().to_vec())
}

// ── Live server ──

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique key prefix so concurrent tests never collide.
pub fn test_prefix() -> String {
    let id = TEST_ID.fetch_add(1, Ordering::Relaxed);
    format!("rsedis_test_{}_{}", std::process::id(), id)
}

/// Client for `REDIS_URL`, or `None` when the variable is unset.
pub fn live_client() -> Option<Client> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(Client::from_url(&url).expect("invalid REDIS_URL"))
}
