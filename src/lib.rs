//! Pooled Redis access across standalone, sentinel and cluster deployments.
//!
//! A connection URI ([`config`]) selects the topology. A
//! [`ConnectionFactory`] builds matching driver connections, and on
//! clusters it wraps them with transaction and scripting overrides. A
//! [`CommandDispatcher`] runs commands over a bounded pool, either waiting
//! for the reply ([`CommandDispatcher::call`]) or handing back a
//! [`PendingResult`] ([`CommandDispatcher::defer_call`]).

pub mod client;
pub mod config;
pub mod connection;
pub mod crc16;
pub mod dispatch;
pub mod error;
pub mod router;
pub mod runtime;

pub use client::Client;
pub use config::{Endpoint, Parameters, Topology, TopologyConfig};
pub use connection::{Connection, ConnectionFactory, ConnectionPool, Connector, PoolConfig, Pooled};
pub use dispatch::{CommandDispatcher, PendingResult};
pub use error::{CommandErrorKind, Error, Result};
pub use redis::Value;
pub use router::{Command, CommandExecutor, PendingReply, SentinelResolver};
