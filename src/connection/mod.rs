pub mod factory;
pub mod pool;

pub use factory::{Connection, ConnectionFactory};
pub use pool::{ConnectionPool, Connector, PoolConfig, Pooled};
