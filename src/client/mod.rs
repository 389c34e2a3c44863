//! Client connection layer
//!
//! Per-node plumbing underneath the routing core: buffered TCP connections
//! speaking RESP, a factory carrying dial/auth configuration, and a per-node
//! idle-connection pool.

pub mod pool;
pub mod raw_connection;

pub use pool::NodePool;
pub use raw_connection::{ConnectionFactory, RawConnection};
