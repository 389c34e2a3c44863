//! Cluster-aware routing client for Valkey/Redis Cluster deployments
//!
//! A [`Cluster`] discovers the slot→node mapping from its seed nodes and
//! hands out routing connections. A [`Conn`] binds lazily to the hash slot of
//! the first key it sees, follows MOVED/ASK redirections up to a fixed hop
//! bound, and can be biased toward replica reads before binding.
//!
//! ```no_run
//! use valkey_router::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::new(ClusterConfig::with_startup_nodes(["127.0.0.1:7000"]));
//! cluster.refresh()?;
//!
//! let mut conn = cluster.get_conn();
//! conn.execute("SET", &[b"user:1000", b"alice"])?;
//! let name = conn.execute("GET", &[b"user:1000"])?;
//! # Ok::<(), valkey_router::RouteError>(())
//! ```

pub mod client;
pub mod cluster;
pub mod config;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use cluster::{bind_conn, slot_for_key, Cluster, Conn, RedirectInfo, SLOT_COUNT};
pub use config::ClusterConfig;
pub use utils::{ConnectionError, RespValue, RouteError};
