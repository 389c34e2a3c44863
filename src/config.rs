//! Cluster client configuration

use std::time::Duration;

/// Configuration for a [`Cluster`](crate::Cluster)
///
/// Timeouts are passed through to the raw TCP sockets unmodified; the routing
/// core has no timeout machinery of its own.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Seed addresses ("host:port") used to bootstrap topology discovery
    pub startup_nodes: Vec<String>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Socket read timeout
    pub read_timeout: Duration,
    /// Socket write timeout
    pub write_timeout: Duration,
    /// AUTH password, if the cluster requires authentication
    pub auth_password: Option<String>,
    /// AUTH username (requires `auth_password`)
    pub auth_username: Option<String>,
    /// Idle connections retained per node pool
    pub pool_max_idle: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            startup_nodes: Vec::new(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            auth_password: None,
            auth_username: None,
            pool_max_idle: 4,
        }
    }
}

impl ClusterConfig {
    /// Config with the given seed addresses and defaults for everything else
    pub fn with_startup_nodes<I, S>(nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            startup_nodes: nodes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}
