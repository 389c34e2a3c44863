//! Error types for valkey-router

use std::io;
use thiserror::Error;

/// Connection-level errors (dial, auth)
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("invalid node address: {0}")]
    InvalidAddress(String),
}

/// Routing-level errors
///
/// MOVED and ASK are handled internally by the bounded redirection retry in
/// `Conn::execute` and only surface once the hop limit is exceeded. TRYAGAIN
/// is never auto-retried; the caller decides when to back off and retry.
#[derive(Error, Debug)]
pub enum RouteError {
    /// Operation attempted on a closed connection (or closed manager).
    #[error("connection is closed")]
    Closed,

    /// Keys spanning different hash slots were combined in one request,
    /// either detected at bind time or reported by the store.
    #[error("{0}")]
    CrossSlot(String),

    /// Bind or read-only toggle attempted on an already-bound connection.
    #[error("connection already bound")]
    BindConflict,

    /// Zero-key bind with no known node address.
    #[error("failed to get a connection: no node available")]
    NoNodeAvailable,

    /// Every seed and known address failed the topology query.
    #[error("cluster refresh failed: {0}")]
    Refresh(String),

    #[error("MOVED {slot} {addr}")]
    Moved { slot: u16, addr: String },

    #[error("ASK {slot} {addr}")]
    Ask { slot: u16, addr: String },

    /// Cluster is mid-resharding; the caller should back off and retry.
    #[error("{0}")]
    TryAgain(String),

    /// Any other error reply from the store, verbatim.
    #[error("server error: {0}")]
    Server(String),

    /// Malformed CLUSTER SLOTS reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
