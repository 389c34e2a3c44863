//! Cluster routing core
//!
//! This module provides cluster support including:
//! - Topology discovery via CLUSTER SLOTS and atomic mapping refresh
//! - Slot mapping and CRC16 calculation with hash-tag support
//! - The routing connection state machine with lazy slot binding
//! - Bounded MOVED/ASK redirection handling
//! - Read/write split across primaries and replicas

pub mod commands;
pub mod conn;
pub mod node;
pub mod redirect;
pub mod slot;
pub mod topology;

pub use conn::{bind_conn, Conn};
pub use node::SlotRange;
pub use redirect::RedirectInfo;
pub use slot::{slot_for_key, SLOT_COUNT};
pub use topology::Cluster;
