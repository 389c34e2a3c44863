//! Routing connection state machine
//!
//! A `Conn` starts unbound, binds to a slot (explicitly or lazily from the
//! first key-bearing command) and stays bound until closed. The bound slot is
//! fixed for the connection's lifetime; the underlying raw connection may be
//! re-pointed at other nodes while following MOVED/ASK redirections. A `Conn`
//! is single-owner and sequential, matching the raw connection underneath.

use std::any::Any;
use std::mem;

use tracing::debug;

use crate::client::RawConnection;
use crate::cluster::topology::Cluster;
use crate::utils::{RespValue, RouteError};

use super::commands::command_key;
use super::redirect::{self, RedirectInfo};
use super::slot::slot_for_key;

/// Redirection hops followed per operation before surfacing the error.
/// Fixed, not configurable: bounds worst-case latency under cluster churn.
const MAX_REDIRECT_HOPS: usize = 4;

enum ConnState {
    Unbound { read_only: bool },
    Bound(Active),
    Closed,
}

struct Active {
    /// Slot this connection was bound to; None for slot-agnostic binds
    slot: Option<u16>,
    addr: String,
    read_only: bool,
    conn: RawConnection,
}

/// Routing connection obtained from [`Cluster::get_conn`]
pub struct Conn {
    cluster: Cluster,
    state: ConnState,
}

impl Conn {
    pub(crate) fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            state: ConnState::Unbound { read_only: false },
        }
    }

    /// Bias subsequent binding toward replica nodes
    ///
    /// Only valid before binding: the node choice is fixed at bind time, so
    /// toggling afterwards would be meaningless.
    pub fn read_only(&mut self) -> Result<(), RouteError> {
        match &mut self.state {
            ConnState::Unbound { read_only } => {
                *read_only = true;
                Ok(())
            }
            ConnState::Bound(_) => Err(RouteError::BindConflict),
            ConnState::Closed => Err(RouteError::Closed),
        }
    }

    /// Bind the connection to the slot the given keys hash to
    ///
    /// With no keys, binds to a uniformly random known node for slot-agnostic
    /// commands. Keys hashing to different slots fail with `CrossSlot` and
    /// leave the connection unbound and reusable.
    pub fn bind(&mut self, keys: &[&str]) -> Result<(), RouteError> {
        let read_only = match &self.state {
            ConnState::Unbound { read_only } => *read_only,
            ConnState::Bound(_) => return Err(RouteError::BindConflict),
            ConnState::Closed => return Err(RouteError::Closed),
        };

        let mut slot = None;
        for key in keys {
            let s = slot_for_key(key.as_bytes());
            match slot {
                None => slot = Some(s),
                Some(prev) if prev != s => {
                    return Err(RouteError::CrossSlot(format!(
                        "keys map to different hash slots ({} != {})",
                        prev, s
                    )))
                }
                Some(_) => {}
            }
        }

        self.bind_to_slot(slot, read_only)
    }

    /// Execute one command: implicit bind, then send + flush + receive with
    /// bounded redirection retry
    pub fn execute(&mut self, cmd: &str, args: &[&[u8]]) -> Result<RespValue, RouteError> {
        self.ensure_bound(cmd, args)?;

        let mut hops = 0;
        loop {
            let reply = {
                let ConnState::Bound(active) = &mut self.state else {
                    return Err(RouteError::Closed);
                };
                active.conn.call(cmd, args)?
            };

            let RespValue::Error(msg) = reply else {
                return Ok(reply);
            };

            let Some(info) = RedirectInfo::parse(&msg) else {
                return Err(classify_error(msg));
            };

            hops += 1;
            if hops >= MAX_REDIRECT_HOPS {
                return Err(classify_error(msg));
            }
            debug!(
                slot = info.slot,
                target = %info.addr(),
                ask = info.is_ask,
                "following redirection"
            );
            if !info.is_ask {
                // Stale mapping; the error already names the right node, so
                // retry immediately and let the refresh happen behind us
                self.cluster.schedule_refresh();
            }
            self.repoint(&info)?;
        }
    }

    /// `execute` with string arguments
    pub fn execute_str(&mut self, cmd: &str, args: &[&str]) -> Result<RespValue, RouteError> {
        let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
        self.execute(cmd, &byte_args)
    }

    /// Buffer one command on the bound connection without flushing
    pub fn send(&mut self, cmd: &str, args: &[&[u8]]) -> Result<(), RouteError> {
        self.ensure_bound(cmd, args)?;
        let ConnState::Bound(active) = &mut self.state else {
            return Err(RouteError::Closed);
        };
        active.conn.send(cmd, args)?;
        Ok(())
    }

    /// Flush buffered commands to the bound node
    pub fn flush(&mut self) -> Result<(), RouteError> {
        self.ensure_bound_slot(None)?;
        let ConnState::Bound(active) = &mut self.state else {
            return Err(RouteError::Closed);
        };
        active.conn.flush()?;
        Ok(())
    }

    /// Read the next reply from the bound node
    ///
    /// Error replies are classified; redirections surface to the caller since
    /// a bare receive cannot replay the command that caused them.
    pub fn receive(&mut self) -> Result<RespValue, RouteError> {
        self.ensure_bound_slot(None)?;
        let ConnState::Bound(active) = &mut self.state else {
            return Err(RouteError::Closed);
        };
        match active.conn.receive()? {
            RespValue::Error(msg) => Err(classify_error(msg)),
            other => Ok(other),
        }
    }

    /// Release the underlying connection and close
    ///
    /// Idempotent at the state level; a second close reports `Closed` like
    /// every other post-close operation.
    pub fn close(&mut self) -> Result<(), RouteError> {
        match mem::replace(&mut self.state, ConnState::Closed) {
            ConnState::Closed => Err(RouteError::Closed),
            ConnState::Unbound { .. } => Ok(()),
            ConnState::Bound(active) => {
                release_conn(&self.cluster, &active.addr, active.conn, active.read_only);
                Ok(())
            }
        }
    }

    /// Slot this connection is bound to, if any
    pub fn bound_slot(&self) -> Option<u16> {
        match &self.state {
            ConnState::Bound(active) => active.slot,
            _ => None,
        }
    }

    /// Implicit bind from a command's key (static key-position table)
    fn ensure_bound(&mut self, cmd: &str, args: &[&[u8]]) -> Result<(), RouteError> {
        if matches!(self.state, ConnState::Bound(_)) {
            return Ok(());
        }
        let slot = command_key(cmd, args).map(slot_for_key);
        self.ensure_bound_slot(slot)
    }

    fn ensure_bound_slot(&mut self, slot: Option<u16>) -> Result<(), RouteError> {
        let read_only = match &self.state {
            ConnState::Bound(_) => return Ok(()),
            ConnState::Closed => return Err(RouteError::Closed),
            ConnState::Unbound { read_only } => *read_only,
        };
        self.bind_to_slot(slot, read_only)
    }

    /// Resolve the slot to a node, connect, and transition to Bound
    fn bind_to_slot(&mut self, slot: Option<u16>, read_only: bool) -> Result<(), RouteError> {
        let (addr, stale) = self.cluster.addr_for_slot(slot, read_only)?;
        if stale {
            // Best-effort node while the mapping catches up; redirection
            // handling converges the caller onto the true owner
            debug!(slot = slot.unwrap_or_default(), node = %addr, "slot not mapped, binding to a random node");
            self.cluster.schedule_refresh();
        }

        let mut conn = self.cluster.conn_for_addr(&addr)?;
        if read_only {
            if let Err(e) = readonly_handshake(&mut conn) {
                conn.close();
                return Err(e);
            }
        }

        self.state = ConnState::Bound(Active {
            slot,
            addr,
            read_only,
            conn,
        });
        Ok(())
    }

    /// Re-point the bound connection at a redirect target
    fn repoint(&mut self, info: &RedirectInfo) -> Result<(), RouteError> {
        let addr = info.addr();
        let mut conn = self.cluster.conn_for_addr(&addr)?;

        let ConnState::Bound(active) = &mut self.state else {
            return Err(RouteError::Closed);
        };

        let handshake = if info.is_ask {
            // One-shot permission for the migrating slot; no refresh involved
            asking_handshake(&mut conn)
        } else if active.read_only {
            // The fresh pooled connection is in default mode
            readonly_handshake(&mut conn)
        } else {
            Ok(())
        };
        if let Err(e) = handshake {
            conn.close();
            return Err(e);
        }

        let old_conn = mem::replace(&mut active.conn, conn);
        let old_addr = mem::replace(&mut active.addr, addr);
        release_conn(&self.cluster, &old_addr, old_conn, active.read_only);
        Ok(())
    }
}

impl Drop for Conn {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Bind `conn` to the given keys when it supports binding
///
/// Forwards to [`Conn::bind`] when the value is a routing connection and
/// succeeds as a no-op otherwise, so callers can bind-or-ignore across
/// heterogeneous connection types.
pub fn bind_conn(conn: &mut dyn Any, keys: &[&str]) -> Result<(), RouteError> {
    match conn.downcast_mut::<Conn>() {
        Some(routing) => routing.bind(keys),
        None => Ok(()),
    }
}

/// Return a connection to its pool; read-only connections are closed instead
/// because the server-side READONLY mode would leak to the next checkout.
fn release_conn(cluster: &Cluster, addr: &str, conn: RawConnection, read_only: bool) {
    if read_only {
        conn.close();
    } else {
        cluster.release(addr, conn);
    }
}

/// Map an error reply to the routing taxonomy
fn classify_error(msg: String) -> RouteError {
    if redirect::is_try_again(&msg) {
        RouteError::TryAgain(msg)
    } else if redirect::is_cross_slot(&msg) {
        RouteError::CrossSlot(msg)
    } else if let Some(info) = RedirectInfo::parse(&msg) {
        let addr = info.addr();
        if info.is_ask {
            RouteError::Ask {
                slot: info.slot,
                addr,
            }
        } else {
            RouteError::Moved {
                slot: info.slot,
                addr,
            }
        }
    } else {
        RouteError::Server(msg)
    }
}

fn readonly_handshake(conn: &mut RawConnection) -> Result<(), RouteError> {
    match conn.call("READONLY", &[])? {
        RespValue::SimpleString(s) if s == "OK" => Ok(()),
        RespValue::Error(e) => Err(RouteError::Server(e)),
        other => Err(RouteError::Protocol(format!(
            "unexpected READONLY reply: {:?}",
            other
        ))),
    }
}

fn asking_handshake(conn: &mut RawConnection) -> Result<(), RouteError> {
    match conn.call("ASKING", &[])? {
        RespValue::Error(e) => Err(RouteError::Server(e)),
        _ => Ok(()),
    }
}
