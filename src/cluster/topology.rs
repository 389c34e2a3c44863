//! Cluster topology manager
//!
//! Owns the slot→node mapping, the per-node pool registry and the refresh
//! protocol. One mutex guards mapping, pools and the refreshing flag
//! together; it is held only to read or swap that state, never across a
//! network call. At most one physical refresh is in flight at a time:
//! concurrent `refresh` callers wait on a condvar and adopt the in-flight
//! outcome, while `schedule_refresh` fires a detached thread and returns
//! immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use crate::client::{ConnectionFactory, NodePool, RawConnection};
use crate::config::ClusterConfig;
use crate::utils::{RespValue, RouteError};

use super::conn::Conn;
use super::node::{parse_cluster_slots, SlotRange};
use super::slot::SLOT_COUNT;

/// Cluster-aware connection manager
///
/// Cheap to clone; clones share one topology. Routing connections obtained
/// from [`Cluster::get_conn`] hold a clone and stay valid across refreshes.
#[derive(Clone)]
pub struct Cluster {
    shared: Arc<Shared>,
}

struct Shared {
    factory: ConnectionFactory,
    startup_nodes: Vec<String>,
    pool_max_idle: usize,
    inner: Mutex<Inner>,
    refreshed: Condvar,
}

struct Inner {
    /// mapping[slot] = addresses serving the slot, primary first.
    /// Either all entries are empty (never refreshed) or a refresh swapped
    /// in a complete mapping; partial states are never observable.
    mapping: Vec<Vec<String>>,
    /// Distinct node addresses from the last successful refresh
    addrs: Vec<String>,
    /// One pool per node address, created on demand, kept until close
    pools: HashMap<String, Arc<NodePool>>,
    refreshing: bool,
    /// Outcome of the last finished refresh, adopted by coalesced callers
    last_refresh_error: Option<String>,
    closed: bool,
}

impl Cluster {
    /// Create a manager from the given configuration; no network I/O
    pub fn new(config: ClusterConfig) -> Self {
        let factory = ConnectionFactory {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            auth_password: config.auth_password,
            auth_username: config.auth_username,
        };

        Self {
            shared: Arc::new(Shared {
                factory,
                startup_nodes: config.startup_nodes,
                pool_max_idle: config.pool_max_idle,
                inner: Mutex::new(Inner {
                    mapping: vec![Vec::new(); SLOT_COUNT as usize],
                    addrs: Vec::new(),
                    pools: HashMap::new(),
                    refreshing: false,
                    last_refresh_error: None,
                    closed: false,
                }),
                refreshed: Condvar::new(),
            }),
        }
    }

    /// Get a fresh unbound routing connection; never touches the network
    pub fn get_conn(&self) -> Conn {
        Conn::new(self.clone())
    }

    /// Rebuild the slot mapping from a topology query
    ///
    /// Seed addresses are tried first, then nodes discovered previously. The
    /// first address answering CLUSTER SLOTS wins; the complete new mapping
    /// is swapped in under the lock. When a refresh is already in flight the
    /// call waits for it and adopts its outcome instead of issuing a second
    /// round of network calls.
    pub fn refresh(&self) -> Result<(), RouteError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(RouteError::Closed);
            }
            if inner.refreshing {
                while inner.refreshing {
                    self.shared.refreshed.wait(&mut inner);
                }
                return match inner.last_refresh_error.clone() {
                    None => Ok(()),
                    Some(e) => Err(RouteError::Refresh(e)),
                };
            }
            inner.refreshing = true;
        }

        let result = self.do_refresh();
        self.finish_refresh(&result);
        result
    }

    /// Fire-and-forget refresh from the routing path
    ///
    /// Spawns a detached refresh thread unless one is already in flight; the
    /// triggering call never blocks on its completion.
    pub(crate) fn schedule_refresh(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed || inner.refreshing {
                return;
            }
            inner.refreshing = true;
        }

        let cluster = self.clone();
        let spawned = thread::Builder::new()
            .name("topology-refresh".to_string())
            .spawn(move || {
                let result = cluster.do_refresh();
                if let Err(e) = &result {
                    warn!("background topology refresh failed: {}", e);
                }
                cluster.finish_refresh(&result);
            });

        if spawned.is_err() {
            self.finish_refresh(&Err(RouteError::Refresh(
                "failed to spawn refresh thread".to_string(),
            )));
        }
    }

    /// Tear down all pools; the manager is unusable afterwards
    pub fn close(&self) {
        let pools: Vec<Arc<NodePool>> = {
            let mut inner = self.shared.inner.lock();
            inner.closed = true;
            inner.mapping = vec![Vec::new(); SLOT_COUNT as usize];
            inner.addrs.clear();
            inner.pools.drain().map(|(_, pool)| pool).collect()
        };
        for pool in pools {
            pool.close();
        }
    }

    fn finish_refresh(&self, result: &Result<(), RouteError>) {
        let mut inner = self.shared.inner.lock();
        inner.refreshing = false;
        inner.last_refresh_error = result.as_ref().err().map(|e| e.to_string());
        self.shared.refreshed.notify_all();
    }

    /// Network part of a refresh; runs with the refreshing guard held but
    /// the mutex released.
    fn do_refresh(&self) -> Result<(), RouteError> {
        let candidates = {
            let inner = self.shared.inner.lock();
            let mut candidates = self.shared.startup_nodes.clone();
            for addr in &inner.addrs {
                if !candidates.contains(addr) {
                    candidates.push(addr.clone());
                }
            }
            candidates
        };

        if candidates.is_empty() {
            return Err(RouteError::Refresh(
                "no startup or previously discovered nodes".to_string(),
            ));
        }

        let mut last_err = String::new();
        for addr in &candidates {
            match self.query_topology(addr) {
                Ok(ranges) => {
                    self.install_mapping(ranges);
                    return Ok(());
                }
                Err(e) => {
                    warn!(node = %addr, "topology query failed: {}", e);
                    last_err = e.to_string();
                }
            }
        }

        Err(RouteError::Refresh(last_err))
    }

    /// Issue CLUSTER SLOTS against one node
    fn query_topology(&self, addr: &str) -> Result<Vec<SlotRange>, RouteError> {
        let mut conn = self.shared.factory.create(addr)?;
        let reply = conn.call("CLUSTER", &[b"SLOTS"])?;
        if let RespValue::Error(msg) = reply {
            return Err(RouteError::Server(msg));
        }
        let ranges = parse_cluster_slots(&reply, addr)?;
        conn.close();
        Ok(ranges)
    }

    /// Expand ranges into a full mapping and swap it in atomically
    fn install_mapping(&self, ranges: Vec<SlotRange>) {
        let mut mapping = vec![Vec::new(); SLOT_COUNT as usize];
        let mut addrs: Vec<String> = Vec::new();

        for range in &ranges {
            for addr in &range.addrs {
                if !addrs.contains(addr) {
                    addrs.push(addr.clone());
                }
            }
            for slot in range.start..=range.end {
                mapping[slot as usize] = range.addrs.clone();
            }
        }

        let mut inner = self.shared.inner.lock();
        for addr in &addrs {
            if !inner.pools.contains_key(addr) {
                inner.pools.insert(addr.clone(), self.new_pool(addr));
            }
        }
        inner.mapping = mapping;
        inner.addrs = addrs;

        info!(
            ranges = ranges.len(),
            nodes = inner.addrs.len(),
            "cluster topology refreshed"
        );
    }

    fn new_pool(&self, addr: &str) -> Arc<NodePool> {
        Arc::new(NodePool::new(
            addr.to_string(),
            self.shared.factory.clone(),
            self.shared.pool_max_idle,
        ))
    }

    /// Pick the address a bind should connect to
    ///
    /// Mapped slots route to the primary, or to a uniformly random replica
    /// when `read_only` is set (primary fallback without replicas). Unmapped
    /// slots and slot-agnostic binds route to a uniformly random known node,
    /// falling back to the startup nodes before the first refresh. The
    /// returned flag is true when the mapping turned out stale for the slot
    /// and a background refresh should be scheduled.
    pub(crate) fn addr_for_slot(
        &self,
        slot: Option<u16>,
        read_only: bool,
    ) -> Result<(String, bool), RouteError> {
        let inner = self.shared.inner.lock();
        if inner.closed {
            return Err(RouteError::Closed);
        }

        if let Some(slot) = slot {
            let entry = &inner.mapping[slot as usize];
            if !entry.is_empty() {
                let addr = if read_only && entry.len() > 1 {
                    entry[1 + fastrand::usize(..entry.len() - 1)].clone()
                } else {
                    entry[0].clone()
                };
                return Ok((addr, false));
            }
        }

        // Best effort: any known node, and let redirection handling converge
        let known = if inner.addrs.is_empty() {
            &self.shared.startup_nodes
        } else {
            &inner.addrs
        };
        if known.is_empty() {
            return Err(RouteError::NoNodeAvailable);
        }
        let addr = known[fastrand::usize(..known.len())].clone();
        Ok((addr, slot.is_some()))
    }

    /// Check out a raw connection to a node, creating its pool on demand
    pub(crate) fn conn_for_addr(&self, addr: &str) -> Result<RawConnection, RouteError> {
        let pool = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(RouteError::Closed);
            }
            match inner.pools.get(addr) {
                Some(pool) => Arc::clone(pool),
                None => {
                    let pool = self.new_pool(addr);
                    inner.pools.insert(addr.to_string(), Arc::clone(&pool));
                    pool
                }
            }
        };
        // Dial outside the lock
        Ok(pool.get()?)
    }

    /// Return a raw connection to its pool (dropped when the pool is gone)
    pub(crate) fn release(&self, addr: &str, conn: RawConnection) {
        let pool = self.shared.inner.lock().pools.get(addr).cloned();
        match pool {
            Some(pool) => pool.put(conn),
            None => conn.close(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_refreshing(&self) -> bool {
        self.shared.inner.lock().refreshing
    }

    #[cfg(test)]
    pub(crate) fn mapped_slot_count(&self) -> usize {
        let inner = self.shared.inner.lock();
        inner.mapping.iter().filter(|e| !e.is_empty()).count()
    }

    #[cfg(test)]
    pub(crate) fn slot_addrs(&self, slot: u16) -> Vec<String> {
        self.shared.inner.lock().mapping[slot as usize].clone()
    }
}
