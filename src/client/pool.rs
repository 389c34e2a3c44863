//! Per-node connection pool
//!
//! A small idle list per node address. Shared and long-lived; checkout and
//! return are safe from any thread. Anything beyond the idle cap, or any
//! connection with a sticky error, is dropped rather than retained.

use parking_lot::Mutex;

use crate::utils::ConnectionError;

use super::raw_connection::{ConnectionFactory, RawConnection};

/// Pool of idle connections to one node
pub struct NodePool {
    addr: String,
    factory: ConnectionFactory,
    idle: Mutex<Vec<RawConnection>>,
    max_idle: usize,
}

impl NodePool {
    pub fn new(addr: String, factory: ConnectionFactory, max_idle: usize) -> Self {
        Self {
            addr,
            factory,
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    /// Node address this pool dials
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Check out a connection, reusing an idle one when available
    pub fn get(&self) -> Result<RawConnection, ConnectionError> {
        if let Some(conn) = self.idle.lock().pop() {
            return Ok(conn);
        }
        self.factory.create(&self.addr)
    }

    /// Return a connection to the idle list
    ///
    /// Broken connections (sticky error) and overflow beyond the idle cap are
    /// closed instead.
    pub fn put(&self, conn: RawConnection) {
        if conn.err().is_some() {
            conn.close();
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(conn);
        } else {
            drop(idle);
            conn.close();
        }
    }

    /// Close every idle connection
    pub fn close(&self) {
        let drained: Vec<RawConnection> = self.idle.lock().drain(..).collect();
        for conn in drained {
            conn.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
