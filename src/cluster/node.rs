//! CLUSTER SLOTS response parsing
//!
//! The topology query returns an array of (start, end, node...) entries; each
//! node is an array of host, port and optionally an ID, which the parser
//! ignores. The first node of each entry is the primary, the rest replicas.

use crate::utils::{RespValue, RouteError};

use super::slot::SLOT_COUNT;

/// One slot range with the addresses serving it, primary first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
    /// "host:port" addresses; position 0 is authoritative
    pub addrs: Vec<String>,
}

/// Parse a CLUSTER SLOTS reply
///
/// `queried_addr` is the address the query was issued against; nodes reported
/// with an empty host mean "same host as the queried node" and are
/// substituted from it.
pub fn parse_cluster_slots(
    reply: &RespValue,
    queried_addr: &str,
) -> Result<Vec<SlotRange>, RouteError> {
    let entries = reply
        .as_array()
        .ok_or_else(|| protocol_err("CLUSTER SLOTS reply is not an array", reply))?;

    let queried_host = queried_addr.rsplit_once(':').map(|(h, _)| h).unwrap_or("");

    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let parts = entry
            .as_array()
            .ok_or_else(|| protocol_err("slot range entry is not an array", entry))?;
        if parts.len() < 3 {
            return Err(RouteError::Protocol(format!(
                "slot range entry has {} elements, expected at least 3",
                parts.len()
            )));
        }

        let start = parse_slot_bound(&parts[0])?;
        let end = parse_slot_bound(&parts[1])?;
        if start > end {
            return Err(RouteError::Protocol(format!(
                "invalid slot range {}-{}",
                start, end
            )));
        }

        let mut addrs = Vec::with_capacity(parts.len() - 2);
        for node in &parts[2..] {
            addrs.push(parse_node_addr(node, queried_host)?);
        }

        ranges.push(SlotRange { start, end, addrs });
    }

    Ok(ranges)
}

fn parse_slot_bound(value: &RespValue) -> Result<u16, RouteError> {
    let n = value
        .as_i64()
        .ok_or_else(|| protocol_err("slot bound is not an integer", value))?;
    if n < 0 || n >= SLOT_COUNT as i64 {
        return Err(RouteError::Protocol(format!("slot {} out of range", n)));
    }
    Ok(n as u16)
}

/// Parse one node entry ([host, port, ...]) into "host:port"
fn parse_node_addr(value: &RespValue, queried_host: &str) -> Result<String, RouteError> {
    let node = value
        .as_array()
        .ok_or_else(|| protocol_err("node entry is not an array", value))?;
    if node.len() < 2 {
        return Err(RouteError::Protocol(
            "node entry missing host or port".to_string(),
        ));
    }

    let host = node[0]
        .as_str()
        .ok_or_else(|| protocol_err("node host is not a string", &node[0]))?;
    let port = node[1]
        .as_i64()
        .ok_or_else(|| protocol_err("node port is not an integer", &node[1]))?;

    // An empty host means "the node you asked"
    let host = if host.is_empty() { queried_host } else { host };

    Ok(format!("{}:{}", host, port))
}

fn protocol_err(what: &str, value: &RespValue) -> RouteError {
    RouteError::Protocol(format!("{}: {:?}", what, value))
}
