//! In-process RESP server for tests
//!
//! Listens on loopback and answers decoded commands through a handler
//! closure, so routing paths can be exercised end to end without a running
//! cluster. A handler returning an empty string closes the connection, which
//! is how tests simulate a node dying mid-conversation.

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use crate::utils::{RespDecoder, RespValue};

pub(crate) struct TestServer {
    addr: String,
}

/// A bound-but-not-serving listener, so handlers can capture the server's
/// own address (topology replies usually need to name it).
pub(crate) struct TestServerBuilder {
    listener: TcpListener,
    addr: String,
}

impl TestServer {
    /// Bind a loopback listener without serving yet
    pub fn bind() -> TestServerBuilder {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr").to_string();
        TestServerBuilder { listener, addr }
    }

    /// Bind and start in one step, for handlers that don't need the address
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> String + Send + Sync + 'static,
    {
        Self::bind().start(handler)
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl TestServerBuilder {
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Start serving; the handler receives each command with the command
    /// name uppercased and returns the raw RESP reply to write back.
    pub fn start<F>(self, handler: F) -> TestServer
    where
        F: Fn(&[Vec<u8>]) -> String + Send + Sync + 'static,
    {
        let TestServerBuilder { listener, addr } = self;
        let handler = Arc::new(handler);

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let handler = Arc::clone(&handler);
                thread::spawn(move || serve(stream, handler));
            }
        });

        TestServer { addr }
    }
}

fn serve<F>(stream: TcpStream, handler: Arc<F>)
where
    F: Fn(&[Vec<u8>]) -> String,
{
    let Ok(write_half) = stream.try_clone() else { return };
    let mut writer = BufWriter::new(write_half);
    let mut decoder = RespDecoder::new(BufReader::new(stream));

    loop {
        let Ok(value) = decoder.decode() else { return };
        let Some(cmd) = flatten_command(value) else { return };

        let reply = handler(&cmd);
        if reply.is_empty() {
            return;
        }
        if writer.write_all(reply.as_bytes()).is_err() || writer.flush().is_err() {
            return;
        }
    }
}

/// Decode a RESP command array into argument byte vectors, command name
/// uppercased for easy matching in handlers.
fn flatten_command(value: RespValue) -> Option<Vec<Vec<u8>>> {
    let RespValue::Array(items) = value else { return None };
    let mut cmd = Vec::with_capacity(items.len());
    for item in items {
        match item {
            RespValue::BulkString(b) => cmd.push(b),
            _ => return None,
        }
    }
    if let Some(name) = cmd.first_mut() {
        name.make_ascii_uppercase();
    }
    Some(cmd)
}

/// Build a CLUSTER SLOTS reply covering the given (start, end, addresses)
/// ranges; the first address of each range is the primary.
pub(crate) fn slots_reply(ranges: &[(u16, u16, &[&str])]) -> String {
    let mut out = format!("*{}\r\n", ranges.len());
    for (start, end, addrs) in ranges {
        out.push_str(&format!("*{}\r\n:{}\r\n:{}\r\n", 2 + addrs.len(), start, end));
        for addr in *addrs {
            let (host, port) = addr.rsplit_once(':').expect("host:port");
            out.push_str(&format!("*2\r\n${}\r\n{}\r\n:{}\r\n", host.len(), host, port));
        }
    }
    out
}

/// Install a test subscriber so `RUST_LOG=debug cargo test` shows refresh
/// and redirection traces; harmless to call more than once.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_reply_format() {
        let reply = slots_reply(&[(0, 16383, &["127.0.0.1:7000"])]);
        assert_eq!(
            reply,
            "*1\r\n*3\r\n:0\r\n:16383\r\n*2\r\n$9\r\n127.0.0.1\r\n:7000\r\n"
        );
    }
}
