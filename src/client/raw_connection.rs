//! Raw TCP connection speaking RESP
//!
//! One buffered TCP connection to a single node. The routing core only relies
//! on the send / flush / receive / err capability set; everything about
//! dialing and authentication lives in [`ConnectionFactory`].

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::utils::{ConnectionError, RespDecoder, RespEncoder, RespValue};

/// Raw connection to a single node
///
/// Reader and writer are split halves of one stream so writes can be buffered
/// independently of the streaming decoder.
pub struct RawConnection {
    writer: BufWriter<TcpStream>,
    reader: RespDecoder<BufReader<TcpStream>>,
    encoder: RespEncoder,
    last_err: Option<io::Error>,
}

impl RawConnection {
    /// Open a TCP connection to `host:port`
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        let fail = |source: io::Error| ConnectionError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        };

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(&fail)?
            .next()
            .ok_or_else(|| {
                fail(io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;

        let stream = TcpStream::connect_timeout(&addr, connect_timeout).map_err(&fail)?;
        stream.set_nodelay(true).ok();
        let write_half = stream.try_clone().map_err(&fail)?;

        Ok(Self {
            writer: BufWriter::with_capacity(16 * 1024, write_half),
            reader: RespDecoder::new(BufReader::with_capacity(16 * 1024, stream)),
            encoder: RespEncoder::with_capacity(256),
            last_err: None,
        })
    }

    /// Encode and buffer one command; does not flush
    pub fn send(&mut self, cmd: &str, args: &[&[u8]]) -> io::Result<()> {
        self.encoder.clear();
        let mut full: Vec<&[u8]> = Vec::with_capacity(args.len() + 1);
        full.push(cmd.as_bytes());
        full.extend_from_slice(args);
        self.encoder.encode_command(&full);

        let res = self.writer.write_all(self.encoder.as_bytes());
        self.track(res)
    }

    /// Flush buffered writes to the socket
    pub fn flush(&mut self) -> io::Result<()> {
        let res = self.writer.flush();
        self.track(res)
    }

    /// Read the next reply
    pub fn receive(&mut self) -> io::Result<RespValue> {
        let res = self.reader.decode();
        self.track(res)
    }

    /// Send + flush + receive in one step
    pub fn call(&mut self, cmd: &str, args: &[&[u8]]) -> io::Result<RespValue> {
        self.send(cmd, args)?;
        self.flush()?;
        self.receive()
    }

    /// Last observed I/O error, if any
    ///
    /// Sticky: once a read or write fails, the connection is considered broken
    /// and is never returned to a pool.
    pub fn err(&self) -> Option<&io::Error> {
        self.last_err.as_ref()
    }

    /// Close the connection, discarding any buffered data
    pub fn close(self) {
        if let Ok(stream) = self.writer.into_inner() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Set read timeout on the underlying socket
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.writer.get_ref().set_read_timeout(timeout)
    }

    /// Set write timeout on the underlying socket
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.writer.get_ref().set_write_timeout(timeout)
    }

    /// Send AUTH and verify the reply
    fn authenticate(
        &mut self,
        password: &str,
        username: Option<&str>,
    ) -> Result<(), ConnectionError> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(2);
        if let Some(user) = username {
            args.push(user.as_bytes());
        }
        args.push(password.as_bytes());

        let reply = self
            .call("AUTH", &args)
            .map_err(|e| ConnectionError::AuthFailed(format!("IO error: {}", e)))?;

        match reply {
            RespValue::SimpleString(ref s) if s == "OK" => Ok(()),
            RespValue::Error(e) => Err(ConnectionError::AuthFailed(e)),
            other => Err(ConnectionError::AuthFailed(format!(
                "unexpected AUTH reply: {:?}",
                other
            ))),
        }
    }

    /// Record a sticky error from an I/O result
    fn track<T>(&mut self, res: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &res {
            self.last_err = Some(io::Error::new(e.kind(), e.to_string()));
        }
        res
    }
}

/// Connection factory carrying common dial configuration
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub auth_password: Option<String>,
    pub auth_username: Option<String>,
}

impl ConnectionFactory {
    /// Create a new connection to a "host:port" address
    pub fn create(&self, addr: &str) -> Result<RawConnection, ConnectionError> {
        let (host, port) = split_addr(addr)?;

        let mut conn = RawConnection::connect(host, port, self.connect_timeout)?;
        let _ = conn.set_read_timeout(Some(self.read_timeout));
        let _ = conn.set_write_timeout(Some(self.write_timeout));

        if let Some(password) = self.auth_password.as_deref() {
            conn.authenticate(password, self.auth_username.as_deref())?;
        }

        Ok(conn)
    }
}

/// Split a "host:port" address
fn split_addr(addr: &str) -> Result<(&str, u16), ConnectionError> {
    let (host, port_str) = addr
        .rsplit_once(':')
        .ok_or_else(|| ConnectionError::InvalidAddress(addr.to_string()))?;
    let port: u16 = port_str
        .parse()
        .map_err(|_| ConnectionError::InvalidAddress(addr.to_string()))?;
    Ok((host, port))
}
