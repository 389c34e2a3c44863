//! RESP wire format
//!
//! Command encoding and incremental reply decoding for the RESP2 subset a
//! routing client exchanges with cluster nodes.

use std::io::{self, BufRead};

const CRLF: &[u8] = b"\r\n";

/// Decoded RESP reply
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Vec<u8>),
    /// Null bulk string or null array
    Null,
    Array(Vec<RespValue>),
}

impl RespValue {
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// String view of simple and (utf-8) bulk strings
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

/// Command encoder writing into a reusable buffer
pub struct RespEncoder {
    buf: Vec<u8>,
}

impl RespEncoder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Encode one command as an array of bulk strings
    pub fn encode_command(&mut self, args: &[&[u8]]) {
        self.header(b'*', args.len() as i64);
        for arg in args {
            self.header(b'$', arg.len() as i64);
            self.buf.extend_from_slice(arg);
            self.buf.extend_from_slice(CRLF);
        }
    }

    /// `encode_command` from string slices
    pub fn encode_command_str(&mut self, args: &[&str]) {
        let bytes: Vec<&[u8]> = args.iter().map(|a| a.as_bytes()).collect();
        self.encode_command(&bytes);
    }

    /// `<marker><n>\r\n`, with itoa on the length hot path
    fn header(&mut self, marker: u8, n: i64) {
        let mut itoa_buf = itoa::Buffer::new();
        self.buf.push(marker);
        self.buf.extend_from_slice(itoa_buf.format(n).as_bytes());
        self.buf.extend_from_slice(CRLF);
    }
}

/// One parsed reply header line
enum Header {
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(i64),
    Array(i64),
}

/// Streaming reply decoder over a buffered reader
pub struct RespDecoder<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> RespDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
        }
    }

    /// Decode the next reply, blocking until a full value is available
    pub fn decode(&mut self) -> io::Result<RespValue> {
        match self.read_header()? {
            Header::Simple(s) => Ok(RespValue::SimpleString(s)),
            Header::Error(s) => Ok(RespValue::Error(s)),
            Header::Int(n) => Ok(RespValue::Integer(n)),
            Header::Bulk(len) if len < 0 => Ok(RespValue::Null),
            Header::Bulk(len) => self.read_bulk(len as usize),
            Header::Array(len) if len < 0 => Ok(RespValue::Null),
            Header::Array(len) => {
                let mut items = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    items.push(self.decode()?);
                }
                Ok(RespValue::Array(items))
            }
        }
    }

    fn read_header(&mut self) -> io::Result<Header> {
        self.line.clear();
        self.reader.read_until(b'\n', &mut self.line)?;
        if self.line.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            ));
        }

        let line = trim_crlf(&self.line);
        let (&marker, payload) = line
            .split_first()
            .ok_or_else(|| invalid("empty reply line"))?;
        let text = || String::from_utf8_lossy(payload).into_owned();

        match marker {
            b'+' => Ok(Header::Simple(text())),
            b'-' => Ok(Header::Error(text())),
            b':' => Ok(Header::Int(parse_int(payload)?)),
            b'$' => Ok(Header::Bulk(parse_int(payload)?)),
            b'*' => Ok(Header::Array(parse_int(payload)?)),
            other => Err(invalid(&format!("unknown reply marker {:?}", other as char))),
        }
    }

    /// Payload plus the trailing CRLF, read exactly
    fn read_bulk(&mut self, len: usize) -> io::Result<RespValue> {
        let mut data = vec![0u8; len + 2];
        self.reader.read_exact(&mut data)?;
        if !data.ends_with(CRLF) {
            return Err(invalid("bulk string missing terminator"));
        }
        data.truncate(len);
        Ok(RespValue::BulkString(data))
    }
}

fn trim_crlf(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn parse_int(payload: &[u8]) -> io::Result<i64> {
    std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid("malformed length or integer"))
}

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
