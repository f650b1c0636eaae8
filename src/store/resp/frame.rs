//! RESP2 value types
//!
//! Wire format (every line ends with CRLF):
//! - `+<text>`             simple string
//! - `-<text>`             error
//! - `:<n>`                integer
//! - `$<len>\r\n<data>`    bulk string, `$-1` is null
//! - `*<n>` + n frames     array, `*-1` is null

use bytes::Bytes;

// ========================================
// TYPE PREFIXES
// ========================================
pub const PREFIX_SIMPLE: u8 = b'+';
pub const PREFIX_ERROR: u8 = b'-';
pub const PREFIX_INTEGER: u8 = b':';
pub const PREFIX_BULK: u8 = b'$';
pub const PREFIX_ARRAY: u8 = b'*';

pub const CRLF: &[u8] = b"\r\n";

/// Upper bound accepted for a single bulk string (matches Redis' proto-max-bulk-len default).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Builds a command as an array of bulk strings.
    pub fn command<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Frame::Array(Some(
            args.into_iter()
                .map(|arg| Frame::Bulk(Some(Bytes::copy_from_slice(arg.as_ref().as_bytes()))))
                .collect(),
        ))
    }

    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Frame::Bulk(Some(data.into()))
    }

    /// Text content of a simple or bulk string.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Frame::Simple(s) => Some(s.clone()),
            Frame::Bulk(Some(b)) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(Some(_)) => "bulk string",
            Frame::Bulk(None) => "null bulk string",
            Frame::Array(Some(_)) => "array",
            Frame::Array(None) => "null array",
        }
    }
}
