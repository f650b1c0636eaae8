use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::frame::{
    Frame, CRLF, MAX_BULK_LEN, PREFIX_ARRAY, PREFIX_BULK, PREFIX_ERROR, PREFIX_INTEGER,
    PREFIX_SIMPLE,
};
use crate::store::errors::{StoreError, StoreResult};

#[derive(Debug, Default)]
pub struct RespCodec;

impl RespCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RespCodec {
    type Item = Frame;
    type Error = StoreError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match parse(&src[..], 0)? {
            Some((frame, consumed)) => {
                src.advance(consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for RespCodec {
    type Error = StoreError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        write_frame(&item, dst);
        Ok(())
    }
}

/// Parses one frame starting at `pos`.
/// Returns the frame and the position right after it, or `None` if more bytes are needed.
fn parse(buf: &[u8], pos: usize) -> StoreResult<Option<(Frame, usize)>> {
    let Some(&prefix) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, after)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };

    let frame = match prefix {
        PREFIX_SIMPLE => (Frame::Simple(text(line)?), after),
        PREFIX_ERROR => (Frame::Error(text(line)?), after),
        PREFIX_INTEGER => (Frame::Integer(decimal(line)?), after),
        PREFIX_BULK => {
            let Some(len) = length(line)? else {
                return Ok(Some((Frame::Bulk(None), after)));
            };
            if len > MAX_BULK_LEN {
                return Err(StoreError::Protocol(format!("bulk string of {} bytes exceeds limit", len)));
            }
            let end = after + len;
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(StoreError::Protocol("bulk string not terminated by CRLF".to_string()));
            }
            (Frame::Bulk(Some(Bytes::copy_from_slice(&buf[after..end]))), end + CRLF.len())
        }
        PREFIX_ARRAY => {
            let Some(len) = length(line)? else {
                return Ok(Some((Frame::Array(None), after)));
            };
            let mut items = Vec::with_capacity(len.min(1024));
            let mut cursor = after;
            for _ in 0..len {
                match parse(buf, cursor)? {
                    Some((item, next)) => {
                        items.push(item);
                        cursor = next;
                    }
                    None => return Ok(None),
                }
            }
            (Frame::Array(Some(items)), cursor)
        }
        other => {
            return Err(StoreError::Protocol(format!("invalid type byte 0x{:02X}", other)));
        }
    };

    Ok(Some(frame))
}

fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    buf[start..]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|i| (&buf[start..start + i], start + i + CRLF.len()))
}

fn text(line: &[u8]) -> StoreResult<String> {
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|_| StoreError::Protocol("invalid UTF-8 in line".to_string()))
}

fn decimal(line: &[u8]) -> StoreResult<i64> {
    text(line)?
        .parse::<i64>()
        .map_err(|_| StoreError::Protocol("invalid integer".to_string()))
}

/// Length header of a bulk string or array, `None` for the null marker `-1`.
fn length(line: &[u8]) -> StoreResult<Option<usize>> {
    match decimal(line)? {
        -1 => Ok(None),
        n if n < 0 => Err(StoreError::Protocol(format!("invalid length {}", n))),
        n => usize::try_from(n)
            .map(Some)
            .map_err(|_| StoreError::Protocol(format!("invalid length {}", n))),
    }
}

fn write_frame(frame: &Frame, dst: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => write_line(dst, PREFIX_SIMPLE, s.as_bytes()),
        Frame::Error(s) => write_line(dst, PREFIX_ERROR, s.as_bytes()),
        Frame::Integer(n) => write_line(dst, PREFIX_INTEGER, n.to_string().as_bytes()),
        Frame::Bulk(None) => write_line(dst, PREFIX_BULK, b"-1"),
        Frame::Bulk(Some(data)) => {
            write_line(dst, PREFIX_BULK, data.len().to_string().as_bytes());
            dst.extend_from_slice(data);
            dst.extend_from_slice(CRLF);
        }
        Frame::Array(None) => write_line(dst, PREFIX_ARRAY, b"-1"),
        Frame::Array(Some(items)) => {
            write_line(dst, PREFIX_ARRAY, items.len().to_string().as_bytes());
            for item in items {
                write_frame(item, dst);
            }
        }
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.reserve(1 + body.len() + CRLF.len());
    dst.put_u8(prefix);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}
