//! RESP Store: talks to a Redis-compatible server over pooled TCP connections.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::Framed;

use super::codec::RespCodec;
use super::frame::Frame;
use crate::store::{ScanPage, StoreClient, StoreError, StoreResult};

type Connection = Framed<TcpStream, RespCodec>;

/// Cursor value that both starts and ends a `SCAN` iteration.
const SCAN_START: &str = "0";

const WRONGTYPE: &str = "WRONGTYPE";

#[derive(Debug, Clone)]
pub struct RespOptions {
    pub addr: String,
    pub password: Option<String>,
    pub database: u32,
    /// Idle connections kept for reuse.
    pub max_idle: usize,
    pub connect_timeout: Duration,
    /// Upper bound for one command round-trip; the connection is dropped when it fires.
    pub command_timeout: Duration,
}

impl RespOptions {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            password: None,
            database: 0,
            max_idle: 8,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(5),
        }
    }
}

pub struct RespStore {
    options: RespOptions,
    idle: Mutex<Vec<Connection>>,
}

impl RespStore {
    pub fn new(options: RespOptions) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(options.max_idle)),
            options,
        }
    }

    /// Sends one command and waits for its reply.
    ///
    /// The connection goes back to the pool only after a full round-trip, so a
    /// cancelled or failed call never leaves a half-read reply behind. A pooled
    /// connection the server has closed in the meantime is replaced once; every
    /// command sent here is read-only.
    async fn execute<I, S>(&self, args: I) -> StoreResult<Frame>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let command = Frame::command(args);
        let pooled = self.idle.lock().pop();

        let (reply, conn) = match pooled {
            Some(mut conn) => match self.roundtrip(&mut conn, command.clone()).await {
                Err(err) if is_stale(&err) => {
                    tracing::debug!(error = %err, "pooled store connection is stale, reconnecting");
                    drop(conn);
                    self.fresh_roundtrip(command).await?
                }
                other => (other?, conn),
            },
            None => self.fresh_roundtrip(command).await?,
        };

        self.checkin(conn);
        Ok(reply)
    }

    async fn fresh_roundtrip(&self, command: Frame) -> StoreResult<(Frame, Connection)> {
        let mut conn = self.connect().await?;
        let reply = self.roundtrip(&mut conn, command).await?;
        Ok((reply, conn))
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.options.max_idle {
            idle.push(conn);
        }
    }

    async fn connect(&self) -> StoreResult<Connection> {
        let addr = &self.options.addr;
        let stream = time::timeout(self.options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| StoreError::Unavailable(format!("connect to {} timed out", addr)))??;
        stream.set_nodelay(true)?;

        let mut conn = Framed::new(stream, RespCodec::new());

        if let Some(password) = &self.options.password {
            expect_ok(self.roundtrip(&mut conn, Frame::command(["AUTH", password.as_str()])).await?)?;
        }
        if self.options.database != 0 {
            let db = self.options.database.to_string();
            expect_ok(self.roundtrip(&mut conn, Frame::command(["SELECT", db.as_str()])).await?)?;
        }

        tracing::debug!(addr = %addr, "opened store connection");
        Ok(conn)
    }

    async fn roundtrip(&self, conn: &mut Connection, command: Frame) -> StoreResult<Frame> {
        let timeout = self.options.command_timeout;
        time::timeout(timeout, exchange(conn, command))
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!("{} did not reply within {:?}", self.options.addr, timeout))
            })?
    }
}

async fn exchange(conn: &mut Connection, command: Frame) -> StoreResult<Frame> {
    conn.send(command).await?;
    match conn.next().await {
        Some(reply) => reply,
        None => Err(StoreError::ConnectionClosed),
    }
}

/// Errors a server-side close of an idle connection produces.
fn is_stale(err: &StoreError) -> bool {
    matches!(err, StoreError::ConnectionClosed | StoreError::Io(_))
}

fn expect_ok(reply: Frame) -> StoreResult<()> {
    match reply {
        Frame::Simple(s) if s == "OK" => Ok(()),
        Frame::Error(e) => Err(StoreError::Server(e)),
        other => Err(unexpected("OK", &other)),
    }
}

fn unexpected(expected: &str, got: &Frame) -> StoreError {
    StoreError::Protocol(format!("expected {}, got {}", expected, got.kind()))
}

#[async_trait]
impl StoreClient for RespStore {
    async fn scan(&self, cursor: Option<&str>, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let count = count.max(1).to_string();
        let cursor = cursor.unwrap_or(SCAN_START);
        let reply = self
            .execute(["SCAN", cursor, "MATCH", pattern, "COUNT", count.as_str()])
            .await?;

        match reply {
            Frame::Array(Some(parts)) if parts.len() == 2 => {
                let mut parts = parts.into_iter();
                let next = parts
                    .next()
                    .and_then(|frame| frame.as_text())
                    .ok_or_else(|| StoreError::Protocol("SCAN cursor is not a string".to_string()))?;
                let keys = match parts.next() {
                    Some(Frame::Array(Some(keys))) => keys
                        .iter()
                        .map(|key| key.as_text().ok_or_else(|| unexpected("bulk string key", key)))
                        .collect::<StoreResult<Vec<_>>>()?,
                    Some(Frame::Array(None)) => Vec::new(),
                    Some(other) => return Err(unexpected("array of keys", &other)),
                    None => Vec::new(),
                };
                let cursor = (next != SCAN_START).then_some(next);
                Ok(ScanPage { keys, cursor })
            }
            Frame::Error(e) => Err(StoreError::Server(e)),
            other => Err(unexpected("two-element array", &other)),
        }
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        match self.execute(["GET", key]).await? {
            Frame::Bulk(Some(data)) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
            Frame::Bulk(None) => Ok(None),
            Frame::Error(e) if e.starts_with(WRONGTYPE) => Ok(None),
            Frame::Error(e) => Err(StoreError::Server(e)),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    async fn time_to_live(&self, key: &str) -> StoreResult<Option<Duration>> {
        match self.execute(["PTTL", key]).await? {
            // -1: no expiration, -2: no such key
            Frame::Integer(ms) if ms < 0 => Ok(None),
            Frame::Integer(ms) => Ok(Some(Duration::from_millis(ms.unsigned_abs()))),
            Frame::Error(e) => Err(StoreError::Server(e)),
            other => Err(unexpected("integer", &other)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        match self.execute(["PING"]).await? {
            Frame::Simple(s) if s == "PONG" => Ok(()),
            Frame::Error(e) => Err(StoreError::Server(e)),
            other => Err(unexpected("PONG", &other)),
        }
    }
}
