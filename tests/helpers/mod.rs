#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use redisman::config::EntriesConfig;
use redisman::entries::EntryEnumerator;
use redisman::store::resp::{Frame, RespCodec};
use redisman::store::{MemoryStore, ScanPage, StoreClient, StoreError, StoreResult};
use redisman::RedismanEngine;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;

pub const DAY: Duration = Duration::from_secs(86_400);

pub fn setup_memory_store() -> MemoryStore {
    MemoryStore::new(Duration::from_secs(60))
}

/// `aaa` (1 day TTL), `aab` and `bbb` (no TTL).
pub fn seed_scenario(store: &MemoryStore) {
    store.set_with_ttl("aaa", "ValueAAA", DAY);
    store.set("aab", "ValueAAB");
    store.set("bbb", "ValueBBB");
}

pub fn entries_config(scan_count: usize, concurrency: usize) -> EntriesConfig {
    EntriesConfig { scan_count, concurrency }
}

pub fn enumerator_for(store: Arc<dyn StoreClient>) -> EntryEnumerator {
    EntryEnumerator::new(store, entries_config(10, 4))
}

pub fn engine_for(store: Arc<dyn StoreClient>) -> RedismanEngine {
    RedismanEngine::with_store(store, entries_config(10, 4))
}

// ========================================
// INSTRUMENTED STORE
// ========================================

/// Wraps a [`MemoryStore`], counting calls and failing on demand.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub scans: AtomicUsize,
    pub lookups: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_scan_page: Option<usize>,
    pub fail_value_for: HashSet<String>,
    pub fail_ttl_for: HashSet<String>,
    pub lookup_delay: Duration,
}

impl CountingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            scans: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            fail_scan_page: None,
            fail_value_for: HashSet::new(),
            fail_ttl_for: HashSet::new(),
            lookup_delay: Duration::ZERO,
        }
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    async fn track<T>(&self, lookup: impl std::future::Future<Output = T>) -> T {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.lookup_delay.is_zero() {
            tokio::time::sleep(self.lookup_delay).await;
        }
        let result = lookup.await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl StoreClient for CountingStore {
    async fn scan(&self, cursor: Option<&str>, pattern: &str, count: usize) -> StoreResult<ScanPage> {
        let page = self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_scan_page == Some(page) {
            return Err(StoreError::ConnectionClosed);
        }
        self.inner.scan(cursor, pattern, count).await
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        if self.fail_value_for.contains(key) {
            return Err(StoreError::Server(format!("ERR value lookup failed for {}", key)));
        }
        self.track(self.inner.get_value(key)).await
    }

    async fn time_to_live(&self, key: &str) -> StoreResult<Option<Duration>> {
        if self.fail_ttl_for.contains(key) {
            return Err(StoreError::Server(format!("ERR ttl lookup failed for {}", key)));
        }
        self.track(self.inner.time_to_live(key)).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }
}

// ========================================
// FAKE RESP SERVER
// ========================================

#[derive(Default, Clone)]
pub struct FakeRespOptions {
    pub password: Option<String>,
    /// Keys answered with `-WRONGTYPE` on GET
    pub wrong_type: HashSet<String>,
    /// Command name answered with `-ERR` every time
    pub fail_command: Option<&'static str>,
    /// Keys answered with `:0` on PTTL
    pub zero_ttl: HashSet<String>,
    /// Close the socket after every reply, like an idle timeout would
    pub close_after_reply: bool,
}

/// Minimal Redis-protocol server backed by a [`MemoryStore`].
pub struct FakeRespServer {
    pub addr: String,
    pub connections: Arc<AtomicUsize>,
    pub commands: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeRespServer {
    pub async fn spawn(store: MemoryStore, options: FakeRespOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicUsize::new(0));
        let commands = Arc::new(Mutex::new(Vec::new()));

        let conn_counter = connections.clone();
        let log = commands.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                conn_counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(socket, store.clone(), options.clone(), log.clone()));
            }
        });

        Self { addr, connections, commands }
    }

    /// Accepts connections, reads commands and never answers them.
    pub async fn spawn_silent() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let connections = Arc::new(AtomicUsize::new(0));

        let conn_counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                conn_counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut conn = Framed::new(socket, RespCodec::new());
                    while let Some(Ok(_)) = conn.next().await {}
                });
            }
        });

        Self { addr, connections, commands: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.lock().iter().map(|args| args[0].clone()).collect()
    }
}

async fn serve_connection(
    socket: TcpStream,
    store: MemoryStore,
    options: FakeRespOptions,
    log: Arc<Mutex<Vec<Vec<String>>>>,
) {
    let mut conn = Framed::new(socket, RespCodec::new());
    let mut authenticated = options.password.is_none();

    while let Some(Ok(frame)) = conn.next().await {
        let args: Vec<String> = match frame {
            Frame::Array(Some(items)) => items.iter().filter_map(Frame::as_text).collect(),
            _ => break,
        };
        if args.is_empty() {
            break;
        }
        log.lock().push(args.clone());

        let name = args[0].to_ascii_uppercase();
        let reply = if options.fail_command == Some(name.as_str()) {
            Frame::Error("ERR injected failure".to_string())
        } else if name == "AUTH" {
            if options.password.as_deref() == args.get(1).map(String::as_str) {
                authenticated = true;
                Frame::Simple("OK".to_string())
            } else {
                Frame::Error("WRONGPASS invalid username-password pair".to_string())
            }
        } else if !authenticated {
            Frame::Error("NOAUTH Authentication required.".to_string())
        } else {
            execute(&store, &options, &args).await
        };

        if conn.send(reply).await.is_err() || options.close_after_reply {
            break;
        }
    }
}

async fn execute(store: &MemoryStore, options: &FakeRespOptions, args: &[String]) -> Frame {
    match args[0].to_ascii_uppercase().as_str() {
        "PING" => Frame::Simple("PONG".to_string()),
        "SELECT" => Frame::Simple("OK".to_string()),
        "SCAN" => {
            let cursor = (args[1] != "0").then(|| args[1].clone());
            let pattern = option_arg(args, "MATCH").unwrap_or("*");
            let count = option_arg(args, "COUNT").and_then(|c| c.parse().ok()).unwrap_or(10);
            let page = store.scan(cursor.as_deref(), pattern, count).await.unwrap();
            Frame::Array(Some(vec![
                Frame::bulk(page.cursor.unwrap_or_else(|| "0".to_string())),
                Frame::Array(Some(page.keys.into_iter().map(Frame::bulk).collect())),
            ]))
        }
        "GET" if options.wrong_type.contains(&args[1]) => Frame::Error(
            "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
        ),
        "GET" => Frame::Bulk(store.get_value(&args[1]).await.unwrap().map(Into::into)),
        "PTTL" if options.zero_ttl.contains(&args[1]) => Frame::Integer(0),
        "PTTL" => {
            let exists = options.wrong_type.contains(&args[1])
                || store.get_value(&args[1]).await.unwrap().is_some();
            match store.time_to_live(&args[1]).await.unwrap() {
                Some(ttl) => Frame::Integer(ttl.as_millis() as i64),
                None if exists => Frame::Integer(-1),
                None => Frame::Integer(-2),
            }
        }
        other => Frame::Error(format!("ERR unknown command '{}'", other)),
    }
}

fn option_arg<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg.eq_ignore_ascii_case(name))
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
