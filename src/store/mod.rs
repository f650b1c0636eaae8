//! Store Client: the key-value store behind the entry listing.
//!
//! The store is an external collaborator. Everything the service needs from it
//! fits in the [`StoreClient`] trait; two backends ship with the crate:
//! - [`MemoryStore`]: in-process map with TTL support (tests, local runs)
//! - [`RespStore`]: Redis-protocol client over TCP

pub mod errors;
pub mod glob;
pub mod memory;
pub mod resp;

use std::time::Duration;

use async_trait::async_trait;

pub use errors::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use resp::{RespOptions, RespStore};

/// Pattern used when the caller does not provide one.
pub const MATCH_ALL: &str = "*";

/// One page of a cursor-based key scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub keys: Vec<String>,
    /// Cursor to resume from, `None` once the iteration is complete.
    pub cursor: Option<String>,
}

/// Read capabilities required from the key-value store.
///
/// Implementations are shared across requests (`Send + Sync`) and every call
/// is a suspension point on network or lock I/O.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Fetches the next page of keys matching `pattern`.
    ///
    /// `cursor: None` starts a new iteration. The scan is weakly consistent:
    /// keys mutated while iterating may be returned twice or not at all, and a
    /// page may be empty while the returned cursor is still `Some`.
    async fn scan(&self, cursor: Option<&str>, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// String value of `key`, `None` if missing or not a string.
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>>;

    /// Remaining time to live of `key`, `None` if missing or persistent.
    async fn time_to_live(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Round-trip check used for health reporting.
    async fn ping(&self) -> StoreResult<()>;
}
