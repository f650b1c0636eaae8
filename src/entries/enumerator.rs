//! Entry Enumerator: scan keys by pattern and enrich each one with its value
//! and expiration.
//!
//! The result is a lazy stream:
//! - the scan cursor only advances once the keys of the current page are consumed
//! - at most `concurrency` keys are being looked up at any time
//! - the first store error is yielded and ends the stream
//! - dropping the stream cancels every in-flight lookup

use std::future;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, Stream, StreamExt, TryStreamExt};

use super::entry::Entry;
use crate::config::EntriesConfig;
use crate::store::{StoreClient, StoreError, StoreResult, MATCH_ALL};

#[derive(Clone)]
pub struct EntryEnumerator {
    store: Arc<dyn StoreClient>,
    config: EntriesConfig,
}

impl EntryEnumerator {
    pub fn new(store: Arc<dyn StoreClient>, config: EntriesConfig) -> Self {
        Self { store, config }
    }

    /// Lists the entries whose key matches `pattern` (every key when `None`).
    ///
    /// The pattern is handed to the store untouched. Output order is unspecified.
    pub fn enumerate(&self, pattern: Option<&str>) -> impl Stream<Item = StoreResult<Entry>> + Send + 'static {
        let pattern = pattern.unwrap_or(MATCH_ALL).to_string();
        let store = self.store.clone();

        scan_keys(self.store.clone(), pattern, self.config.scan_count)
            .map_ok(move |key| enrich(store.clone(), key))
            .try_buffer_unordered(self.config.concurrency.max(1))
            .scan(false, |failed, item| {
                if *failed {
                    return future::ready(None);
                }
                *failed = item.is_err();
                future::ready(Some(item))
            })
    }

    /// Gathers the whole enumeration, failing on the first store error.
    pub async fn collect(&self, pattern: Option<&str>) -> StoreResult<Vec<Entry>> {
        self.enumerate(pattern).try_collect().await
    }
}

enum Cursor {
    Start,
    Resume(String),
    Done,
}

struct ScanState {
    store: Arc<dyn StoreClient>,
    pattern: String,
    count: usize,
    cursor: Cursor,
}

/// Flattens the paged scan into a stream of keys, fetching a page only on demand.
fn scan_keys(
    store: Arc<dyn StoreClient>,
    pattern: String,
    count: usize,
) -> impl Stream<Item = StoreResult<String>> + Send + 'static {
    let state = ScanState {
        store,
        pattern,
        count,
        cursor: Cursor::Start,
    };

    stream::try_unfold(state, |mut state| async move {
        let from = match std::mem::replace(&mut state.cursor, Cursor::Done) {
            Cursor::Start => None,
            Cursor::Resume(cursor) => Some(cursor),
            Cursor::Done => return Ok(None),
        };

        let page = state
            .store
            .scan(from.as_deref(), &state.pattern, state.count)
            .await?;
        tracing::debug!(pattern = %state.pattern, keys = page.keys.len(), more = page.cursor.is_some(), "scanned page");

        if let Some(next) = page.cursor {
            state.cursor = Cursor::Resume(next);
        }
        let keys = stream::iter(page.keys.into_iter().map(Ok::<_, StoreError>));
        Ok::<_, StoreError>(Some((keys, state)))
    })
    .try_flatten()
}

/// Value lookup then TTL lookup, strictly in that order for one key.
async fn enrich(store: Arc<dyn StoreClient>, key: String) -> StoreResult<Entry> {
    let entry = Entry::seed(key);

    let value = store.get_value(&entry.key).await?;
    let entry = entry.with_value(value);

    let ttl = store.time_to_live(&entry.key).await?;
    Ok(entry.with_expiration(ttl, Utc::now()))
}
