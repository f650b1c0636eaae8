use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// One listed key with its string value and absolute expiration time.
///
/// Built in stages from a key-only seed; every stage consumes the entry and
/// returns a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Option<String>,
    pub expiration: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn seed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            expiration: None,
        }
    }

    pub fn with_value(self, value: Option<String>) -> Self {
        Self { value, ..self }
    }

    /// Turns the remaining TTL reported by the store into `now + ttl`.
    /// A missing or zero TTL leaves the entry without expiration.
    pub fn with_expiration(self, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expiration = ttl
            .filter(|ttl| !ttl.is_zero())
            .and_then(|ttl| TimeDelta::from_std(ttl).ok())
            .and_then(|delta| now.checked_add_signed(delta));
        Self { expiration, ..self }
    }
}
