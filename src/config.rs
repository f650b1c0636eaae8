use std::env;
use std::num::{NonZeroU64, NonZeroUsize};
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Config error: {key} must be valid (got {value:?})")]
    Invalid { key: &'static str, value: String },
}

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub entries: EntriesConfig,
    pub auth: AuthConfig,
}

impl Config {
    /// Reads `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        Ok(Self {
            server: ServerConfig::load(&vars)?,
            store: StoreConfig::load(&vars)?,
            entries: EntriesConfig::load(&vars)?,
            auth: AuthConfig::load(&vars),
        })
    }
}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl ServerConfig {
    fn load(vars: &Vars) -> Result<Self, ConfigError> {
        Ok(Self {
            host:      vars.get("SERVER_HOST", "127.0.0.1")?,
            port:      vars.get("SERVER_PORT", "8080")?,
            log_level: vars.get("REDISMAN_LOG", "info")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// STORE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Resp,
}

impl std::str::FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "resp" | "redis" => Ok(Self::Resp),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub addr: String,
    pub password: Option<String>,
    pub database: u32,
    pub pool_max_idle: usize,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl StoreConfig {
    fn load(vars: &Vars) -> Result<Self, ConfigError> {
        Ok(Self {
            backend:          vars.get("STORE_BACKEND", "memory")?,
            addr:             vars.get("STORE_ADDR", "127.0.0.1:6379")?,
            password:         vars.optional("STORE_PASSWORD"),
            database:         vars.get("STORE_DATABASE", "0")?,
            pool_max_idle:    vars.get("STORE_POOL_MAX_IDLE", "8")?,
            connect_timeout:  Duration::from_millis(vars.get::<NonZeroU64>("STORE_CONNECT_TIMEOUT_MS", "2000")?.get()),
            command_timeout:  Duration::from_millis(vars.get::<NonZeroU64>("STORE_COMMAND_TIMEOUT_MS", "5000")?.get()),
            cleanup_interval: Duration::from_secs(vars.get::<NonZeroU64>("STORE_CLEANUP_INTERVAL_SECS", "60")?.get()),
        })
    }
}

// ENTRIES
#[derive(Debug, Clone)]
pub struct EntriesConfig {
    /// `COUNT` hint sent with every scan page
    pub scan_count: usize,
    /// Keys looked up concurrently within one enumeration
    pub concurrency: usize,
}

impl EntriesConfig {
    fn load(vars: &Vars) -> Result<Self, ConfigError> {
        Ok(Self {
            scan_count:  vars.get::<NonZeroUsize>("ENTRIES_SCAN_COUNT", "100")?.get(),
            concurrency: vars.get::<NonZeroUsize>("ENTRIES_CONCURRENCY", "16")?.get(),
        })
    }
}

impl Default for EntriesConfig {
    fn default() -> Self {
        Self {
            scan_count: 100,
            concurrency: 16,
        }
    }
}

// AUTH
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Accepted API keys; empty disables the guard
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    fn load(vars: &Vars) -> Self {
        let api_keys = vars
            .optional("REDISMAN_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|key| !key.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self { api_keys }
    }

    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }
}

// --- PRIVATE HELPER ---

struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get<T: std::str::FromStr>(&self, key: &'static str, default: &str) -> Result<T, ConfigError> {
        let value = (self.0)(key).unwrap_or_else(|| default.to_string());
        let parsed = value.trim().parse::<T>();
        parsed.map_err(|_| ConfigError::Invalid { key, value })
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }
}
