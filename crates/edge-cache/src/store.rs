//! Key-value backends with passive TTL expiry.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store could not be opened (missing binding, no permission).
    #[error("failed to open store: {0}")]
    Open(String),

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A stored entry could not be decoded.
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

/// Source of wall-clock time in whole seconds.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    /// Create a clock frozen at `now` seconds.
    pub fn new(now: u64) -> Self {
        Self { now: Cell::new(now) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by.as_secs());
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.now.get()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_secs(&self) -> u64 {
        (**self).now_secs()
    }
}

/// A stored value with its expiry metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    /// The stored payload.
    pub value: Vec<u8>,
    /// When the entry was written (seconds since epoch).
    pub created_at: u64,
    /// Time-to-live in seconds.
    pub ttl_secs: u64,
}

/// Leading byte of the binary envelope, bumped on layout changes.
const ENTRY_VERSION: u8 = 1;
const ENTRY_HEADER_LEN: usize = 1 + 8 + 8;

impl CachedEntry {
    /// Create a new entry written at `now`.
    pub fn new(value: Vec<u8>, ttl: Duration, now: u64) -> Self {
        Self {
            value,
            created_at: now,
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Check if the entry has expired. A zero TTL is expired immediately.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.created_at.saturating_add(self.ttl_secs)
    }

    /// Encode as `version | created_at (be u64) | ttl_secs (be u64) | value`.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRY_HEADER_LEN + self.value.len());
        out.push(ENTRY_VERSION);
        out.extend_from_slice(&self.created_at.to_be_bytes());
        out.extend_from_slice(&self.ttl_secs.to_be_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    /// Decode an envelope produced by [`CachedEntry::encode`].
    pub fn decode(bytes: &[u8]) -> CacheResult<Self> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return Err(CacheError::Malformed(format!(
                "entry is {} bytes, header needs {}",
                bytes.len(),
                ENTRY_HEADER_LEN
            )));
        }
        if bytes[0] != ENTRY_VERSION {
            return Err(CacheError::Malformed(format!(
                "unknown entry version {}",
                bytes[0]
            )));
        }

        let mut created_at = [0u8; 8];
        created_at.copy_from_slice(&bytes[1..9]);
        let mut ttl_secs = [0u8; 8];
        ttl_secs.copy_from_slice(&bytes[9..17]);

        Ok(Self {
            value: bytes[ENTRY_HEADER_LEN..].to_vec(),
            created_at: u64::from_be_bytes(created_at),
            ttl_secs: u64::from_be_bytes(ttl_secs),
        })
    }
}

/// Async key-value store with per-entry TTL.
///
/// Expired entries read as absent; there is no explicit eviction.
#[async_trait(?Send)]
pub trait KvBackend {
    /// Get a live value.
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Store a value for `ttl`.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()>;

    /// Delete a value.
    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// A backend shared between the components of one request.
pub type SharedBackend = Rc<dyn KvBackend>;

/// In-memory backend (for development/testing).
pub struct InMemoryBackend<C: Clock = SystemClock> {
    entries: RefCell<HashMap<String, CachedEntry>>,
    clock: C,
    puts: Cell<usize>,
}

impl InMemoryBackend<SystemClock> {
    /// Create a new in-memory backend on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryBackend<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryBackend<C> {
    /// Create a new in-memory backend on a custom clock.
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            clock,
            puts: Cell::new(0),
        }
    }

    /// Raw entry lookup, ignoring expiry.
    pub fn entry(&self, key: &str) -> Option<CachedEntry> {
        self.entries.borrow().get(key).cloned()
    }

    /// All stored keys, expired or not, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of `put` calls served.
    pub fn put_count(&self) -> usize {
        self.puts.get()
    }
}

#[async_trait(?Send)]
impl<C: Clock> KvBackend for InMemoryBackend<C> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let now = self.clock.now_secs();
        Ok(self
            .entries
            .borrow()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let entry = CachedEntry::new(value, ttl, self.clock.now_secs());
        self.entries.borrow_mut().insert(key.to_string(), entry);
        self.puts.set(self.puts.get() + 1);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Backend over Spin's key-value store.
///
/// Spin has no native TTL, so values are wrapped in a [`CachedEntry`]
/// envelope and expired entries are deleted when read.
#[cfg(target_arch = "wasm32")]
pub struct SpinKvBackend<C: Clock = SystemClock> {
    store: spin_sdk::key_value::Store,
    clock: C,
}

#[cfg(target_arch = "wasm32")]
impl SpinKvBackend<SystemClock> {
    /// Open the default key-value store.
    pub fn open_default() -> CacheResult<Self> {
        let store = spin_sdk::key_value::Store::open_default()
            .map_err(|e| CacheError::Open(e.to_string()))?;
        Ok(Self {
            store,
            clock: SystemClock,
        })
    }
}

#[cfg(target_arch = "wasm32")]
#[async_trait(?Send)]
impl<C: Clock> KvBackend for SpinKvBackend<C> {
    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let bytes = match self.store.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(None),
            Err(e) => return Err(CacheError::Storage(e.to_string())),
        };

        let entry = CachedEntry::decode(&bytes)?;
        if entry.is_expired(self.clock.now_secs()) {
            // Best effort; a failed delete just leaves the entry for the next reader.
            let _ = self.store.delete(key);
            return Ok(None);
        }
        Ok(Some(entry.value))
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> CacheResult<()> {
        let entry = CachedEntry::new(value, ttl, self.clock.now_secs());
        self.store
            .set(key, &entry.encode())
            .map_err(|e| CacheError::Storage(e.to_string()))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store
            .delete(key)
            .map_err(|e| CacheError::Storage(e.to_string()))
    }
}
