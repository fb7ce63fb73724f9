use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Namespace prepended to every key when none is configured.
pub const DEFAULT_PREFIX: &str = "rate_limits:";

/// Failures reported by a [`CounterStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or refused the command.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
    /// A Redis command failed.
    #[cfg(feature = "redis")]
    #[error("redis command failed: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Abstract key-value store holding fixed-window counters.
///
/// Keys passed in are relative; the implementation applies its own
/// [`prefix`](CounterStore::prefix). The exception is
/// [`keys_matching`](CounterStore::keys_matching), which reports keys exactly
/// as stored, prefix included.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Namespace applied to every key.
    fn prefix(&self) -> &str;

    /// Atomically add `amount` to `key`, creating it at `amount` if absent or
    /// expired. Returns the new value.
    async fn increment_by(&self, key: &str, amount: u64) -> Result<u64, StoreError>;

    /// Expire `key` at the given Unix timestamp (seconds).
    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<(), StoreError>;

    /// Stored keys matching the glob `pattern` under the prefix.
    ///
    /// Patterns follow Redis `KEYS` syntax on every backend: `*`, `?`,
    /// `[...]` classes and `\` escapes.
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Delete every key in `keys` in one batch.
    async fn delete_all(&self, keys: &[String]) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CounterStore + ?Sized> CounterStore for Arc<S> {
    fn prefix(&self) -> &str {
        (**self).prefix()
    }

    async fn increment_by(&self, key: &str, amount: u64) -> Result<u64, StoreError> {
        (**self).increment_by(key, amount).await
    }

    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<(), StoreError> {
        (**self).expire_at(key, unix_secs).await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        (**self).keys_matching(pattern).await
    }

    async fn delete_all(&self, keys: &[String]) -> Result<(), StoreError> {
        (**self).delete_all(keys).await
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Option<u64>,
}

impl Entry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// In-process counter store with lazy expiration.
///
/// Clones share the same counters. Intended for tests and single-instance
/// deployments.
#[derive(Debug, Clone)]
pub struct InMemoryCounterStore {
    // Map full key (prefix included) -> entry
    data: Arc<Mutex<HashMap<String, Entry>>>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            data: Arc::new(Mutex::new(HashMap::new())),
            prefix: prefix.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the clock used to decide whether an entry has expired.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        self.data.lock().map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".into()))
    }

    /// Current live count for `key`, if any.
    pub fn count(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_unix_secs();
        let guard = self.data.lock().ok()?;
        guard.get(&self.full_key(key)).filter(|e| e.is_live(now)).map(|e| e.count)
    }

    /// Expiration instant armed on `key`, if any.
    pub fn expires_at(&self, key: &str) -> Option<u64> {
        let now = self.clock.now_unix_secs();
        let guard = self.data.lock().ok()?;
        guard.get(&self.full_key(key)).filter(|e| e.is_live(now)).and_then(|e| e.expires_at)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now_unix_secs();
        self.data.lock().map(|g| g.values().filter(|e| e.is_live(now)).count()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    async fn increment_by(&self, key: &str, amount: u64) -> Result<u64, StoreError> {
        let now = self.clock.now_unix_secs();
        let mut guard = self.lock()?;
        let entry = guard.entry(self.full_key(key)).or_insert(Entry { count: 0, expires_at: None });
        if !entry.is_live(now) {
            *entry = Entry { count: 0, expires_at: None };
        }
        entry.count = entry.count.saturating_add(amount);
        Ok(entry.count)
    }

    async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<(), StoreError> {
        let now = self.clock.now_unix_secs();
        let mut guard = self.lock()?;
        let full_key = self.full_key(key);
        match guard.get_mut(&full_key) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = Some(unix_secs);
            }
            Some(_) => {
                guard.remove(&full_key);
            }
            None => {}
        }
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now_unix_secs();
        let full_pattern = self.full_key(pattern);
        let guard = self.lock()?;
        let mut keys: Vec<String> = guard
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && glob_match(&full_pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_all(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        for key in keys {
            guard.remove(&self.full_key(key));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum GlobToken {
    /// `*`
    Star,
    /// `?`
    Any,
    Literal(char),
    /// `[...]` as inclusive ranges; single characters are `(c, c)`.
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl GlobToken {
    fn matches(&self, ch: char) -> bool {
        match self {
            GlobToken::Star | GlobToken::Any => true,
            GlobToken::Literal(c) => *c == ch,
            GlobToken::Class { negated, ranges } => {
                ranges.iter().any(|&(lo, hi)| lo <= ch && ch <= hi) != *negated
            }
        }
    }
}

fn parse_glob(pattern: &str) -> Vec<GlobToken> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let token = match chars[i] {
            '*' => GlobToken::Star,
            '?' => GlobToken::Any,
            '\\' if i + 1 < chars.len() => {
                i += 1;
                GlobToken::Literal(chars[i])
            }
            '[' => {
                i += 1;
                let negated = chars.get(i) == Some(&'^');
                if negated {
                    i += 1;
                }
                let mut ranges = Vec::new();
                while i < chars.len() && chars[i] != ']' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        i += 1;
                        ranges.push((chars[i], chars[i]));
                    } else if i + 2 < chars.len() && chars[i + 1] == '-' {
                        let (a, b) = (chars[i], chars[i + 2]);
                        ranges.push((a.min(b), a.max(b)));
                        i += 2;
                    } else {
                        ranges.push((chars[i], chars[i]));
                    }
                    i += 1;
                }
                GlobToken::Class { negated, ranges }
            }
            c => GlobToken::Literal(c),
        };
        tokens.push(token);
        i += 1;
    }

    tokens
}

/// Match `text` against a Redis-style glob: `*`, `?`, `[...]` classes
/// (`^` negates, `a-z` ranges) and `\` escapes.
///
/// Counter keys escape `:` and `\` inside segments, so matching an escaped
/// segment literally takes a doubled backslash: the pattern `2001\\:db8*`
/// matches the stored key `2001\:db8...`.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = parse_glob(pattern);
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some(GlobToken::Star) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(token) if token.matches(text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|token| *token == GlobToken::Star)
}

#[cfg(feature = "redis")]
pub use self::redis_store::{RedisCounterStore, RedisCounterStoreConfig};

#[cfg(feature = "redis")]
mod redis_store {
    use super::{CounterStore, StoreError, DEFAULT_PREFIX};
    use crate::config::RateLimitSettings;
    use async_trait::async_trait;
    use redis::aio::ConnectionManager;
    use redis::{AsyncCommands, Client, RedisError};
    use std::fmt;

    /// Configuration for [`RedisCounterStore`].
    #[derive(Debug, Clone)]
    pub struct RedisCounterStoreConfig {
        /// Namespace prepended to every key (default: `rate_limits:`)
        pub prefix: String,
    }

    impl Default for RedisCounterStoreConfig {
        fn default() -> Self {
            Self { prefix: DEFAULT_PREFIX.to_string() }
        }
    }

    /// Redis-backed counter store, shareable across application instances.
    ///
    /// `INCRBY` provides the atomic increment; `EXPIREAT` arms the window.
    /// The connection manager reconnects on its own, and each command fails
    /// fast when Redis is down rather than retrying.
    #[derive(Clone)]
    pub struct RedisCounterStore {
        connection: ConnectionManager,
        config: RedisCounterStoreConfig,
    }

    impl fmt::Debug for RedisCounterStore {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("RedisCounterStore").field("config", &self.config).finish_non_exhaustive()
        }
    }

    impl RedisCounterStore {
        /// Connect with the default `rate_limits:` prefix.
        ///
        /// # Errors
        /// Returns error if the URL is invalid or the connection fails.
        pub async fn connect(url: &str) -> Result<Self, RedisError> {
            Self::connect_with_config(url, RedisCounterStoreConfig::default()).await
        }

        /// Connect with a custom configuration.
        pub async fn connect_with_config(
            url: &str,
            config: RedisCounterStoreConfig,
        ) -> Result<Self, RedisError> {
            let client = Client::open(url)?;
            let connection = ConnectionManager::new(client).await?;
            Ok(Self { connection, config })
        }

        /// Connect to `settings.redis_url` using `settings.prefix`.
        pub async fn from_settings(settings: &RateLimitSettings) -> Result<Self, StoreError> {
            let url = settings
                .redis_url
                .as_deref()
                .ok_or_else(|| StoreError::Unavailable("no redis_url configured".into()))?;
            let config = RedisCounterStoreConfig { prefix: settings.prefix.clone() };
            Ok(Self::connect_with_config(url, config).await?)
        }

        fn key(&self, key: &str) -> String {
            format!("{}{}", self.config.prefix, key)
        }
    }

    #[async_trait]
    impl CounterStore for RedisCounterStore {
        fn prefix(&self) -> &str {
            &self.config.prefix
        }

        async fn increment_by(&self, key: &str, amount: u64) -> Result<u64, StoreError> {
            let mut conn = self.connection.clone();
            let count: i64 = conn.incr(self.key(key), amount).await?;
            Ok(u64::try_from(count).unwrap_or(0))
        }

        async fn expire_at(&self, key: &str, unix_secs: u64) -> Result<(), StoreError> {
            let mut conn = self.connection.clone();
            let _: () = redis::cmd("EXPIREAT")
                .arg(self.key(key))
                .arg(unix_secs)
                .query_async(&mut conn)
                .await?;
            Ok(())
        }

        async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
            let mut conn = self.connection.clone();
            let keys: Vec<String> = conn.keys(self.key(pattern)).await?;
            Ok(keys)
        }

        async fn delete_all(&self, keys: &[String]) -> Result<(), StoreError> {
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.connection.clone();
            let full: Vec<String> = keys.iter().map(|k| self.key(k)).collect();
            let _: () = conn.del(full).await?;
            Ok(())
        }
    }
}
