//! Caching layer for daily document lists.
//!
//! Lists are keyed by `(date, query fingerprint)` and expire after a TTL.
//! Storage sits behind the [`DocumentListStore`] capability so the crawler
//! works the same with the SQLite store or with caching disabled.

pub mod noop;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use noop::NoopStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use crate::edinet::{DocumentList, ListFetcher, document_list_params};
use crate::error::Result;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::future::Future;
use tracing::{debug, warn};

/// Default time-to-live for cached lists, in days.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Digest of the non-secret, non-date query parameters of a list request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    /// Fingerprint a parameter set. Order does not matter; `date` is part of
    /// the cache key already and is ignored here.
    pub fn of<K: AsRef<str>, V: AsRef<str>>(params: &[(K, V)]) -> Self {
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .filter(|(k, _)| !k.eq_ignore_ascii_case("date"))
            .collect();
        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        for (k, v) in pairs {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"&");
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Cache key of one daily list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Calendar day of the list
    pub date: NaiveDate,
    /// Fingerprint of the remaining query parameters
    pub fingerprint: QueryFingerprint,
}

impl CacheKey {
    /// Key for an arbitrary parameter set.
    pub const fn new(date: NaiveDate, fingerprint: QueryFingerprint) -> Self {
        Self { date, fingerprint }
    }

    /// Key for the standard `documents.json?type=2` request.
    pub fn document_list(date: NaiveDate) -> Self {
        Self::new(date, QueryFingerprint::of(&document_list_params(date)))
    }
}

/// A stored payload and when it was retrieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Raw `documents.json` bytes
    pub payload: Vec<u8>,
    /// Retrieval time
    pub retrieved_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.retrieved_at) < ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored lists
    pub entries: usize,
    /// Number of distinct days covered
    pub distinct_dates: usize,
    /// Total payload size in bytes
    pub payload_bytes: u64,
    /// Oldest retrieval time
    pub oldest: Option<DateTime<Utc>>,
    /// Newest retrieval time
    pub newest: Option<DateTime<Utc>>,
}

/// Storage capability for cached document lists.
///
/// Each key is overwritten independently; implementations never merge
/// payloads.
pub trait DocumentListStore: Send + Sync + std::fmt::Debug {
    /// Look up an entry regardless of its age.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry.
    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()>;

    /// Remove every entry. Returns the number removed.
    fn clear(&self) -> Result<usize>;

    /// Remove entries older than `ttl` at `now`. Returns the number removed.
    fn sweep_expired(&self, ttl: Duration, now: DateTime<Utc>) -> Result<usize>;

    /// Summary statistics.
    fn stats(&self) -> Result<CacheStats>;

    /// Whether entries survive the process.
    fn is_persistent(&self) -> bool;
}

/// Outcome of a cache-backed lookup.
#[derive(Debug, Clone)]
pub struct CachedList {
    /// Decoded list
    pub list: DocumentList,
    /// Served from the store without a network call
    pub from_cache: bool,
}

/// TTL-aware document-list cache over a [`DocumentListStore`].
#[derive(Debug)]
pub struct DocumentListCache {
    store: Box<dyn DocumentListStore>,
    ttl: Duration,
}

impl DocumentListCache {
    /// Wrap a store.
    pub fn new(store: Box<dyn DocumentListStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// A cache that stores nothing.
    pub fn disabled() -> Self {
        Self::new(Box::new(NoopStore), Duration::zero())
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn DocumentListStore {
        self.store.as_ref()
    }

    /// Configured TTL.
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fetch the standard document list for `date`, using the cache when fresh.
    pub async fn get_or_fetch(&self, date: NaiveDate, fetcher: &dyn ListFetcher) -> Result<CachedList> {
        let key = CacheKey::document_list(date);
        self.get_or_fetch_with(&key, || fetcher.fetch_document_list(date))
            .await
    }

    /// Serve `key` from the store while fresh; otherwise run `fetch`, store
    /// the payload if it decodes, and return it.
    ///
    /// Store failures are logged and treated as misses.
    pub async fn get_or_fetch_with<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<CachedList>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let label = format!("documents.json?date={}", key.date);

        match self.store.get(key) {
            Ok(Some(entry)) if entry.is_fresh(Utc::now(), self.ttl) => {
                match DocumentList::from_slice(&entry.payload, &label) {
                    Ok(list) => {
                        debug!(date = %key.date, "document list served from cache");
                        return Ok(CachedList {
                            list,
                            from_cache: true,
                        });
                    }
                    Err(e) => warn!(date = %key.date, error = %e, "discarding unreadable cache entry"),
                }
            }
            Ok(Some(_)) => debug!(date = %key.date, "cache entry expired"),
            Ok(None) => {}
            Err(e) => warn!(date = %key.date, error = %e, "cache read failed, fetching instead"),
        }

        let payload = fetch().await?;
        let list = DocumentList::from_slice(&payload, &label)?;

        let entry = CacheEntry {
            payload,
            retrieved_at: Utc::now(),
        };
        if let Err(e) = self.store.put(key, &entry) {
            warn!(date = %key.date, error = %e, "failed to cache document list");
        }

        Ok(CachedList {
            list,
            from_cache: false,
        })
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<usize> {
        self.store.clear()
    }

    /// Remove entries that outlived the TTL.
    pub fn sweep(&self) -> Result<usize> {
        self.store.sweep_expired(self.ttl, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYLOAD: &[u8] = br#"{"metadata": {"status": "200"}, "results": [
        {"docID": "S100A", "edinetCode": "E00001", "docTypeCode": "120", "periodEnd": "2024-03-31"}
    ]}"#;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 26).unwrap()
    }

    #[test]
    fn test_fingerprint_ignores_order_and_date() {
        let a = QueryFingerprint::of(&[("type", "2"), ("date", "2024-01-01")]);
        let b = QueryFingerprint::of(&[("date", "2025-12-31"), ("type", "2")]);
        let c = QueryFingerprint::of(&[("type", "1")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_entry_freshness() {
        let now = Utc::now();
        let entry = CacheEntry {
            payload: Vec::new(),
            retrieved_at: now - Duration::days(2),
        };
        assert!(entry.is_fresh(now, Duration::days(3)));
        assert!(!entry.is_fresh(now, Duration::days(2)));
        assert!(!entry.is_fresh(now, Duration::zero()));
    }

    #[tokio::test]
    async fn test_disabled_cache_always_fetches() {
        let cache = DocumentListCache::disabled();
        let calls = AtomicUsize::new(0);
        let key = CacheKey::document_list(date());

        for _ in 0..2 {
            let result = cache
                .get_or_fetch_with(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(PAYLOAD.to_vec())
                })
                .await
                .unwrap();
            assert!(!result.from_cache);
            assert_eq!(result.list.results.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_is_propagated() {
        let cache = DocumentListCache::disabled();
        let key = CacheKey::document_list(date());
        let result = cache
            .get_or_fetch_with(&key, || async {
                Err(DataError::TransientNetwork {
                    url: "x".to_string(),
                    reason: "HTTP 503".to_string(),
                })
            })
            .await;
        assert!(matches!(result, Err(DataError::TransientNetwork { .. })));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_second_lookup_within_ttl_hits_store() {
        let cache = DocumentListCache::new(
            Box::new(SqliteStore::in_memory().unwrap()),
            Duration::days(1),
        );
        let calls = AtomicUsize::new(0);
        let key = CacheKey::document_list(date());

        let first = cache
            .get_or_fetch_with(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(PAYLOAD.to_vec())
            })
            .await
            .unwrap();
        let second = cache
            .get_or_fetch_with(&key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(PAYLOAD.to_vec())
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.list.results, second.list.results);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let store = SqliteStore::in_memory().unwrap();
        let key = CacheKey::document_list(date());
        store
            .put(
                &key,
                &CacheEntry {
                    payload: br#"{"metadata": {"status": "200"}, "results": []}"#.to_vec(),
                    retrieved_at: Utc::now() - Duration::days(10),
                },
            )
            .unwrap();

        let cache = DocumentListCache::new(Box::new(store), Duration::days(7));
        let result = cache
            .get_or_fetch_with(&key, || async { Ok(PAYLOAD.to_vec()) })
            .await
            .unwrap();

        assert!(!result.from_cache);
        assert_eq!(result.list.results.len(), 1);

        let stored = cache.store().get(&key).unwrap().unwrap();
        assert_eq!(stored.payload, PAYLOAD);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_malformed_payload_is_not_cached() {
        let cache = DocumentListCache::new(
            Box::new(SqliteStore::in_memory().unwrap()),
            Duration::days(1),
        );
        let key = CacheKey::document_list(date());
        let result = cache
            .get_or_fetch_with(&key, || async { Ok(b"<html></html>".to_vec()) })
            .await;

        assert!(matches!(result, Err(DataError::MalformedResponse { .. })));
        assert!(cache.store().get(&key).unwrap().is_none());
    }
}
