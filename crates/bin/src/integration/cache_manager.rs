//! Cache manager for document lists.
//!
//! Opens the SQLite cache at a platform-specific default location and falls
//! back to running uncached when the database cannot be opened.

use super::config::CacheConfig;
use chrono::Duration;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use yuho::data::cache::{DocumentListCache, DocumentListStore, NoopStore};

/// File name of the cache database inside the cache directory.
pub(crate) const CACHE_FILE: &str = "yuho.db";

/// Get the default cache directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/yuho/`
/// - macOS: `~/Library/Caches/yuho/`
/// - Windows: `%LOCALAPPDATA%\yuho\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yuho")
}

/// Database path inside `dir`.
pub(crate) fn cache_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE)
}

/// Open the cache described by `config`.
///
/// A disabled cache, or one whose database cannot be opened, is backed by a
/// [`NoopStore`]; the run continues without caching.
pub(crate) fn open_cache(config: &CacheConfig) -> DocumentListCache {
    let ttl = Duration::try_days(config.ttl_days.max(0)).unwrap_or(Duration::MAX);
    if !config.use_cache {
        debug!("document-list cache disabled");
        return DocumentListCache::new(Box::new(NoopStore), ttl);
    }

    let store = match open_store(&config.dir) {
        Ok(store) => store,
        Err(e) => {
            warn!(path = %config.dir.display(), error = %e, "cache unavailable, continuing without it");
            Box::new(NoopStore)
        }
    };
    DocumentListCache::new(store, ttl)
}

#[cfg(feature = "sqlite")]
fn open_store(dir: &Path) -> yuho::data::Result<Box<dyn DocumentListStore>> {
    use yuho::data::cache::SqliteStore;

    std::fs::create_dir_all(dir)?;
    let path = cache_path(dir);
    debug!(path = %path.display(), "opening document-list cache");
    Ok(Box::new(SqliteStore::new(&path)?))
}

#[cfg(not(feature = "sqlite"))]
fn open_store(_dir: &Path) -> yuho::data::Result<Box<dyn DocumentListStore>> {
    Ok(Box::new(NoopStore))
}

/// Print cache location and statistics.
pub(crate) fn print_cache_info(cache: &DocumentListCache, dir: &Path) {
    let store = cache.store();
    if !store.is_persistent() {
        println!("  Cache: disabled");
        return;
    }
    println!("  Cache location: {}", cache_path(dir).display());
    match store.stats() {
        Ok(stats) => {
            println!(
                "  Cached lists: {} entries for {} dates ({} bytes)",
                stats.entries, stats.distinct_dates, stats.payload_bytes
            );
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!(
                    "  Retrieved: {} .. {}",
                    oldest.format("%Y-%m-%d %H:%M"),
                    newest.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Err(e) => warn!(error = %e, "failed to read cache statistics"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &Path, use_cache: bool) -> CacheConfig {
        CacheConfig {
            use_cache,
            clear_first: false,
            dir: dir.to_path_buf(),
            ttl_days: 7,
        }
    }

    #[test]
    fn test_default_cache_dir() {
        assert!(default_cache_dir().ends_with("yuho"));
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path(), false);
        config.ttl_days = i64::MAX;
        assert_eq!(open_cache(&config).ttl(), Duration::MAX);
    }

    #[test]
    fn test_disabled_cache_is_not_persistent() {
        let dir = TempDir::new().unwrap();
        let cache = open_cache(&config(dir.path(), false));
        assert!(!cache.store().is_persistent());
        assert!(!cache_path(dir.path()).exists());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_open_cache_creates_database() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        let cache = open_cache(&config(&nested, true));
        assert!(cache.store().is_persistent());
        assert!(cache_path(&nested).exists());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_unopenable_cache_falls_back() {
        let dir = TempDir::new().unwrap();
        // A regular file where the directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let cache = open_cache(&config(&blocker, true));
        assert!(!cache.store().is_persistent());
    }
}
