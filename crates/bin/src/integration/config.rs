//! Run configuration resolved from flags and the environment.

use std::path::PathBuf;
use yuho::{DateRange, Preference};
use yuho::data::DataError;

/// Environment variable holding the EDINET subscription key.
pub(crate) const API_KEY_VAR: &str = "APIKEY";

/// Default output root.
pub(crate) const DEFAULT_OUTDIR: &str = "data/edinet";

/// Upper bound accepted for `--cache-ttl`, in days.
pub(crate) const MAX_TTL_DAYS: i64 = 36_500;

/// Cache behaviour for a run.
#[derive(Debug, Clone)]
pub(crate) struct CacheConfig {
    /// Whether to read and write the persistent cache.
    pub use_cache: bool,
    /// Drop every cached list before crawling.
    pub clear_first: bool,
    /// Directory holding the cache database.
    pub dir: PathBuf,
    /// Days before a cached list is refetched.
    pub ttl_days: i64,
}

/// Everything a `fetch` run needs.
#[derive(Debug, Clone)]
pub(crate) struct FetchConfig {
    /// Normalized filer code, e.g. `E02144`.
    pub filer_code: String,
    /// Inclusive submission-date window.
    pub range: DateRange,
    /// Preferred consolidation variant.
    pub preference: Preference,
    /// Output root; the filer directory is created below it.
    pub outdir: PathBuf,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Concurrent document-list requests.
    pub concurrency: usize,
    /// Redownload artifacts that already exist on disk.
    pub overwrite: bool,
    /// EDINET API base URL.
    pub api_base: String,
}

/// Uppercase and validate a filer code: `E` followed by five digits.
pub(crate) fn normalize_filer_code(raw: &str) -> Result<String, DataError> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = code.len() == 6
        && code.starts_with('E')
        && code[1..].bytes().all(|b| b.is_ascii_digit());
    if valid {
        Ok(code)
    } else {
        Err(DataError::InvalidFilerCode(raw.to_string()))
    }
}

/// Read the subscription key from the environment. `.env` is loaded by `main`
/// before this runs.
pub(crate) fn load_api_key() -> Result<String, DataError> {
    match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(DataError::MissingApiKey),
    }
}
