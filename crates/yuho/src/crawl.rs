//! Day-by-day crawl of document lists.
//!
//! Each day of a [`DateRange`] is looked up through the [`DocumentListCache`]
//! and filtered to one filer and document type. Per-day requests run on a
//! bounded pool; results are folded into a [`CrawlOutcome`] regardless of the
//! order they complete in.

use crate::range::DateRange;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use yuho_data::cache::DocumentListCache;
use yuho_data::edinet::{Candidate, DOC_TYPE_YUHO, DocId, ListFetcher};
use yuho_data::Result;

/// Default number of in-flight list requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// A day whose list could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DateFailure {
    /// The day
    pub date: NaiveDate,
    /// Error after the retry budget was spent
    pub error: String,
}

/// What happened to one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStatus {
    /// The list was obtained
    Fetched {
        /// Matching candidates on that day
        matches: usize,
        /// Served without a network call
        from_cache: bool,
    },
    /// The list could not be obtained
    Failed,
}

/// Result of a crawl.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutcome {
    /// Matching candidates, unique by document ID and ordered by it
    pub candidates: Vec<Candidate>,
    /// Days that failed, ordered by date
    pub failures: Vec<DateFailure>,
    /// Number of days attempted
    pub dates_attempted: usize,
    /// Number of days served from cache
    pub cache_hits: usize,
}

impl CrawlOutcome {
    /// Combine the outcomes of two crawls, `other` covering the later days.
    ///
    /// A document seen by both keeps `other`'s record.
    pub fn merge(self, other: Self) -> Self {
        let mut by_id: BTreeMap<DocId, Candidate> = BTreeMap::new();
        for candidate in self.candidates.into_iter().chain(other.candidates) {
            by_id.insert(candidate.doc_id.clone(), candidate);
        }

        let mut failures = self.failures;
        failures.extend(other.failures);
        failures.sort_by_key(|f| f.date);

        Self {
            candidates: by_id.into_values().collect(),
            failures,
            dates_attempted: self.dates_attempted + other.dates_attempted,
            cache_hits: self.cache_hits + other.cache_hits,
        }
    }

    /// Whether every day was obtained.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Crawls a date range for one filer's documents.
pub struct Crawler<'a> {
    cache: &'a DocumentListCache,
    fetcher: &'a dyn ListFetcher,
    concurrency: usize,
    doc_type_code: String,
}

impl<'a> Crawler<'a> {
    /// Crawl annual reports through `cache`, fetching misses with `fetcher`.
    pub fn new(cache: &'a DocumentListCache, fetcher: &'a dyn ListFetcher) -> Self {
        Self {
            cache,
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            doc_type_code: DOC_TYPE_YUHO.to_string(),
        }
    }

    /// Maximum in-flight list requests (at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Document type to collect instead of annual reports.
    pub fn with_doc_type(mut self, doc_type_code: impl Into<String>) -> Self {
        self.doc_type_code = doc_type_code.into();
        self
    }

    /// Crawl without progress reporting.
    pub async fn crawl(&self, filer_code: &str, range: DateRange) -> Result<CrawlOutcome> {
        self.crawl_with_progress(filer_code, range, |_, _| {}).await
    }

    /// Crawl every day of `range`, calling `on_date` once per attempted day.
    ///
    /// # Errors
    /// Only fatal errors (authentication) abort the crawl; any other failure
    /// is recorded in [`CrawlOutcome::failures`].
    pub async fn crawl_with_progress<F>(
        &self,
        filer_code: &str,
        range: DateRange,
        mut on_date: F,
    ) -> Result<CrawlOutcome>
    where
        F: FnMut(NaiveDate, DateStatus),
    {
        info!(filer = filer_code, %range, days = range.len_days(), "crawling document lists");

        let mut results = stream::iter(range.days())
            .map(|date| async move { (date, self.cache.get_or_fetch(date, self.fetcher).await) })
            .buffer_unordered(self.concurrency);

        // Keep the sighting from the latest list day so the fold is order independent.
        let mut seen: BTreeMap<DocId, (NaiveDate, Candidate)> = BTreeMap::new();
        let mut outcome = CrawlOutcome::default();

        while let Some((date, result)) = results.next().await {
            outcome.dates_attempted += 1;
            match result {
                Ok(cached) => {
                    if cached.from_cache {
                        outcome.cache_hits += 1;
                    }
                    let matches = cached.list.candidates_for(filer_code, &self.doc_type_code);
                    let count = matches.len();
                    if count > 0 {
                        debug!(%date, count, "found candidates");
                    }
                    for candidate in matches {
                        match seen.get(&candidate.doc_id) {
                            Some((seen_on, _)) if *seen_on >= date => {}
                            _ => {
                                seen.insert(candidate.doc_id.clone(), (date, candidate));
                            }
                        }
                    }
                    on_date(
                        date,
                        DateStatus::Fetched {
                            matches: count,
                            from_cache: cached.from_cache,
                        },
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%date, error = %e, "document list unavailable, continuing");
                    outcome.failures.push(DateFailure {
                        date,
                        error: e.to_string(),
                    });
                    on_date(date, DateStatus::Failed);
                }
            }
        }

        outcome.failures.sort_by_key(|f| f.date);
        outcome.candidates = seen.into_values().map(|(_, c)| c).collect();

        info!(
            candidates = outcome.candidates.len(),
            failed_days = outcome.failures.len(),
            cache_hits = outcome.cache_hits,
            "crawl finished"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for Crawler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crawler")
            .field("cache", &self.cache)
            .field("concurrency", &self.concurrency)
            .field("doc_type_code", &self.doc_type_code)
            .finish_non_exhaustive()
    }
}
