//! Fetch pipeline: crawl, select, download and index one filer.
//!
//! Day failures and per-artifact failures are recorded and the run goes on;
//! authentication failures and filesystem errors on the output tree abort it.

use super::config::FetchConfig;
use indicatif::ProgressBar;
use tracing::{info, warn};
use yuho::data::cache::DocumentListCache;
use yuho::data::{ArtifactSource, DataError, ListFetcher};
use yuho::{CrawlOutcome, Crawler, DateStatus, SelectionResult, Selector};
use yuho_output::{Collection, CollectionIndex, FilerLayout, IndexWriter, Materializer, OutputError};

/// Error type for fetch pipeline operations.
#[derive(Debug, thiserror::Error)]
pub(crate) enum FetchPipelineError {
    /// Crawl or API error.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Download, extraction or index error.
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// What a fetch run produced.
#[derive(Debug)]
pub(crate) enum FetchOutcome {
    /// Metadata and `index.json` were written.
    Written {
        /// Crawl statistics and failures.
        crawl: CrawlOutcome,
        /// Manifest as written.
        index: Box<CollectionIndex>,
    },
    /// No annual report matched; nothing was written and the manifest of an
    /// earlier run was removed.
    NoFilings {
        /// Crawl statistics and failures.
        crawl: CrawlOutcome,
    },
}

/// Run the pipeline for `config`.
///
/// `lists` serves the daily document lists and `artifacts` the downloads;
/// both are normally the same [`yuho::data::EdinetClient`].
pub(crate) async fn run_fetch(
    config: &FetchConfig,
    cache: &DocumentListCache,
    lists: &dyn ListFetcher,
    artifacts: &dyn ArtifactSource,
    progress: Option<&ProgressBar>,
) -> Result<FetchOutcome, FetchPipelineError> {
    if config.cache.clear_first {
        let removed = cache.clear()?;
        info!(removed, "cleared document-list cache");
    }

    let crawler = Crawler::new(cache, lists).with_concurrency(config.concurrency);
    let crawl = crawler
        .crawl_with_progress(&config.filer_code, config.range, |date, status| {
            if let Some(pb) = progress {
                pb.inc(1);
                match status {
                    DateStatus::Fetched { matches, .. } if matches > 0 => {
                        pb.set_message(format!("{date}: {matches} match(es)"));
                    }
                    DateStatus::Failed => pb.set_message(format!("{date}: failed")),
                    DateStatus::Fetched { .. } => pb.set_message(date.to_string()),
                }
            }
        })
        .await?;
    if !crawl.failures.is_empty() {
        warn!(failed = crawl.failures.len(), "some list days could not be fetched");
    }

    let selection = Selector::new(config.preference)
        .for_filer(config.filer_code.as_str())
        .select(&crawl.candidates);
    let layout = FilerLayout::new(&config.outdir, &config.filer_code);
    if selection.is_empty() {
        info!(filer = %config.filer_code, "no annual reports in range");
        IndexWriter::new(layout).clear()?;
        return Ok(FetchOutcome::NoFilings { crawl });
    }

    let reports = download_selected(config, artifacts, &layout, &selection).await?;

    let index = IndexWriter::new(layout).record(&Collection {
        filer_code: &config.filer_code,
        range: config.range,
        preference: config.preference,
        api_base: &config.api_base,
        crawl: &crawl,
        selection: &selection,
        reports: &reports,
    })?;

    Ok(FetchOutcome::Written {
        crawl,
        index: Box::new(index),
    })
}

async fn download_selected(
    config: &FetchConfig,
    artifacts: &dyn ArtifactSource,
    layout: &FilerLayout,
    selection: &SelectionResult,
) -> Result<Vec<yuho_output::MaterializeReport>, OutputError> {
    let materializer = Materializer::new(artifacts, layout.clone()).with_overwrite(config.overwrite);
    let mut reports = Vec::new();
    for (label, selected) in selection.iter() {
        info!(label, doc_id = %selected.candidate.doc_id, period = %selected.period, "downloading filing");
        reports.push(materializer.materialize(&selected.candidate.doc_id).await?);
    }
    Ok(reports)
}

/// Print a human-readable summary of `outcome`.
pub(crate) fn print_summary(config: &FetchConfig, outcome: &FetchOutcome) {
    let crawl = match outcome {
        FetchOutcome::Written { crawl, .. } | FetchOutcome::NoFilings { crawl } => crawl,
    };
    println!(
        "Crawled {} day(s) for {} ({}), {} from cache, {} failed",
        crawl.dates_attempted,
        config.filer_code,
        config.range,
        crawl.cache_hits,
        crawl.failures.len()
    );

    match outcome {
        FetchOutcome::NoFilings { .. } => {
            println!("no filings found for {} in {}", config.filer_code, config.range);
        }
        FetchOutcome::Written { index, .. } => {
            for doc in &index.documents {
                let period = doc
                    .period_end
                    .map_or_else(|| "-".to_string(), |d| d.to_string());
                println!(
                    "  {:<8} {}  period end {}  {}{}",
                    doc.label,
                    doc.doc_id,
                    period,
                    doc.resolution.chosen,
                    if doc.resolution.fallback { " (fallback)" } else { "" }
                );
            }
            for warning in &index.warnings {
                println!("  warning: {warning}");
            }
            let layout = FilerLayout::new(&config.outdir, &config.filer_code);
            println!("Index written to {}", layout.index_path().display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::config::CacheConfig;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::path::Path;
    use tempfile::TempDir;
    use yuho::data::{ArtifactKind, DocId};
    use yuho::{DateRange, Preference};

    const LIST: &str = r#"{"metadata": {"status": "200"}, "results": [
        {"docID": "S100NEW", "edinetCode": "E02144", "docTypeCode": "120",
         "periodStart": "2023-04-01", "periodEnd": "2024-03-31",
         "submitDateTime": "2024-06-20 09:00", "withdrawalStatus": "0"},
        {"docID": "S100OLD", "edinetCode": "E02144", "docTypeCode": "120",
         "periodStart": "2022-04-01", "periodEnd": "2023-03-31",
         "submitDateTime": "2023-06-20 09:00", "withdrawalStatus": "0"},
        {"docID": "S100XYZ", "edinetCode": "E99999", "docTypeCode": "120",
         "periodEnd": "2024-03-31"}
    ]}"#;

    #[derive(Debug)]
    struct Fixture {
        list: &'static str,
        auth_error: bool,
    }

    #[async_trait]
    impl ListFetcher for Fixture {
        async fn fetch_document_list(&self, _date: NaiveDate) -> yuho::data::Result<Vec<u8>> {
            if self.auth_error {
                return Err(DataError::Auth {
                    status: 401,
                    message: "Access denied".into(),
                });
            }
            Ok(self.list.as_bytes().to_vec())
        }
    }

    #[async_trait]
    impl ArtifactSource for Fixture {
        async fn fetch_artifact(
            &self,
            _doc_id: &DocId,
            kind: ArtifactKind,
        ) -> yuho::data::Result<Option<Vec<u8>>> {
            Ok(match kind {
                ArtifactKind::Pdf => Some(b"%PDF-1.7".to_vec()),
                _ => None,
            })
        }

        fn artifact_url(&self, doc_id: &DocId, kind: ArtifactKind) -> String {
            format!("https://example.test/documents/{doc_id}?type={}", kind.code())
        }
    }

    fn config(outdir: &Path) -> FetchConfig {
        FetchConfig {
            filer_code: "E02144".into(),
            range: DateRange::new(
                NaiveDate::from_ymd_opt(2024, 6, 18).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 20).unwrap(),
            )
            .unwrap(),
            preference: Preference::Consolidated,
            outdir: outdir.to_path_buf(),
            cache: CacheConfig {
                use_cache: false,
                clear_first: false,
                dir: outdir.join("cache"),
                ttl_days: 7,
            },
            concurrency: 2,
            overwrite: false,
            api_base: "https://example.test/api/v2".into(),
        }
    }

    #[tokio::test]
    async fn test_run_fetch_writes_index() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let fixture = Fixture {
            list: LIST,
            auth_error: false,
        };
        let cache = DocumentListCache::disabled();

        let outcome = run_fetch(&config, &cache, &fixture, &fixture, None).await.unwrap();
        let FetchOutcome::Written { crawl, index } = outcome else {
            panic!("expected written outcome");
        };
        assert_eq!(crawl.dates_attempted, 3);
        assert_eq!(crawl.candidates.len(), 2);
        assert_eq!(index.documents.len(), 2);
        assert_eq!(index.documents[0].label, "latest");
        assert_eq!(index.documents[0].doc_id.as_str(), "S100NEW");
        assert_eq!(index.documents[1].doc_id.as_str(), "S100OLD");

        let root = dir.path().join("E02144");
        assert!(root.join("index.json").exists());
        assert!(root.join("yuho_latest.json").exists());
        assert!(root.join("S100NEW/document.pdf").exists());
    }

    #[tokio::test]
    async fn test_run_fetch_without_filings_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let fixture = Fixture {
            list: r#"{"metadata": {"status": "200"}, "results": []}"#,
            auth_error: false,
        };
        let cache = DocumentListCache::disabled();

        let outcome = run_fetch(&config, &cache, &fixture, &fixture, None).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NoFilings { .. }));
        assert!(!dir.path().join("E02144").exists());
    }

    #[tokio::test]
    async fn test_run_fetch_without_filings_removes_old_manifest() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let cache = DocumentListCache::disabled();
        let found = Fixture {
            list: LIST,
            auth_error: false,
        };
        run_fetch(&config, &cache, &found, &found, None).await.unwrap();

        let empty = Fixture {
            list: r#"{"metadata": {"status": "200"}, "results": []}"#,
            auth_error: false,
        };
        let outcome = run_fetch(&config, &cache, &empty, &empty, None).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NoFilings { .. }));

        let root = dir.path().join("E02144");
        assert!(!root.join("index.json").exists());
        assert!(!root.join("yuho_latest.json").exists());
        assert!(!root.join("yuho_previous.json").exists());
        assert!(root.join("S100NEW/document.pdf").exists());
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_clear_first_empties_cache_before_crawl() {
        use crate::integration::cache_manager::open_cache;
        use chrono::Utc;
        use yuho::data::cache::{CacheEntry, CacheKey};

        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.cache.use_cache = true;
        config.cache.clear_first = true;
        let cache = open_cache(&config.cache);
        assert!(cache.store().is_persistent());

        // Fresh but empty lists: served as-is they would yield no filings.
        let seeded = CacheEntry {
            payload: br#"{"metadata": {"status": "200"}, "results": []}"#.to_vec(),
            retrieved_at: Utc::now(),
        };
        let outside = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
        for date in config.range.days().chain([outside]) {
            cache.store().put(&CacheKey::document_list(date), &seeded).unwrap();
        }
        assert_eq!(cache.store().stats().unwrap().entries, 4);

        let fixture = Fixture {
            list: LIST,
            auth_error: false,
        };
        let outcome = run_fetch(&config, &cache, &fixture, &fixture, None).await.unwrap();
        let FetchOutcome::Written { crawl, index } = outcome else {
            panic!("expected written outcome");
        };
        assert_eq!(crawl.cache_hits, 0);
        assert_eq!(index.documents.len(), 2);

        let stats = cache.store().stats().unwrap();
        assert_eq!(stats.entries, 3);
        assert!(cache.store().get(&CacheKey::document_list(outside)).unwrap().is_none());
        let refilled = cache
            .store()
            .get(&CacheKey::document_list(config.range.start()))
            .unwrap()
            .unwrap();
        assert_eq!(refilled.payload, LIST.as_bytes());
    }

    #[tokio::test]
    async fn test_run_fetch_auth_failure_aborts() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let fixture = Fixture {
            list: LIST,
            auth_error: true,
        };
        let cache = DocumentListCache::disabled();

        let err = run_fetch(&config, &cache, &fixture, &fixture, None).await.unwrap_err();
        assert!(matches!(err, FetchPipelineError::Data(DataError::Auth { .. })));
        assert!(!dir.path().join("E02144").exists());
    }
}
