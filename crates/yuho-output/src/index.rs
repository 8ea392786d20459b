//! Collection manifest and per-filing metadata files.
//!
//! A run rewrites `index.json` and `yuho_latest.json` / `yuho_previous.json`
//! from scratch. A label that is not part of the new selection has its file
//! removed, so the directory never mixes results of two runs. A run that
//! selects nothing removes the manifest altogether.

use crate::atomic::write_json_atomic;
use crate::error::{OutputError, Result};
use crate::layout::{FilerLayout, SELECTION_LABELS, selection_file};
use crate::materialize::{ArtifactFailure, ArtifactRecord, MaterializeReport};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};
use yuho::crawl::{CrawlOutcome, DateFailure};
use yuho::range::DateRange;
use yuho::select::{Preference, Resolution, Selected, SelectionResult};
use yuho_data::edinet::{ArtifactKind, Candidate, DOCUMENT_LIST_TYPE, DocId};

/// Everything a run produced for one filer.
#[derive(Debug, Clone, Copy)]
pub struct Collection<'a> {
    /// Normalized filer code
    pub filer_code: &'a str,
    /// Crawled window
    pub range: DateRange,
    /// Consolidation preference
    pub preference: Preference,
    /// API base URL the lists came from
    pub api_base: &'a str,
    /// Crawl result
    pub crawl: &'a CrawlOutcome,
    /// Selected filings
    pub selection: &'a SelectionResult,
    /// One report per selected filing
    pub reports: &'a [MaterializeReport],
}

/// Reference to the list queries that produced the candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApiQuery {
    /// Endpoint
    pub base: String,
    /// `type` parameter
    #[serde(rename = "type")]
    pub list_type: String,
    /// First day queried
    pub from: NaiveDate,
    /// Last day queried
    pub to: NaiveDate,
}

/// Descriptive fields of a filing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingMeta {
    /// Filer EDINET code
    pub edinet_code: String,
    /// Filer name
    pub filer_name: Option<String>,
    /// Document ID
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    /// Document type code
    pub doc_type_code: String,
    /// Description
    pub doc_description: Option<String>,
    /// `consolidated`, `separate` or `unknown`
    pub consolidated_flag: String,
    /// Period start
    pub period_start: Option<NaiveDate>,
    /// Period end
    pub period_end: Option<NaiveDate>,
    /// Submission time (RFC 3339)
    pub submit_date_time: Option<String>,
    /// Amendment flag as listed
    pub amend_flag: Option<String>,
    /// Parent document of a correction
    #[serde(rename = "parentDocID")]
    pub parent_doc_id: Option<String>,
    /// Withdrawal status as listed
    pub withdrawal_status: Option<String>,
    /// XBRL availability flag as listed
    pub xbrl_flag: Option<String>,
    /// PDF availability flag as listed
    pub pdf_flag: Option<String>,
    /// Attachment availability flag as listed
    pub attach_doc_flag: Option<String>,
    /// Always true: the filing represents its fiscal period
    pub representative_of_period: bool,
}

impl FilingMeta {
    /// Describe a candidate.
    pub fn from_candidate(candidate: &Candidate) -> Self {
        let record = &candidate.record;
        Self {
            edinet_code: candidate.filer_code.clone(),
            filer_name: record.filer_name.clone(),
            doc_id: candidate.doc_id.clone(),
            doc_type_code: candidate.doc_type_code.clone(),
            doc_description: record.doc_description.clone(),
            consolidated_flag: candidate.consolidation.to_string(),
            period_start: candidate.period_start,
            period_end: candidate.period_end,
            submit_date_time: candidate.submitted_at.map(|t| t.to_rfc3339()),
            amend_flag: record.amend_flag.clone(),
            parent_doc_id: record.parent_doc_id.clone(),
            withdrawal_status: record.withdrawal_status.clone(),
            xbrl_flag: record.xbrl_flag.clone(),
            pdf_flag: record.pdf_flag.clone(),
            attach_doc_flag: record.attach_doc_flag.clone(),
            representative_of_period: true,
        }
    }
}

/// Where a filing's files came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingSource {
    /// List queries that surfaced the filing
    pub list_api_query: ListApiQuery,
    /// Persisted artifacts
    pub artifacts: Vec<ArtifactRecord>,
    /// Kinds the API does not provide
    pub unavailable: Vec<ArtifactKind>,
    /// Kinds that failed
    pub failures: Vec<ArtifactFailure>,
}

/// Contents of `yuho_latest.json` / `yuho_previous.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilingMetadata {
    /// Descriptive fields
    pub meta: FilingMeta,
    /// Consolidation resolution applied
    pub resolution: Resolution,
    /// Provenance and artifacts
    pub source: FilingSource,
}

/// Attachment archive hashes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentHashes {
    /// Archive hash
    pub zip: String,
    /// Extracted file hashes by name
    pub files: BTreeMap<String, String>,
}

/// Content hashes of a filing's artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactHashes {
    /// Primary bundle hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    /// Hashes of files extracted from the primary bundle
    pub extracted_files: BTreeMap<String, String>,
    /// PDF hash
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    /// Attachment hashes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<AttachmentHashes>,
}

impl ArtifactHashes {
    /// Collect the hashes of a report.
    pub fn from_report(report: &MaterializeReport) -> Self {
        let files = |record: &ArtifactRecord| {
            record
                .extracted_files
                .iter()
                .map(|f| (f.name.clone(), f.sha256.clone()))
                .collect::<BTreeMap<_, _>>()
        };

        let mut hashes = Self::default();
        for record in &report.records {
            match record.kind {
                ArtifactKind::PrimaryBundle => {
                    hashes.zip = Some(record.sha256.clone());
                    hashes.extracted_files = files(record);
                }
                ArtifactKind::Pdf => hashes.pdf = Some(record.sha256.clone()),
                ArtifactKind::Attachments => {
                    hashes.attachments = Some(AttachmentHashes {
                        zip: record.sha256.clone(),
                        files: files(record),
                    });
                }
            }
        }
        hashes
    }
}

/// One selected filing in `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDocument {
    /// `latest` or `previous`
    pub label: String,
    /// Document ID
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    /// Period start
    pub period_start: Option<NaiveDate>,
    /// Period end
    pub period_end: Option<NaiveDate>,
    /// Submission time (RFC 3339)
    pub submit_date_time: Option<String>,
    /// `consolidated`, `separate` or `unknown`
    pub consolidated_flag: String,
    /// Consolidation resolution applied
    pub resolution: Resolution,
    /// Metadata file name
    pub output: String,
    /// Document directory relative to the filer directory
    pub document_dir: String,
    /// Content hashes
    pub hashes: ArtifactHashes,
    /// Saved paths relative to the filer directory, by artifact kind
    pub paths: BTreeMap<ArtifactKind, String>,
    /// Kinds the API does not provide
    pub unavailable: Vec<ArtifactKind>,
    /// Kinds that failed
    pub failures: Vec<ArtifactFailure>,
}

/// Crawl statistics in `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSummary {
    /// Days attempted
    pub dates_attempted: usize,
    /// Days served from cache
    pub cache_hits: usize,
    /// Candidates found
    pub candidates: usize,
    /// Days that failed
    pub failures: Vec<DateFailure>,
}

/// Contents of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionIndex {
    /// Write time
    pub generated_at: DateTime<Utc>,
    /// Filer EDINET code
    pub edinet_code: String,
    /// First day crawled
    pub from: NaiveDate,
    /// Last day crawled
    pub to: NaiveDate,
    /// Consolidation preference
    pub prefer: Preference,
    /// Selected filings, latest first
    pub documents: Vec<IndexDocument>,
    /// Crawl statistics
    pub crawl: CrawlSummary,
    /// Human-readable notes on anything incomplete
    pub warnings: Vec<String>,
    /// List query reference
    pub list_api_query: ListApiQuery,
}

/// Writes the manifest of a filer directory.
#[derive(Debug, Clone)]
pub struct IndexWriter {
    layout: FilerLayout,
}

impl IndexWriter {
    /// Writer for `layout`.
    pub const fn new(layout: FilerLayout) -> Self {
        Self { layout }
    }

    /// Write the metadata files and `index.json` for `collection`.
    pub fn record(&self, collection: &Collection<'_>) -> Result<CollectionIndex> {
        let list_api_query = ListApiQuery {
            base: format!("{}/documents.json", collection.api_base.trim_end_matches('/')),
            list_type: DOCUMENT_LIST_TYPE.to_string(),
            from: collection.range.start(),
            to: collection.range.end(),
        };

        let mut documents = Vec::new();
        let mut warnings = crawl_warnings(collection.crawl);

        for (label, selected) in collection.selection.iter() {
            let report = collection
                .reports
                .iter()
                .find(|r| r.doc_id == selected.candidate.doc_id);
            let empty;
            let report = match report {
                Some(report) => report,
                None => {
                    empty = MaterializeReport {
                        doc_id: selected.candidate.doc_id.clone(),
                        records: Vec::new(),
                        unavailable: Vec::new(),
                        failures: Vec::new(),
                    };
                    &empty
                }
            };

            warnings.extend(selection_warnings(label, selected, report));

            let output = selection_file(label);
            let metadata = FilingMetadata {
                meta: FilingMeta::from_candidate(&selected.candidate),
                resolution: selected.resolution,
                source: FilingSource {
                    list_api_query: list_api_query.clone(),
                    artifacts: report.records.clone(),
                    unavailable: report.unavailable.clone(),
                    failures: report.failures.clone(),
                },
            };
            write_json_atomic(&self.layout.selection_path(label), &metadata)?;
            debug!(label, doc_id = %selected.candidate.doc_id, "metadata written");

            documents.push(IndexDocument {
                label: label.to_string(),
                doc_id: selected.candidate.doc_id.clone(),
                period_start: metadata.meta.period_start,
                period_end: metadata.meta.period_end,
                submit_date_time: metadata.meta.submit_date_time.clone(),
                consolidated_flag: metadata.meta.consolidated_flag.clone(),
                resolution: selected.resolution,
                output,
                document_dir: self
                    .layout
                    .relative(&self.layout.document_dir(&selected.candidate.doc_id)),
                hashes: ArtifactHashes::from_report(report),
                paths: report
                    .records
                    .iter()
                    .map(|r| (r.kind, r.saved.clone()))
                    .collect(),
                unavailable: report.unavailable.clone(),
                failures: report.failures.clone(),
            });
        }

        self.remove_stale(&documents)?;

        let index = CollectionIndex {
            generated_at: Utc::now(),
            edinet_code: collection.filer_code.to_string(),
            from: collection.range.start(),
            to: collection.range.end(),
            prefer: collection.preference,
            documents,
            crawl: CrawlSummary {
                dates_attempted: collection.crawl.dates_attempted,
                cache_hits: collection.crawl.cache_hits,
                candidates: collection.crawl.candidates.len(),
                failures: collection.crawl.failures.clone(),
            },
            warnings,
            list_api_query,
        };
        write_json_atomic(&self.layout.index_path(), &index)?;
        info!(
            path = %self.layout.index_path().display(),
            documents = index.documents.len(),
            warnings = index.warnings.len(),
            "index written"
        );
        Ok(index)
    }

    /// Remove `index.json` and every selection file left by an earlier run.
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in SELECTION_LABELS
            .iter()
            .map(|label| self.layout.selection_path(label))
            .chain([self.layout.index_path()])
        {
            if remove_if_present(&path)? {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(root = %self.layout.root().display(), removed, "removed manifest of an earlier run");
        }
        Ok(removed)
    }

    fn remove_stale(&self, documents: &[IndexDocument]) -> Result<()> {
        for label in SELECTION_LABELS {
            if documents.iter().any(|d| d.label == label) {
                continue;
            }
            remove_if_present(&self.layout.selection_path(label))?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale metadata");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OutputError::io(path, e)),
    }
}

fn crawl_warnings(crawl: &CrawlOutcome) -> Vec<String> {
    if crawl.failures.is_empty() {
        return Vec::new();
    }
    let days: Vec<String> = crawl.failures.iter().map(|f| f.date.to_string()).collect();
    vec![format!(
        "{} list day(s) could not be fetched; the selection may be incomplete: {}",
        days.len(),
        days.join(", ")
    )]
}

fn selection_warnings(label: &str, selected: &Selected, report: &MaterializeReport) -> Vec<String> {
    let doc_id = &selected.candidate.doc_id;
    let resolution = &selected.resolution;
    let mut warnings = Vec::new();

    if resolution.fallback {
        warnings.push(format!(
            "{label} ({doc_id}): no {} filing for {}, used {}",
            resolution.preferred, selected.period, resolution.chosen
        ));
    }
    if resolution.withdrawn_only {
        warnings.push(format!(
            "{label} ({doc_id}): only withdrawn filings exist for {}",
            selected.period
        ));
    }
    for failure in &report.failures {
        warnings.push(format!(
            "{label} ({doc_id}): {:?} artifact failed: {}",
            failure.kind, failure.error
        ));
    }
    for record in &report.records {
        if let crate::materialize::Extraction::Skipped { reason } = &record.extraction {
            warnings.push(format!(
                "{label} ({doc_id}): {} kept without extraction: {reason}",
                record.saved
            ));
        }
    }
    warnings
}
