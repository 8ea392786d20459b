//! Download, persist and extract the artifacts of a selected filing.
//!
//! Each artifact kind is requested in turn. A kind the API does not have for
//! the document is recorded as unavailable; a kind that fails after retries
//! is recorded as failed and the remaining kinds continue. Archives are kept
//! as downloaded and extracted next to themselves; an archive that cannot be
//! read is kept without extraction and any earlier extraction is removed.

use crate::atomic::{replace_dir, staging_dir_for, write_atomic};
use crate::error::{OutputError, Result};
use crate::layout::{FilerLayout, relative_to};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use yuho_data::edinet::{ArtifactKind, ArtifactSource, DocId};

/// Largest archive entry that will be extracted.
pub const MAX_ENTRY_BYTES: u64 = 512 * 1024 * 1024;

/// `sha256:<hex>` digest of `bytes`.
pub fn sha256_tag(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

/// A file written out of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFile {
    /// Path inside the extraction directory, `/`-separated
    pub name: String,
    /// `sha256:<hex>` of the content
    pub sha256: String,
    /// Size in bytes
    pub size: u64,
}

/// What happened when extracting an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Extraction {
    /// The artifact is not an archive
    NotArchive,
    /// Extracted into the artifact's `files/` directory
    Extracted,
    /// The archive was kept but could not be extracted
    Skipped {
        /// Why extraction was skipped
        reason: String,
    },
}

/// One persisted artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Document ID
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// API `type` code
    #[serde(rename = "type")]
    pub type_code: u8,
    /// Download URL without credentials
    pub url: String,
    /// Absolute or outdir-relative path on disk
    #[serde(skip)]
    pub path: PathBuf,
    /// Path relative to the filer directory
    pub saved: String,
    /// `sha256:<hex>` of the saved file
    pub sha256: String,
    /// Size in bytes
    pub size: u64,
    /// Taken from disk instead of downloaded
    pub reused: bool,
    /// Extraction directory relative to the filer directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_dir: Option<String>,
    /// Extraction outcome
    pub extraction: Extraction,
    /// Extracted files, ordered by name
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extracted_files: Vec<ExtractedFile>,
}

/// An artifact that could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFailure {
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Error after retries
    pub error: String,
}

/// Everything materialized for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterializeReport {
    /// Document ID
    #[serde(rename = "docID")]
    pub doc_id: DocId,
    /// Persisted artifacts, in kind order
    pub records: Vec<ArtifactRecord>,
    /// Kinds the API does not provide for this document
    pub unavailable: Vec<ArtifactKind>,
    /// Kinds that failed
    pub failures: Vec<ArtifactFailure>,
}

impl MaterializeReport {
    /// The record of one kind, if it was persisted.
    pub fn record(&self, kind: ArtifactKind) -> Option<&ArtifactRecord> {
        self.records.iter().find(|r| r.kind == kind)
    }

    /// Whether no artifact failed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Writes artifacts of documents into a [`FilerLayout`].
pub struct Materializer<'a> {
    source: &'a dyn ArtifactSource,
    layout: FilerLayout,
    overwrite: bool,
}

impl<'a> Materializer<'a> {
    /// Materialize into `layout`, downloading from `source`.
    pub fn new(source: &'a dyn ArtifactSource, layout: FilerLayout) -> Self {
        Self {
            source,
            layout,
            overwrite: false,
        }
    }

    /// Re-download artifacts that already exist on disk.
    pub const fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Target layout.
    pub const fn layout(&self) -> &FilerLayout {
        &self.layout
    }

    /// Materialize every artifact kind of `doc_id`.
    ///
    /// # Errors
    /// Only fatal errors (authentication) are returned; everything else is
    /// recorded in the report.
    pub async fn materialize(&self, doc_id: &DocId) -> Result<MaterializeReport> {
        let mut report = MaterializeReport {
            doc_id: doc_id.clone(),
            records: Vec::new(),
            unavailable: Vec::new(),
            failures: Vec::new(),
        };

        for kind in ArtifactKind::ALL {
            match self.materialize_one(doc_id, kind).await {
                Ok(Some(record)) => report.records.push(record),
                Ok(None) => {
                    debug!(%doc_id, ?kind, "artifact not available");
                    report.unavailable.push(kind);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(%doc_id, ?kind, error = %e, "artifact failed, continuing");
                    report.failures.push(ArtifactFailure {
                        kind,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            %doc_id,
            saved = report.records.len(),
            unavailable = report.unavailable.len(),
            failed = report.failures.len(),
            "document materialized"
        );
        Ok(report)
    }

    async fn materialize_one(&self, doc_id: &DocId, kind: ArtifactKind) -> Result<Option<ArtifactRecord>> {
        let path = self.layout.artifact_path(doc_id, kind);
        let reused = !self.overwrite && path.is_file();

        let bytes = if reused {
            debug!(path = %path.display(), "reusing artifact on disk");
            fs::read(&path).map_err(|e| OutputError::io(&path, e))?
        } else {
            let Some(bytes) = self.source.fetch_artifact(doc_id, kind).await? else {
                return Ok(None);
            };
            write_atomic(&path, &bytes)?;
            bytes
        };

        let extract_dir = self.layout.extract_dir(doc_id, kind);
        let (extraction, extracted_files) = match &extract_dir {
            None => (Extraction::NotArchive, Vec::new()),
            Some(dir) if reused => reuse_or_extract(&bytes, dir),
            Some(dir) => extract_or_skip(&bytes, dir),
        };

        Ok(Some(ArtifactRecord {
            doc_id: doc_id.clone(),
            kind,
            type_code: kind.code(),
            url: self.source.artifact_url(doc_id, kind),
            saved: self.layout.relative(&path),
            sha256: sha256_tag(&bytes),
            size: bytes.len() as u64,
            reused,
            extracted_dir: extract_dir.as_deref().map(|d| self.layout.relative(d)),
            extraction,
            extracted_files,
            path,
        }))
    }
}

impl std::fmt::Debug for Materializer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Materializer")
            .field("layout", &self.layout)
            .field("overwrite", &self.overwrite)
            .finish_non_exhaustive()
    }
}

/// Keep an extracted tree whose files match the archive, else extract again.
fn reuse_or_extract(bytes: &[u8], dir: &Path) -> (Extraction, Vec<ExtractedFile>) {
    if dir.is_dir()
        && let Ok(expected) = archive_listing(bytes, dir)
        && hash_tree(dir).is_ok_and(|found| found == expected)
    {
        debug!(dir = %dir.display(), "extracted tree matches archive");
        return (Extraction::Extracted, expected);
    }
    extract_or_skip(bytes, dir)
}

fn extract_or_skip(bytes: &[u8], dir: &Path) -> (Extraction, Vec<ExtractedFile>) {
    match extract_archive(bytes, dir) {
        Ok(files) => (Extraction::Extracted, files),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "archive kept without extraction");
            // A tree from an earlier archive no longer describes this one.
            if dir.exists()
                && let Err(err) = fs::remove_dir_all(dir)
            {
                warn!(dir = %dir.display(), error = %err, "failed to remove stale extraction");
            }
            (
                Extraction::Skipped {
                    reason: e.to_string(),
                },
                Vec::new(),
            )
        }
    }
}

/// Read every safe file entry of a ZIP archive, handing each to `sink`.
///
/// Entries are read into memory one at a time and may not exceed
/// [`MAX_ENTRY_BYTES`], whatever size their headers declare.
fn for_each_entry(
    bytes: &[u8],
    target: &Path,
    mut sink: impl FnMut(&Path, &[u8]) -> Result<()>,
) -> Result<Vec<ExtractedFile>> {
    let corrupt = |reason: String| OutputError::ArchiveExtraction {
        path: target.to_path_buf(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(e.to_string()))?;
    let mut files: BTreeMap<String, ExtractedFile> = BTreeMap::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry outside the target directory");
            continue;
        };
        let name = relative_to(Path::new(""), &relative);

        if entry.size() > MAX_ENTRY_BYTES {
            return Err(corrupt(format!(
                "{name}: declared size {} exceeds {MAX_ENTRY_BYTES} bytes",
                entry.size()
            )));
        }
        let mut content = Vec::new();
        entry
            .by_ref()
            .take(MAX_ENTRY_BYTES + 1)
            .read_to_end(&mut content)
            .map_err(|e| corrupt(format!("{name}: {e}")))?;
        if content.len() as u64 > MAX_ENTRY_BYTES {
            return Err(corrupt(format!("{name}: exceeds {MAX_ENTRY_BYTES} bytes")));
        }

        sink(relative.as_path(), content.as_slice())?;
        files.insert(
            name.clone(),
            ExtractedFile {
                name,
                sha256: sha256_tag(&content),
                size: content.len() as u64,
            },
        );
    }

    Ok(files.into_values().collect())
}

/// Extract a ZIP archive into `target`, replacing its previous contents.
///
/// The tree is built in a staging directory and swapped in only once every
/// entry was written. Entries whose names would escape `target` are skipped.
pub fn extract_archive(bytes: &[u8], target: &Path) -> Result<Vec<ExtractedFile>> {
    let staging = staging_dir_for(target)?;
    let files = for_each_entry(bytes, target, |relative, content| {
        let dest = staging.path().join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| OutputError::io(parent, e))?;
        }
        fs::write(&dest, content).map_err(|e| OutputError::io(&dest, e))
    })?;

    replace_dir(staging, target)?;
    debug!(target = %target.display(), files = files.len(), "archive extracted");
    Ok(files)
}

/// The files `extract_archive` would write for `bytes`, without writing them.
pub fn archive_listing(bytes: &[u8], target: &Path) -> Result<Vec<ExtractedFile>> {
    for_each_entry(bytes, target, |_, _| Ok(()))
}

/// Hash every file below `dir`, ordered by relative name.
pub fn hash_tree(dir: &Path) -> Result<Vec<ExtractedFile>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            OutputError::io(path, std::io::Error::other(e))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let content = fs::read(entry.path()).map_err(|e| OutputError::io(entry.path(), e))?;
        files.push(ExtractedFile {
            name: relative_to(dir, entry.path()),
            sha256: sha256_tag(&content),
            size: content.len() as u64,
        });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}
