//! On-disk layout of a filer's archive.
//!
//! ```text
//! <outdir>/<filer>/
//!   index.json
//!   yuho_latest.json
//!   yuho_previous.json
//!   <docID>/
//!     type1/document.zip
//!     type1/files/...
//!     document.pdf
//!     attachments/attachments.zip
//!     attachments/files/...
//! ```

use std::path::{Path, PathBuf};
use yuho_data::edinet::{ArtifactKind, DocId};

/// Name of the collection manifest.
pub const INDEX_FILE: &str = "index.json";

/// Labels of the per-filing metadata files, newest first.
pub const SELECTION_LABELS: [&str; 2] = ["latest", "previous"];

/// Where an artifact kind lives inside a document directory.
const fn artifact_file(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::PrimaryBundle => "type1/document.zip",
        ArtifactKind::Pdf => "document.pdf",
        ArtifactKind::Attachments => "attachments/attachments.zip",
    }
}

const fn extract_dir(kind: ArtifactKind) -> Option<&'static str> {
    match kind {
        ArtifactKind::PrimaryBundle => Some("type1/files"),
        ArtifactKind::Pdf => None,
        ArtifactKind::Attachments => Some("attachments/files"),
    }
}

/// Paths below `<outdir>/<filer>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilerLayout {
    root: PathBuf,
}

impl FilerLayout {
    /// Layout for `filer_code` under `outdir`.
    pub fn new(outdir: impl AsRef<Path>, filer_code: &str) -> Self {
        Self {
            root: outdir.as_ref().join(filer_code),
        }
    }

    /// `<outdir>/<filer>`
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `index.json`
    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// `yuho_<label>.json`
    pub fn selection_path(&self, label: &str) -> PathBuf {
        self.root.join(selection_file(label))
    }

    /// Per-document directory.
    pub fn document_dir(&self, doc_id: &DocId) -> PathBuf {
        self.root.join(doc_id.as_str())
    }

    /// Saved artifact file.
    pub fn artifact_path(&self, doc_id: &DocId, kind: ArtifactKind) -> PathBuf {
        self.document_dir(doc_id).join(artifact_file(kind))
    }

    /// Extraction directory, for archive kinds.
    pub fn extract_dir(&self, doc_id: &DocId, kind: ArtifactKind) -> Option<PathBuf> {
        extract_dir(kind).map(|dir| self.document_dir(doc_id).join(dir))
    }

    /// `path` relative to the filer root with `/` separators, as written to
    /// the metadata files.
    pub fn relative(&self, path: &Path) -> String {
        relative_to(&self.root, path)
    }
}

/// File name of a selection label.
pub fn selection_file(label: &str) -> String {
    format!("yuho_{label}.json")
}

/// `path` relative to `base` with `/` separators; `path` itself when it is
/// not below `base`.
pub fn relative_to(base: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = FilerLayout::new("data/edinet", "E02144");
        let doc = DocId::new("S100TEST");

        assert_eq!(layout.index_path(), Path::new("data/edinet/E02144/index.json"));
        assert_eq!(
            layout.selection_path("latest"),
            Path::new("data/edinet/E02144/yuho_latest.json")
        );
        assert_eq!(
            layout.artifact_path(&doc, ArtifactKind::PrimaryBundle),
            Path::new("data/edinet/E02144/S100TEST/type1/document.zip")
        );
        assert_eq!(
            layout.artifact_path(&doc, ArtifactKind::Pdf),
            Path::new("data/edinet/E02144/S100TEST/document.pdf")
        );
        assert_eq!(
            layout.extract_dir(&doc, ArtifactKind::Attachments),
            Some(PathBuf::from("data/edinet/E02144/S100TEST/attachments/files"))
        );
        assert!(layout.extract_dir(&doc, ArtifactKind::Pdf).is_none());
    }

    #[test]
    fn test_relative() {
        let layout = FilerLayout::new("/tmp/out", "E02144");
        let path = layout.artifact_path(&DocId::new("S1"), ArtifactKind::Attachments);
        assert_eq!(layout.relative(&path), "S1/attachments/attachments.zip");
    }
}
