#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/yuho/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod atomic;
pub mod error;
pub mod index;
pub mod layout;
pub mod materialize;

pub use error::{OutputError, Result};
pub use index::{Collection, CollectionIndex, FilingMetadata, IndexWriter};
pub use layout::FilerLayout;
pub use materialize::{
    ArtifactRecord, Extraction, MaterializeReport, Materializer, extract_archive, sha256_tag,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
