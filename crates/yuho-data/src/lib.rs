#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/yuho/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod edinet;
pub mod error;
pub mod retry;

pub use cache::{DocumentListCache, DocumentListStore};
pub use edinet::{ArtifactKind, ArtifactSource, Candidate, DocId, EdinetClient, ListFetcher};
pub use error::{DataError, Result};
pub use retry::RetryPolicy;

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
