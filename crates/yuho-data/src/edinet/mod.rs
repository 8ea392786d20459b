//! EDINET API access.
//!
//! This module provides:
//! - An authenticated client for the EDINET API v2 with retries and request spacing
//! - Decoding of daily document lists into filing candidates
//! - The [`ListFetcher`] and [`ArtifactSource`] seams the pipeline is written against
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use yuho_data::edinet::{DocumentList, EdinetClient, ListFetcher, DOC_TYPE_YUHO};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EdinetClient::new(std::env::var("APIKEY")?)?;
//!     let date = NaiveDate::from_ymd_opt(2024, 6, 26).unwrap();
//!     let payload = client.fetch_document_list(date).await?;
//!     let list = DocumentList::from_slice(&payload, "documents.json")?;
//!     let candidates = list.candidates_for("E02144", DOC_TYPE_YUHO);
//!     println!("Found {} annual reports", candidates.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod documents;

pub use client::{
    ArtifactKind, ArtifactSource, ClientConfig, DOCUMENT_LIST_TYPE, EDINET_BASE_URL, EdinetClient,
    Fetched, ListFetcher, document_list_params,
};
pub use documents::{
    Candidate, Consolidation, DOC_TYPE_YUHO, DocId, DocumentList, DocumentRecord, ListMetadata,
    is_flag_true, parse_date, parse_submit_time,
};
