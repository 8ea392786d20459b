//! Glue between the command line and the library crates.
//!
//! Configuration is resolved from flags and the environment, the document-list
//! cache is opened at its platform default, and the fetch pipeline runs the
//! crawl, selection, download and index stages in order.

pub(crate) mod cache_manager;
pub(crate) mod config;
pub(crate) mod fetch_pipeline;
