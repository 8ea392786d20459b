#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/yuho/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod crawl;
pub mod range;
pub mod select;

// Re-export the data layer
pub use yuho_data as data;

pub use crawl::{CrawlOutcome, Crawler, DateFailure, DateStatus};
pub use range::{DateRange, parse_date_arg};
pub use select::{FiscalPeriodKey, Preference, Resolution, Selected, SelectionResult, Selector, select};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
