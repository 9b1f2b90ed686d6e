//! # issuedebt-core
//!
//! Core library for issuedebt - issue debt metrics for GitHub repositories.
//!
//! This library provides:
//! - Domain types for issues, priorities and label rules
//! - A GitHub issues client and payload normalization
//! - A JSON snapshot cache of normalized records
//! - Time-bucketed metrics (created, closed, open, weighted score)
//! - Report dispatch for the CLI
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! Data flows through three layers:
//! - **Raw:** GitHub payloads (API pages or a JSON dump)
//! - **Canonical:** [`IssueRecord`]s in the cache snapshot, upserted by id
//! - **Derived:** Metric series and summaries, rebuilt for every report
//!
//! ## Example
//!
//! ```rust,no_run
//! use issuedebt_core::{CacheStore, Config, ReportBuilder, ReportRequest};
//!
//! let config = Config::load().expect("failed to load config");
//! let records = CacheStore::at(config.resolved_cache_path())
//!     .load()
//!     .expect("failed to load cache");
//!
//! let builder = ReportBuilder::new(&config.priorities, &config.labels, &config.report);
//! let output = builder.build(&ReportRequest::Pdf, &records).expect("report failed");
//! println!("{}", serde_json::to_string_pretty(&output).unwrap());
//! ```

// Re-export commonly used items at the crate root
pub use cache::{CacheStore, MergeSummary};
pub use config::Config;
pub use error::{Error, MalformedRecord, Result};
pub use ingest::{IngestSummary, Normalizer};
pub use report::{ReportBuilder, ReportConfig, ReportOutput, ReportRequest};
pub use types::*;

// Public modules
pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod report;
pub mod types;
