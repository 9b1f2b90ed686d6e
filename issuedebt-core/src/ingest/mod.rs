//! Ingestion layer: raw tracker payloads into the local cache
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  GitHub API or  │ ──► │   Normalizer     │ ──► │   CacheStore    │
//! │  JSON dump file │     │ (label → priority│     │ (cache.json,    │
//! └─────────────────┘     │  classification) │     │  upsert by id)  │
//!                         └──────────────────┘     └─────────────────┘
//! ```
//!
//! Malformed payloads are logged and skipped; one bad item never aborts a
//! sync.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use issuedebt_core::{CacheStore, Config};
//! use issuedebt_core::ingest::{ingest, Normalizer, SyncFetcher};
//!
//! let config = Config::load()?;
//! let fetched = SyncFetcher::new(config.github.clone())?.fetch_all(|_, _| {})?;
//! let normalizer = Normalizer::new(config.priorities.clone(), config.labels.clone());
//! let cache = CacheStore::at(config.resolved_cache_path());
//! let summary = ingest(&fetched.payloads, &normalizer, &cache)?;
//! println!("{} records cached", summary.merge.total);
//! ```

pub mod github;
mod normalize;

pub use github::{FetchOutcome, GithubClient, StopReason, SyncFetcher};
pub use normalize::{NormalizeOutcome, Normalizer};

use std::path::Path;

use serde_json::Value;

use crate::cache::{CacheStore, MergeSummary};
use crate::error::{Error, MalformedRecord, Result};

/// Result of ingesting one batch of payloads.
#[derive(Debug, Default, Clone)]
pub struct IngestSummary {
    /// Payloads handed in
    pub received: usize,
    /// Payloads that became records
    pub normalized: usize,
    /// Payloads that were skipped
    pub malformed: Vec<MalformedRecord>,
    /// Cache changes
    pub merge: MergeSummary,
}

/// Normalize `payloads` and merge the resulting records into `cache`.
pub fn ingest(
    payloads: &[Value],
    normalizer: &Normalizer,
    cache: &CacheStore,
) -> Result<IngestSummary> {
    let outcome = normalizer.normalize_batch(payloads);
    let normalized = outcome.records.len();
    let merge = cache.merge(outcome.records)?;

    if !outcome.malformed.is_empty() {
        tracing::warn!(
            malformed = outcome.malformed.len(),
            "Skipped malformed payloads during ingest"
        );
    }

    Ok(IngestSummary {
        received: payloads.len(),
        normalized,
        malformed: outcome.malformed,
        merge,
    })
}

/// Read raw payloads from a JSON file.
///
/// Accepts a top-level array, or an object holding the array under
/// `items` or `issues`.
pub fn load_payloads(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path)?;
    let value: Value = serde_json::from_str(&content)?;

    let payloads = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object
            .remove("items")
            .or_else(|| object.remove("issues"))
        {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(Error::Fetch(format!(
                    "{}: expected an array of issues",
                    path.display()
                )))
            }
        },
        _ => {
            return Err(Error::Fetch(format!(
                "{}: expected an array of issues",
                path.display()
            )))
        }
    };

    tracing::debug!(path = %path.display(), payloads = payloads.len(), "Loaded payload file");
    Ok(payloads)
}
