//! Aggregation of cached records into metric series
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────────┐    ┌────────────────────┐    ┌──────────────┐
//! │ IssueRecords │ ─► │ window::select   │ ─► │ AggregationEngine  │ ─► │ MetricReport │
//! │ (cache)      │    │ dates/users/kind │    │ buckets + scoring  │    │ (series)     │
//! └──────────────┘    │ /label predicate │    └────────────────────┘    └──────────────┘
//!                     └──────────────────┘
//! ```
//!
//! Nothing here is persisted: buckets, series and user aggregates are
//! rebuilt for every report from the current cache snapshot.

pub mod buckets;
pub mod engine;
pub mod labels;
pub mod series;
pub mod window;

pub use buckets::{BucketLayout, Granularity, GranularitySelection, PeriodKey, TimeBucket};
pub use engine::AggregationEngine;
pub use labels::{
    count_labels, label_check, rejection_analysis, LabelCheckSummary, LabelCount,
    RejectionSummary,
};
pub use series::{
    AuthorSummary, MetricReport, MetricSeries, PrioritySummary, SeriesBundle, SeriesPoint, Tally,
    UserAggregate,
};
pub use window::{select, AnalysisWindow, DateBasis, KindFilter, LabelPredicate, MatchMode};
