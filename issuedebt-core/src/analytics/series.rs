//! Metric series model
//!
//! Output containers handed to renderers. Points are always chronological
//! and every map is a `BTreeMap`, so the JSON form is reproducible for the
//! same snapshot and window.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::buckets::{Granularity, GranularitySelection, TimeBucket};
use super::window::AnalysisWindow;
use crate::types::Priority;

/// One `(bucket, value)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    /// Period label (`2025-W03`, `2025-01`)
    pub bucket: String,
    /// First day covered by the bucket (clipped to the window)
    pub start: NaiveDate,
    pub value: i64,
}

/// A named, chronologically ordered series
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSeries {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            points: Vec::new(),
        }
    }

    /// Build from per-bucket values; `values` must be as long as `buckets`.
    pub fn from_values(name: impl Into<String>, buckets: &[TimeBucket], values: &[i64]) -> Self {
        debug_assert_eq!(buckets.len(), values.len());
        Self {
            name: name.into(),
            points: buckets
                .iter()
                .zip(values)
                .map(|(bucket, value)| SeriesPoint {
                    bucket: bucket.label(),
                    start: bucket.start,
                    value: *value,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<i64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Value at a bucket label
    pub fn value_at(&self, bucket: &str) -> Option<i64> {
        self.points
            .iter()
            .find(|p| p.bucket == bucket)
            .map(|p| p.value)
    }

    pub fn total(&self) -> i64 {
        self.points.iter().map(|p| p.value).sum()
    }

    pub fn last_value(&self) -> Option<i64> {
        self.points.last().map(|p| p.value)
    }
}

/// Every series of one granularity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesBundle {
    pub granularity: Granularity,
    /// Records already open when the window starts
    pub opening_balance: i64,
    pub created: MetricSeries,
    pub closed: MetricSeries,
    /// `opening_balance + cumulative created - cumulative closed`
    pub open: MetricSeries,
    /// Score of records created in each bucket
    pub score: MetricSeries,
    /// Running sum of `score`; closing never subtracts
    pub cumulative_score: MetricSeries,
    /// Created counts per priority
    pub by_priority: BTreeMap<Priority, MetricSeries>,
    /// Created counts per label
    pub by_label: BTreeMap<String, MetricSeries>,
}

impl SeriesBundle {
    /// Bundle with zero-length series
    pub fn empty(granularity: Granularity) -> Self {
        Self {
            granularity,
            opening_balance: 0,
            created: MetricSeries::new("created"),
            closed: MetricSeries::new("closed"),
            open: MetricSeries::new("open"),
            score: MetricSeries::new("score"),
            cumulative_score: MetricSeries::new("cumulative_score"),
            by_priority: BTreeMap::new(),
            by_label: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Bucket labels, in order
    pub fn buckets(&self) -> Vec<&str> {
        self.created.points.iter().map(|p| p.bucket.as_str()).collect()
    }
}

/// Series scoped to one author
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAggregate {
    pub author: String,
    /// Selected records authored by this user
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<SeriesBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<SeriesBundle>,
}

/// Counters shared by the summary tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    /// Created inside the window
    pub created: u64,
    /// Closed inside the window
    pub closed: u64,
    /// Still open at the end of the window
    pub open: u64,
    /// Score of records created inside the window
    pub score: u64,
}

/// One row per priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrioritySummary {
    pub priority: Priority,
    pub weight: u32,
    pub color: String,
    #[serde(flatten)]
    pub tally: Tally,
}

/// One row per author
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSummary {
    pub author: String,
    #[serde(flatten)]
    pub tally: Tally,
}

/// Complete time-series report for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricReport {
    /// `None` when there was nothing to derive a window from
    pub window: Option<AnalysisWindow>,
    /// Selected records (open at some point of the window)
    pub records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<SeriesBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<SeriesBundle>,
    pub users: Vec<UserAggregate>,
    pub priorities: Vec<PrioritySummary>,
    pub authors: Vec<AuthorSummary>,
}

impl MetricReport {
    /// Report for an empty record set: requested bundles with zero-length series
    pub fn empty(selection: GranularitySelection) -> Self {
        Self {
            window: None,
            records: 0,
            weekly: selection
                .includes(Granularity::Week)
                .then(|| SeriesBundle::empty(Granularity::Week)),
            monthly: selection
                .includes(Granularity::Month)
                .then(|| SeriesBundle::empty(Granularity::Month)),
            users: Vec::new(),
            priorities: Vec::new(),
            authors: Vec::new(),
        }
    }

    /// No record matched; renderers get zero-length series
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn bundle(&self, granularity: Granularity) -> Option<&SeriesBundle> {
        match granularity {
            Granularity::Week => self.weekly.as_ref(),
            Granularity::Month => self.monthly.as_ref(),
        }
    }

    pub fn user(&self, author: &str) -> Option<&UserAggregate> {
        self.users.iter().find(|u| u.author == author)
    }
}
