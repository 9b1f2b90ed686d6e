//! Label counting, label hygiene checks and rejection breakdowns

use serde::Serialize;
use std::collections::BTreeMap;

use super::buckets::{BucketLayout, Granularity};
use super::engine::AggregationEngine;
use super::series::MetricSeries;
use super::window::AnalysisWindow;
use crate::types::{IssueRecord, LabelRules, Priority, PriorityScale};

/// Key used for records without a department or category
pub const UNASSIGNED: &str = "(none)";

/// Occurrences of a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

/// Occurrences of a priority label from the scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityLabelCount {
    pub label: String,
    pub priority: Priority,
    pub count: usize,
}

/// Label hygiene report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCheckSummary {
    pub records: usize,
    /// Every label, most used first
    pub labels: Vec<LabelCount>,
    /// Every labelled level of the scale, in declaration order (0 if unused)
    pub priority_labels: Vec<PriorityLabelCount>,
    /// Ids without any priority label
    pub missing_priority: Vec<u64>,
    /// Ids with labels for more than one priority
    pub conflicting_priority: Vec<u64>,
    /// Ids without a department label (only when a prefix is configured)
    pub missing_department: Vec<u64>,
    /// Ids without a category label (only when a prefix is configured)
    pub missing_category: Vec<u64>,
}

/// Rejections within one group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionRow {
    pub key: String,
    pub total: usize,
    pub rejected: usize,
    pub rate: f64,
}

/// Rejection breakdown for a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionSummary {
    pub records: usize,
    pub rejected: usize,
    pub rejection_rate: f64,
    /// Rejection label → count
    pub by_reason: BTreeMap<String, usize>,
    pub by_author: Vec<RejectionRow>,
    pub by_department: Vec<RejectionRow>,
    pub by_category: Vec<RejectionRow>,
    /// Rejected records per creation month
    pub monthly: MetricSeries,
}

impl RejectionSummary {
    /// Summary for an empty record set
    pub fn empty() -> Self {
        Self {
            records: 0,
            rejected: 0,
            rejection_rate: 0.0,
            by_reason: BTreeMap::new(),
            by_author: Vec::new(),
            by_department: Vec::new(),
            by_category: Vec::new(),
            monthly: MetricSeries::new("rejected"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }
}

/// Count label occurrences across records.
pub fn count_labels<'a, I>(records: I) -> BTreeMap<String, usize>
where
    I: IntoIterator<Item = &'a IssueRecord>,
{
    let mut counts = BTreeMap::new();
    for record in records {
        for label in &record.labels {
            *counts.entry(label.clone()).or_insert(0) += 1;
        }
    }
    counts
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<LabelCount> {
    let mut rows: Vec<LabelCount> = counts
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect();
    // Stable sort keeps the alphabetical order among equal counts
    rows.sort_by(|a, b| b.count.cmp(&a.count));
    rows
}

/// Check labels for missing or conflicting classification.
pub fn label_check(
    records: &[&IssueRecord],
    scale: &PriorityScale,
    rules: &LabelRules,
) -> LabelCheckSummary {
    let counts = count_labels(records.iter().copied());

    let priority_labels = scale
        .levels()
        .iter()
        .filter_map(|level| {
            let label = level.label.as_deref()?;
            let count = counts
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case(label))
                .map(|(_, count)| *count)
                .sum();
            Some(PriorityLabelCount {
                label: label.to_string(),
                priority: level.priority,
                count,
            })
        })
        .collect();

    let mut summary = LabelCheckSummary {
        records: records.len(),
        labels: ranked(counts),
        priority_labels,
        missing_priority: Vec::new(),
        conflicting_priority: Vec::new(),
        missing_department: Vec::new(),
        missing_category: Vec::new(),
    };

    for record in records {
        let mut priorities: Vec<Priority> =
            scale.matching(&record.labels).map(|l| l.priority).collect();
        priorities.dedup();
        match priorities.len() {
            0 => summary.missing_priority.push(record.id),
            1 => {}
            _ => summary.conflicting_priority.push(record.id),
        }

        if rules.department_prefix.is_some() && record.classification.department.is_none() {
            summary.missing_department.push(record.id);
        }
        if rules.category_prefix.is_some() && record.classification.category.is_none() {
            summary.missing_category.push(record.id);
        }
    }

    summary.missing_priority.sort_unstable();
    summary.conflicting_priority.sort_unstable();
    summary.missing_department.sort_unstable();
    summary.missing_category.sort_unstable();

    tracing::debug!(
        records = summary.records,
        missing_priority = summary.missing_priority.len(),
        conflicting_priority = summary.conflicting_priority.len(),
        "Label check complete"
    );
    summary
}

fn rate(rejected: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        rejected as f64 / total as f64
    }
}

fn rows(groups: BTreeMap<String, (usize, usize)>) -> Vec<RejectionRow> {
    let mut rows: Vec<RejectionRow> = groups
        .into_iter()
        .map(|(key, (total, rejected))| RejectionRow {
            key,
            total,
            rejected,
            rate: rate(rejected, total),
        })
        .collect();
    rows.sort_by(|a, b| b.rejected.cmp(&a.rejected));
    rows
}

/// Break down rejected records by reason, author, department and category.
///
/// `records` should already be selected for `window`.
pub fn rejection_analysis(
    records: &[&IssueRecord],
    window: &AnalysisWindow,
    engine: &AggregationEngine<'_>,
) -> RejectionSummary {
    let mut by_reason = BTreeMap::new();
    let mut by_author: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut by_department: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut by_category: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut rejected = Vec::new();

    for &record in records {
        let class = &record.classification;
        let is_rejected = class.rejection.is_some();
        if let Some(reason) = &class.rejection {
            *by_reason.entry(reason.clone()).or_insert(0) += 1;
            rejected.push(record);
        }

        let groups = [
            (&mut by_author, Some(record.author.as_str())),
            (&mut by_department, class.department.as_deref()),
            (&mut by_category, class.category.as_deref()),
        ];
        for (group, key) in groups {
            let entry = group
                .entry(key.unwrap_or(UNASSIGNED).to_string())
                .or_insert((0, 0));
            entry.0 += 1;
            if is_rejected {
                entry.1 += 1;
            }
        }
    }

    let layout = BucketLayout::new(Granularity::Month, window.start, window.end);
    let mut monthly = engine.bundle(&rejected, &layout, window).created;
    monthly.name = "rejected".to_string();

    RejectionSummary {
        records: records.len(),
        rejected: rejected.len(),
        rejection_rate: rate(rejected.len(), records.len()),
        by_reason,
        by_author: rows(by_author),
        by_department: rows(by_department),
        by_category: rows(by_category),
        monthly,
    }
}
