//! Bucketing and scoring
//!
//! Folds a selected record set into [`SeriesBundle`]s:
//!
//! ```text
//!  records ──► select(Active) ──► per granularity ──► BucketLayout
//!                                     │
//!                                     ▼
//!            created[b] / closed[b] / score[b]  (one pass, O(1) bucket lookup)
//!                                     │
//!                                     ▼
//!            running sums ──► open[b], cumulative_score[b]
//! ```
//!
//! Week and month bundles are computed independently from the same
//! selection; one is never resampled from the other.
//!
//! The cumulative score tracks debt *incurred*: closing a record never
//! subtracts its score.

use std::collections::BTreeMap;

use super::buckets::{BucketLayout, Granularity, GranularitySelection};
use super::series::{
    AuthorSummary, MetricReport, MetricSeries, PrioritySummary, SeriesBundle, Tally, UserAggregate,
};
use super::window::{select, AnalysisWindow, DateBasis};
use crate::error::Result;
use crate::types::{IssueRecord, Priority, PriorityScale};

/// Aggregates records into metric series using a priority scale.
#[derive(Debug, Clone, Copy)]
pub struct AggregationEngine<'a> {
    scale: &'a PriorityScale,
}

impl<'a> AggregationEngine<'a> {
    pub fn new(scale: &'a PriorityScale) -> Self {
        Self { scale }
    }

    /// Score of one record
    pub fn score(&self, record: &IssueRecord) -> u32 {
        self.scale.weight(record.priority)
    }

    /// Build the full report for `window`.
    ///
    /// Fails only if the window itself is invalid. An empty selection gives
    /// a report with zero-length series.
    pub fn aggregate(
        &self,
        records: &[IssueRecord],
        window: &AnalysisWindow,
        selection: GranularitySelection,
        per_user: bool,
    ) -> Result<MetricReport> {
        let selected = select(records, window, DateBasis::Active)?;

        let layouts: Vec<BucketLayout> = selection
            .granularities()
            .iter()
            .map(|g| BucketLayout::new(*g, window.start, window.end))
            .collect();

        let mut weekly = None;
        let mut monthly = None;
        for layout in &layouts {
            let bundle = self.bundle(&selected, layout, window);
            match layout.granularity() {
                Granularity::Week => weekly = Some(bundle),
                Granularity::Month => monthly = Some(bundle),
            }
        }

        let users = if per_user {
            self.user_aggregates(&selected, &layouts, window)
        } else {
            Vec::new()
        };

        let report = MetricReport {
            window: Some(window.clone()),
            records: selected.len(),
            weekly,
            monthly,
            users,
            priorities: self.priority_table(&selected, window),
            authors: self.author_table(&selected, window),
        };

        tracing::info!(
            start = %window.start,
            end = %window.end,
            records = report.records,
            users = report.users.len(),
            "Aggregated metric report"
        );
        Ok(report)
    }

    /// Fold `records` into one bundle over `layout`.
    ///
    /// `records` should already be filtered; only their dates are examined.
    pub fn bundle(
        &self,
        records: &[&IssueRecord],
        layout: &BucketLayout,
        window: &AnalysisWindow,
    ) -> SeriesBundle {
        if records.is_empty() || layout.is_empty() {
            return SeriesBundle::empty(layout.granularity());
        }

        let n = layout.len();
        let mut created = vec![0i64; n];
        let mut closed = vec![0i64; n];
        let mut score = vec![0i64; n];
        let mut by_priority: BTreeMap<Priority, Vec<i64>> = BTreeMap::new();
        let mut by_label: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
        let mut opening_balance = 0i64;

        for record in records {
            if let Some(i) = layout.index_of(record.created_date()) {
                created[i] += 1;
                score[i] += i64::from(self.score(record));
                by_priority
                    .entry(record.priority)
                    .or_insert_with(|| vec![0; n])[i] += 1;
                for label in &record.labels {
                    by_label.entry(label.as_str()).or_insert_with(|| vec![0; n])[i] += 1;
                }
            } else if record.open_at(window.start) {
                opening_balance += 1;
            }

            if let Some(i) = record.closed_date().and_then(|d| layout.index_of(d)) {
                closed[i] += 1;
            }
        }

        let mut open = Vec::with_capacity(n);
        let mut cumulative_score = Vec::with_capacity(n);
        let (mut cum_created, mut cum_closed, mut cum_score) = (0i64, 0i64, 0i64);
        for i in 0..n {
            cum_created += created[i];
            cum_closed += closed[i];
            cum_score += score[i];
            open.push(opening_balance + cum_created - cum_closed);
            cumulative_score.push(cum_score);
        }

        let buckets = layout.buckets();
        SeriesBundle {
            granularity: layout.granularity(),
            opening_balance,
            created: MetricSeries::from_values("created", buckets, &created),
            closed: MetricSeries::from_values("closed", buckets, &closed),
            open: MetricSeries::from_values("open", buckets, &open),
            score: MetricSeries::from_values("score", buckets, &score),
            cumulative_score: MetricSeries::from_values(
                "cumulative_score",
                buckets,
                &cumulative_score,
            ),
            by_priority: by_priority
                .into_iter()
                .map(|(p, values)| (p, MetricSeries::from_values(p.as_str(), buckets, &values)))
                .collect(),
            by_label: by_label
                .into_iter()
                .map(|(label, values)| {
                    (
                        label.to_string(),
                        MetricSeries::from_values(label, buckets, &values),
                    )
                })
                .collect(),
        }
    }

    /// One aggregate per author present in `records`, sorted by handle.
    fn user_aggregates(
        &self,
        records: &[&IssueRecord],
        layouts: &[BucketLayout],
        window: &AnalysisWindow,
    ) -> Vec<UserAggregate> {
        let mut by_author: BTreeMap<&str, Vec<&IssueRecord>> = BTreeMap::new();
        for &record in records {
            by_author
                .entry(record.author.as_str())
                .or_default()
                .push(record);
        }

        by_author
            .into_iter()
            .map(|(author, authored)| {
                let mut aggregate = UserAggregate {
                    author: author.to_string(),
                    records: authored.len(),
                    weekly: None,
                    monthly: None,
                };
                for layout in layouts {
                    let bundle = self.bundle(&authored, layout, window);
                    match layout.granularity() {
                        Granularity::Week => aggregate.weekly = Some(bundle),
                        Granularity::Month => aggregate.monthly = Some(bundle),
                    }
                }
                aggregate
            })
            .collect()
    }

    fn tally(&self, tally: &mut Tally, record: &IssueRecord, window: &AnalysisWindow) {
        if window.contains(record.created_date()) {
            tally.created += 1;
            tally.score += u64::from(self.score(record));
        }
        match record.closed_date() {
            Some(d) if window.contains(d) => tally.closed += 1,
            Some(d) if d <= window.end => {}
            _ => {
                if record.created_date() <= window.end {
                    tally.open += 1;
                }
            }
        }
    }

    /// Rows in scale declaration order, then priorities the scale omits.
    fn priority_table(
        &self,
        records: &[&IssueRecord],
        window: &AnalysisWindow,
    ) -> Vec<PrioritySummary> {
        let mut tallies: BTreeMap<Priority, Tally> = BTreeMap::new();
        for record in records {
            self.tally(tallies.entry(record.priority).or_default(), record, window);
        }

        let mut order: Vec<Priority> = self.scale.levels().iter().map(|l| l.priority).collect();
        for priority in Priority::ALL {
            if !order.contains(&priority) {
                order.push(priority);
            }
        }

        order
            .into_iter()
            .map(|priority| PrioritySummary {
                priority,
                weight: self.scale.weight(priority),
                color: self.scale.color(priority).to_string(),
                tally: tallies.get(&priority).copied().unwrap_or_default(),
            })
            .collect()
    }

    /// Rows sorted by score, then created count, then handle.
    fn author_table(
        &self,
        records: &[&IssueRecord],
        window: &AnalysisWindow,
    ) -> Vec<AuthorSummary> {
        let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
        for record in records {
            self.tally(
                tallies.entry(record.author.as_str()).or_default(),
                record,
                window,
            );
        }

        let mut rows: Vec<AuthorSummary> = tallies
            .into_iter()
            .map(|(author, tally)| AuthorSummary {
                author: author.to_string(),
                tally,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.tally
                .score
                .cmp(&a.tally.score)
                .then(b.tally.created.cmp(&a.tally.created))
                .then_with(|| a.author.cmp(&b.author))
        });
        rows
    }
}
