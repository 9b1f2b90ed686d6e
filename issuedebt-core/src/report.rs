//! Report dispatcher
//!
//! Maps a [`ReportRequest`] onto the analytics layer and returns a
//! serializable [`ReportOutput`]. Rendering (JSON files, charts, tables)
//! is left to the caller; every output is plain data.
//!
//! Requests never share state, so one failing request does not affect the
//! others built from the same snapshot.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::analytics::{
    label_check, rejection_analysis, select, AggregationEngine, AnalysisWindow, DateBasis,
    GranularitySelection, KindFilter, LabelCheckSummary, LabelPredicate, MetricReport,
    RejectionSummary,
};
use crate::error::{Error, Result};
use crate::types::{IssueKind, IssueRecord, IssueState, LabelRules, Priority, PriorityScale};

/// `[report]` section of the config file
#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    /// Week, month or both axes
    #[serde(default)]
    pub granularity: GranularitySelection,

    /// Include per-user aggregates in time-series reports
    #[serde(default = "default_per_user")]
    pub per_user: bool,

    /// Only count these authors
    #[serde(default)]
    pub include_users: Vec<String>,

    /// Never count these authors (bots, service accounts)
    #[serde(default)]
    pub exclude_users: Vec<String>,

    /// Issues, pull requests or both
    #[serde(default)]
    pub kind: KindFilter,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            granularity: GranularitySelection::default(),
            per_user: default_per_user(),
            include_users: Vec::new(),
            exclude_users: Vec::new(),
            kind: KindFilter::default(),
        }
    }
}

fn default_per_user() -> bool {
    true
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.include_users.is_empty() && !self.exclude_users.is_empty() {
            return Err(Error::Config(
                "report.include_users and report.exclude_users are mutually exclusive"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// `[start, end]` with the configured user and kind filters applied
    pub fn window(&self, start: NaiveDate, end: NaiveDate) -> AnalysisWindow {
        AnalysisWindow::new(start, end)
            .with_allow_users(self.include_users.clone())
            .with_deny_users(self.exclude_users.clone())
            .with_kind(self.kind)
    }
}

/// One report to produce
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportRequest {
    /// Time series over everything in the cache
    Pdf,
    /// Time series over an explicit window
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Records carrying a label, plus their time series
    LabelSearch(LabelPredicate),
    /// Rejected records broken down by reason, author, department and category
    RejectionAnalysis,
    /// Missing and conflicting classification labels
    LabelCheck,
}

impl ReportRequest {
    /// Stable name, also used as the output file stem
    pub fn name(&self) -> &'static str {
        match self {
            ReportRequest::Pdf => "pdf",
            ReportRequest::DateRange { .. } => "date-range",
            ReportRequest::LabelSearch(_) => "label-search",
            ReportRequest::RejectionAnalysis => "rejection-analysis",
            ReportRequest::LabelCheck => "label-check",
        }
    }
}

/// A record listed by a label search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMatch {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: IssueKind,
    pub author: String,
    pub state: IssueState,
    pub priority: Priority,
    pub labels: Vec<String>,
}

impl From<&IssueRecord> for LabelMatch {
    fn from(record: &IssueRecord) -> Self {
        Self {
            id: record.id,
            number: record.number,
            title: record.title.clone(),
            kind: record.kind,
            author: record.author.clone(),
            state: record.state,
            priority: record.priority,
            labels: record.labels.clone(),
        }
    }
}

/// Result of one [`ReportRequest`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "report", rename_all = "kebab-case")]
pub enum ReportOutput {
    Pdf(MetricReport),
    DateRange(MetricReport),
    LabelSearch {
        predicate: LabelPredicate,
        /// Matching records, by id
        matches: Vec<LabelMatch>,
        series: MetricReport,
    },
    RejectionAnalysis(RejectionSummary),
    LabelCheck(LabelCheckSummary),
}

impl ReportOutput {
    pub fn name(&self) -> &'static str {
        match self {
            ReportOutput::Pdf(_) => "pdf",
            ReportOutput::DateRange(_) => "date-range",
            ReportOutput::LabelSearch { .. } => "label-search",
            ReportOutput::RejectionAnalysis(_) => "rejection-analysis",
            ReportOutput::LabelCheck(_) => "label-check",
        }
    }

    /// Nothing was selected
    pub fn is_empty(&self) -> bool {
        match self {
            ReportOutput::Pdf(report) | ReportOutput::DateRange(report) => report.is_empty(),
            ReportOutput::LabelSearch { matches, .. } => matches.is_empty(),
            ReportOutput::RejectionAnalysis(summary) => summary.is_empty(),
            ReportOutput::LabelCheck(summary) => summary.records == 0,
        }
    }

    /// Number of records the report is built from
    pub fn records(&self) -> usize {
        match self {
            ReportOutput::Pdf(report) | ReportOutput::DateRange(report) => report.records,
            ReportOutput::LabelSearch { matches, .. } => matches.len(),
            ReportOutput::RejectionAnalysis(summary) => summary.records,
            ReportOutput::LabelCheck(summary) => summary.records,
        }
    }
}

/// Builds reports from a record snapshot.
pub struct ReportBuilder<'a> {
    scale: &'a PriorityScale,
    rules: &'a LabelRules,
    config: &'a ReportConfig,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(scale: &'a PriorityScale, rules: &'a LabelRules, config: &'a ReportConfig) -> Self {
        Self {
            scale,
            rules,
            config,
        }
    }

    /// Produce one report.
    ///
    /// An empty snapshot yields an empty report, not an error. Errors are
    /// limited to contradictory filters and inverted date ranges.
    pub fn build(&self, request: &ReportRequest, records: &[IssueRecord]) -> Result<ReportOutput> {
        let _span = tracing::info_span!("report", name = request.name()).entered();
        self.config.validate()?;

        let engine = AggregationEngine::new(self.scale);
        let output = match request {
            ReportRequest::Pdf => ReportOutput::Pdf(self.series(&engine, records, None)?),
            ReportRequest::DateRange { start, end } => {
                let window = self.config.window(*start, *end);
                ReportOutput::DateRange(self.series(&engine, records, Some(window))?)
            }
            ReportRequest::LabelSearch(predicate) => {
                self.label_search(&engine, records, predicate)?
            }
            ReportRequest::RejectionAnalysis => {
                ReportOutput::RejectionAnalysis(self.rejections(&engine, records)?)
            }
            ReportRequest::LabelCheck => {
                let selected: Vec<&IssueRecord> = match self.covering(records) {
                    Some(window) => select(records, &window, DateBasis::Active)?,
                    None => Vec::new(),
                };
                ReportOutput::LabelCheck(label_check(&selected, self.scale, self.rules))
            }
        };

        tracing::info!(
            report = output.name(),
            records = output.records(),
            "Built report"
        );
        Ok(output)
    }

    /// Window spanning the whole snapshot, with configured filters
    fn covering(&self, records: &[IssueRecord]) -> Option<AnalysisWindow> {
        AnalysisWindow::covering(records).map(|w| self.config.window(w.start, w.end))
    }

    fn series(
        &self,
        engine: &AggregationEngine<'_>,
        records: &[IssueRecord],
        window: Option<AnalysisWindow>,
    ) -> Result<MetricReport> {
        match window.or_else(|| self.covering(records)) {
            Some(window) => {
                engine.aggregate(records, &window, self.config.granularity, self.config.per_user)
            }
            None => Ok(MetricReport::empty(self.config.granularity)),
        }
    }

    fn label_search(
        &self,
        engine: &AggregationEngine<'_>,
        records: &[IssueRecord],
        predicate: &LabelPredicate,
    ) -> Result<ReportOutput> {
        let Some(window) = self.covering(records) else {
            return Ok(ReportOutput::LabelSearch {
                predicate: predicate.clone(),
                matches: Vec::new(),
                series: MetricReport::empty(self.config.granularity),
            });
        };
        let window = window.with_label(Some(predicate.clone()));

        let mut matches: Vec<LabelMatch> = select(records, &window, DateBasis::Active)?
            .into_iter()
            .map(LabelMatch::from)
            .collect();
        matches.sort_by_key(|m| m.id);

        let series = engine.aggregate(
            records,
            &window,
            self.config.granularity,
            self.config.per_user,
        )?;

        Ok(ReportOutput::LabelSearch {
            predicate: predicate.clone(),
            matches,
            series,
        })
    }

    fn rejections(
        &self,
        engine: &AggregationEngine<'_>,
        records: &[IssueRecord],
    ) -> Result<RejectionSummary> {
        match self.covering(records) {
            Some(window) => {
                let selected = select(records, &window, DateBasis::Active)?;
                Ok(rejection_analysis(&selected, &window, engine))
            }
            None => Ok(RejectionSummary::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::Granularity;
    use crate::ingest::Normalizer;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn records() -> Vec<IssueRecord> {
        let normalizer = Normalizer::default();
        [
            json!({ "id": 1, "number": 10, "title": "Crash on save", "user": { "login": "alice" },
                    "created_at": "2025-01-01T09:00:00Z", "labels": ["PRIORITY_HIGH", "bug"] }),
            json!({ "id": 2, "number": 11, "user": { "login": "bob" },
                    "created_at": "2025-01-03T09:00:00Z", "closed_at": "2025-01-08T09:00:00Z",
                    "labels": ["PRIORITY_LOW", "WONTFIX"] }),
            json!({ "id": 3, "number": 12, "user": { "login": "alice" },
                    "created_at": "2025-01-07T09:00:00Z", "labels": ["SATANIC", "bugfix"] }),
            json!({ "id": 4, "number": 13, "user": { "login": "dependabot[bot]" },
                    "created_at": "2025-01-09T09:00:00Z", "pull_request": {},
                    "labels": ["dependencies"] }),
        ]
        .iter()
        .map(|p| normalizer.normalize(p).unwrap())
        .collect()
    }

    fn build(config: &ReportConfig, request: &ReportRequest) -> Result<ReportOutput> {
        let scale = PriorityScale::default();
        let rules = LabelRules::default();
        ReportBuilder::new(&scale, &rules, config).build(request, &records())
    }

    #[test]
    fn test_request_names() {
        assert_eq!(ReportRequest::Pdf.name(), "pdf");
        assert_eq!(
            ReportRequest::LabelSearch(LabelPredicate::exact("bug")).name(),
            "label-search"
        );
        assert_eq!(ReportRequest::LabelCheck.name(), "label-check");
    }

    #[test]
    fn test_pdf_covers_whole_snapshot() {
        let output = build(&ReportConfig::default(), &ReportRequest::Pdf).unwrap();
        let ReportOutput::Pdf(report) = output else {
            panic!("unexpected output");
        };

        let window = report.window.as_ref().unwrap();
        assert_eq!(window.start, date(2025, 1, 1));
        assert_eq!(window.end, date(2025, 1, 9));
        assert_eq!(report.records, 4);
        assert!(report.weekly.is_some());
        assert!(report.monthly.is_some());
        assert!(report.user("alice").is_some());
    }

    #[test]
    fn test_configured_filters_apply() {
        let config = ReportConfig {
            granularity: GranularitySelection::Week,
            per_user: false,
            exclude_users: vec!["Dependabot[bot]".to_string()],
            kind: KindFilter::Issues,
            ..ReportConfig::default()
        };
        let ReportOutput::Pdf(report) = build(&config, &ReportRequest::Pdf).unwrap() else {
            panic!("unexpected output");
        };

        assert_eq!(report.records, 3);
        assert!(report.monthly.is_none());
        assert!(report.users.is_empty());
        let weekly = report.bundle(Granularity::Week).unwrap();
        assert_eq!(weekly.created.total(), 3);
    }

    #[test]
    fn test_date_range() {
        let request = ReportRequest::DateRange {
            start: date(2025, 1, 6),
            end: date(2025, 1, 12),
        };
        let ReportOutput::DateRange(report) = build(&ReportConfig::default(), &request).unwrap()
        else {
            panic!("unexpected output");
        };

        let weekly = report.weekly.as_ref().unwrap();
        assert_eq!(weekly.buckets(), vec!["2025-W02"]);
        assert_eq!(weekly.opening_balance, 2);
        assert_eq!(weekly.created.values(), vec![2]);
        assert_eq!(weekly.closed.values(), vec![1]);
        assert_eq!(weekly.open.values(), vec![3]);
    }

    #[test]
    fn test_inverted_date_range_fails() {
        let request = ReportRequest::DateRange {
            start: date(2025, 2, 1),
            end: date(2025, 1, 1),
        };
        let err = build(&ReportConfig::default(), &request).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_label_search_modes() {
        let exact = ReportRequest::LabelSearch(LabelPredicate::exact("BUG"));
        let ReportOutput::LabelSearch {
            matches, series, ..
        } = build(&ReportConfig::default(), &exact).unwrap()
        else {
            panic!("unexpected output");
        };
        assert_eq!(matches.iter().map(|m| m.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(matches[0].title.as_deref(), Some("Crash on save"));
        assert_eq!(series.records, 1);

        let substring = ReportRequest::LabelSearch(LabelPredicate::substring("bug"));
        let output = build(&ReportConfig::default(), &substring).unwrap();
        assert_eq!(output.records(), 2);
    }

    #[test]
    fn test_rejection_and_label_check() {
        let output = build(&ReportConfig::default(), &ReportRequest::RejectionAnalysis).unwrap();
        let ReportOutput::RejectionAnalysis(summary) = output else {
            panic!("unexpected output");
        };
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.by_reason["WONTFIX"], 1);

        let output = build(&ReportConfig::default(), &ReportRequest::LabelCheck).unwrap();
        let ReportOutput::LabelCheck(summary) = output else {
            panic!("unexpected output");
        };
        assert_eq!(summary.missing_priority, vec![4]);
    }

    #[test]
    fn test_contradictory_user_lists_fail() {
        let config = ReportConfig {
            include_users: vec!["alice".to_string()],
            exclude_users: vec!["bob".to_string()],
            ..ReportConfig::default()
        };
        assert!(matches!(
            build(&config, &ReportRequest::Pdf),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_empty_snapshot_gives_empty_reports() {
        let scale = PriorityScale::default();
        let rules = LabelRules::default();
        let config = ReportConfig::default();
        let builder = ReportBuilder::new(&scale, &rules, &config);

        let requests = [
            ReportRequest::Pdf,
            ReportRequest::LabelSearch(LabelPredicate::exact("bug")),
            ReportRequest::RejectionAnalysis,
            ReportRequest::LabelCheck,
        ];
        for request in &requests {
            let output = builder.build(request, &[]).unwrap();
            assert!(output.is_empty(), "{} should be empty", request.name());
            assert_eq!(output.name(), request.name());
        }
    }

    #[test]
    fn test_output_is_tagged() {
        let output = build(&ReportConfig::default(), &ReportRequest::LabelCheck).unwrap();
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["report"], "label-check");
        assert_eq!(json["records"], 4);
    }
}
