//! Record selection: date window, user lists, kind and label predicate

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{IssueKind, IssueRecord};

/// Which dates decide whether a record is inside the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateBasis {
    /// Created inside the window
    Created,
    /// Closed inside the window
    Closed,
    /// Open at any point of the window: created on or before the end and
    /// not closed before the start
    Active,
}

/// Restrict records to issues or pull requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindFilter {
    #[default]
    All,
    Issues,
    PullRequests,
}

impl KindFilter {
    pub fn admits(&self, kind: IssueKind) -> bool {
        match self {
            KindFilter::All => true,
            KindFilter::Issues => kind == IssueKind::Issue,
            KindFilter::PullRequests => kind == IssueKind::PullRequest,
        }
    }
}

impl std::str::FromStr for KindFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "all" => Ok(KindFilter::All),
            "issues" => Ok(KindFilter::Issues),
            "pull_requests" | "prs" => Ok(KindFilter::PullRequests),
            _ => Err(format!("unknown kind filter: {} (all, issues, prs)", s)),
        }
    }
}

/// How a label predicate compares label names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    #[default]
    Exact,
    Substring,
}

/// Matches records carrying a label. Case-insensitive in both modes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPredicate {
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
}

impl LabelPredicate {
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: MatchMode::Exact,
        }
    }

    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: MatchMode::Substring,
        }
    }

    pub fn matches_label(&self, label: &str) -> bool {
        match self.mode {
            MatchMode::Exact => label.eq_ignore_ascii_case(&self.pattern),
            MatchMode::Substring => label
                .to_lowercase()
                .contains(&self.pattern.to_lowercase()),
        }
    }

    pub fn matches(&self, record: &IssueRecord) -> bool {
        record.labels.iter().any(|label| self.matches_label(label))
    }
}

/// Inclusive date window plus author/kind/label filters.
///
/// At most one of `allow_users` and `deny_users` may be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_users: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deny_users: Vec<String>,
    pub kind: KindFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<LabelPredicate>,
}

impl AnalysisWindow {
    /// Window over `[start, end]` with no other filters
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            allow_users: Vec::new(),
            deny_users: Vec::new(),
            kind: KindFilter::All,
            label: None,
        }
    }

    /// Smallest window containing every created and closed date.
    ///
    /// `None` for an empty record set.
    pub fn covering<'a, I>(records: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a IssueRecord>,
    {
        let mut bounds: Option<(NaiveDate, NaiveDate)> = None;
        for record in records {
            let created = record.created_date();
            let last = record.closed_date().unwrap_or(created).max(created);
            bounds = Some(match bounds {
                None => (created, last),
                Some((start, end)) => (start.min(created), end.max(last)),
            });
        }
        bounds.map(|(start, end)| Self::new(start, end))
    }

    pub fn with_allow_users(mut self, users: Vec<String>) -> Self {
        self.allow_users = users;
        self
    }

    pub fn with_deny_users(mut self, users: Vec<String>) -> Self {
        self.deny_users = users;
        self
    }

    pub fn with_kind(mut self, kind: KindFilter) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_label(mut self, label: Option<LabelPredicate>) -> Self {
        self.label = label;
        self
    }

    /// Reject inverted windows and contradictory user filters.
    pub fn validate(&self) -> Result<()> {
        if self.start > self.end {
            return Err(Error::Config(format!(
                "window start {} is after end {}",
                self.start, self.end
            )));
        }
        if !self.allow_users.is_empty() && !self.deny_users.is_empty() {
            return Err(Error::Config(
                "user allow-list and deny-list are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Date test for one record
    pub fn admits_dates(&self, record: &IssueRecord, basis: DateBasis) -> bool {
        match basis {
            DateBasis::Created => self.contains(record.created_date()),
            DateBasis::Closed => record.closed_date().is_some_and(|d| self.contains(d)),
            DateBasis::Active => {
                record.created_date() <= self.end
                    && record.closed_date().map_or(true, |d| d >= self.start)
            }
        }
    }

    /// User test for one author handle (case-insensitive)
    pub fn admits_author(&self, author: &str) -> bool {
        let listed = |users: &[String]| users.iter().any(|u| u.eq_ignore_ascii_case(author));
        if !self.allow_users.is_empty() {
            listed(&self.allow_users)
        } else {
            !listed(&self.deny_users)
        }
    }

    /// Every non-date test for one record
    pub fn admits_attributes(&self, record: &IssueRecord) -> bool {
        self.admits_author(&record.author)
            && self.kind.admits(record.kind)
            && self.label.as_ref().map_or(true, |p| p.matches(record))
    }
}

/// Select the records relevant to `window`.
///
/// Validates the window first, then filters by date, user, kind and label,
/// in that order. The result order is unspecified.
pub fn select<'a>(
    records: &'a [IssueRecord],
    window: &AnalysisWindow,
    basis: DateBasis,
) -> Result<Vec<&'a IssueRecord>> {
    window.validate()?;

    let selected: Vec<&IssueRecord> = records
        .iter()
        .filter(|r| window.admits_dates(r, basis))
        .filter(|r| window.admits_attributes(r))
        .collect();

    tracing::debug!(
        start = %window.start,
        end = %window.end,
        basis = ?basis,
        total = records.len(),
        selected = selected.len(),
        "Selected records"
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueState, LabelClassification, Priority};
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(id: u64, author: &str, created: NaiveDate, closed: Option<NaiveDate>) -> IssueRecord {
        let at = |d: NaiveDate| Utc.from_utc_datetime(&d.and_hms_opt(12, 0, 0).unwrap());
        IssueRecord {
            id,
            number: None,
            title: None,
            kind: IssueKind::Issue,
            author: author.to_string(),
            created_at: at(created),
            closed_at: closed.map(at),
            state: if closed.is_some() {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            labels: vec!["bug".to_string()],
            priority: Priority::Uncategorized,
            estimate: None,
            classification: LabelClassification::default(),
        }
    }

    fn ids(selected: &[&IssueRecord]) -> Vec<u64> {
        let mut ids: Vec<u64> = selected.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }

    fn fixture() -> Vec<IssueRecord> {
        vec![
            record(1, "alice", date(2025, 1, 2), None),
            record(2, "bob", date(2025, 1, 10), Some(date(2025, 2, 5))),
            record(3, "carol", date(2024, 12, 1), Some(date(2025, 1, 3))),
            record(4, "alice", date(2024, 11, 1), Some(date(2024, 11, 20))),
            record(5, "Bob", date(2025, 3, 1), None),
        ]
    }

    #[test]
    fn test_date_bases() {
        let records = fixture();
        let window = AnalysisWindow::new(date(2025, 1, 1), date(2025, 1, 31));

        assert_eq!(ids(&select(&records, &window, DateBasis::Created).unwrap()), vec![1, 2]);
        assert_eq!(ids(&select(&records, &window, DateBasis::Closed).unwrap()), vec![3]);
        assert_eq!(
            ids(&select(&records, &window, DateBasis::Active).unwrap()),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let records = fixture();
        let window = AnalysisWindow::new(date(2025, 1, 2), date(2025, 1, 10));
        assert_eq!(ids(&select(&records, &window, DateBasis::Created).unwrap()), vec![1, 2]);
    }

    #[test]
    fn test_allow_and_deny_lists() {
        let records = fixture();
        let base = AnalysisWindow::new(date(2024, 1, 1), date(2025, 12, 31));

        let allow = base.clone().with_allow_users(vec!["bob".to_string()]);
        assert_eq!(ids(&select(&records, &allow, DateBasis::Created).unwrap()), vec![2, 5]);

        let deny = base.with_deny_users(vec!["ALICE".to_string()]);
        assert_eq!(ids(&select(&records, &deny, DateBasis::Created).unwrap()), vec![2, 3, 5]);
    }

    #[test]
    fn test_allow_and_deny_together_is_config_error() {
        let records = fixture();
        let window = AnalysisWindow::new(date(2025, 1, 1), date(2025, 1, 31))
            .with_allow_users(vec!["alice".to_string()])
            .with_deny_users(vec!["bob".to_string()]);
        assert!(matches!(
            select(&records, &window, DateBasis::Created),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_inverted_window_is_config_error() {
        let window = AnalysisWindow::new(date(2025, 2, 1), date(2025, 1, 1));
        assert!(matches!(
            select(&[], &window, DateBasis::Created),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_kind_filter() {
        let mut records = fixture();
        records[0].kind = IssueKind::PullRequest;
        let window = AnalysisWindow::new(date(2024, 1, 1), date(2025, 12, 31));

        let prs = window.clone().with_kind(KindFilter::PullRequests);
        assert_eq!(ids(&select(&records, &prs, DateBasis::Created).unwrap()), vec![1]);

        let issues = window.with_kind(KindFilter::Issues);
        assert_eq!(
            ids(&select(&records, &issues, DateBasis::Created).unwrap()),
            vec![2, 3, 4, 5]
        );
    }

    #[test]
    fn test_label_predicate_modes() {
        let mut records = fixture();
        records[1].labels = vec!["PRIORITY_HIGH".to_string()];
        records[2].labels = vec!["priority_high_later".to_string()];
        let window = AnalysisWindow::new(date(2024, 1, 1), date(2025, 12, 31));

        let exact = window
            .clone()
            .with_label(Some(LabelPredicate::exact("priority_high")));
        assert_eq!(ids(&select(&records, &exact, DateBasis::Created).unwrap()), vec![2]);

        let substring = window.with_label(Some(LabelPredicate::substring("HIGH")));
        assert_eq!(
            ids(&select(&records, &substring, DateBasis::Created).unwrap()),
            vec![2, 3]
        );
    }

    #[test]
    fn test_covering_window() {
        let records = fixture();
        let window = AnalysisWindow::covering(&records).unwrap();
        assert_eq!(window.start, date(2024, 11, 1));
        assert_eq!(window.end, date(2025, 3, 1));
        assert!(AnalysisWindow::covering(&[]).is_none());
    }
}
