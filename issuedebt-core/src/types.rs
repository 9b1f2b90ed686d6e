//! Core domain types for issuedebt
//!
//! These types represent the canonical record model that every report is
//! computed from.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Record** | One normalized issue or pull request ([`IssueRecord`]) |
//! | **Priority** | Closed set of priority levels resolved from labels ([`Priority`]) |
//! | **Scale** | Label name → priority, weight and color table ([`PriorityScale`]) |
//! | **Score** | The weight of a record's priority; summed as technical debt |
//! | **Classification** | Rejection / department / category derived from labels |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================
// Record kind and state
// ============================================

/// Whether a record is a plain issue or a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Issue,
    PullRequest,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Issue => "issue",
            IssueKind::PullRequest => "pull_request",
        }
    }
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Open/closed state as reported by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }
}

impl std::str::FromStr for IssueState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Ok(IssueState::Open),
            "closed" => Ok(IssueState::Closed),
            _ => Err(format!("unknown issue state: {}", s)),
        }
    }
}

// ============================================
// Priority
// ============================================

/// Priority levels an issue can carry.
///
/// Resolved once at normalization time; downstream code never looks at the
/// label strings again.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Satanic,
    #[default]
    Uncategorized,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Low,
        Priority::Medium,
        Priority::High,
        Priority::Satanic,
        Priority::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Satanic => "SATANIC",
            Priority::Uncategorized => "UNCATEGORIZED",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the priority scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityLevel {
    /// Priority this row defines
    pub priority: Priority,
    /// Label name that selects this priority (matched case-insensitively).
    /// `None` for levels that are never selected by a label (UNCATEGORIZED).
    #[serde(default)]
    pub label: Option<String>,
    /// Technical-debt weight
    pub weight: u32,
    /// Display color for renderers (`#rrggbb`)
    pub color: String,
}

/// Ordered priority table.
///
/// Declaration order matters: when two matching labels carry the same
/// weight, the one declared first wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityScale {
    levels: Vec<PriorityLevel>,
}

const UNCATEGORIZED_COLOR: &str = "#9e9e9e";

impl Default for PriorityScale {
    fn default() -> Self {
        let level = |priority, label: &str, weight, color: &str| PriorityLevel {
            priority,
            label: Some(label.to_string()),
            weight,
            color: color.to_string(),
        };
        Self {
            levels: vec![
                level(Priority::Low, "PRIORITY_LOW", 1, "#4caf50"),
                level(Priority::Medium, "PRIORITY_MEDIUM", 2, "#ffc107"),
                level(Priority::High, "PRIORITY_HIGH", 3, "#ff9800"),
                level(Priority::Satanic, "SATANIC", 5, "#b71c1c"),
                PriorityLevel {
                    priority: Priority::Uncategorized,
                    label: None,
                    weight: 0,
                    color: UNCATEGORIZED_COLOR.to_string(),
                },
            ],
        }
    }
}

impl PriorityScale {
    /// Build a scale from explicit levels, validating it.
    pub fn new(levels: Vec<PriorityLevel>) -> Result<Self> {
        let scale = Self { levels };
        scale.validate()?;
        Ok(scale)
    }

    /// Check that priorities and labels are declared at most once and that
    /// colors look like `#rrggbb`.
    pub fn validate(&self) -> Result<()> {
        for (i, level) in self.levels.iter().enumerate() {
            let earlier = &self.levels[..i];
            if earlier.iter().any(|l| l.priority == level.priority) {
                return Err(Error::Config(format!(
                    "priority {} is declared more than once",
                    level.priority
                )));
            }
            if let Some(label) = &level.label {
                if earlier
                    .iter()
                    .filter_map(|l| l.label.as_deref())
                    .any(|l| l.eq_ignore_ascii_case(label))
                {
                    return Err(Error::Config(format!(
                        "priority label {} is declared more than once",
                        label
                    )));
                }
            }
            if !is_hex_color(&level.color) {
                return Err(Error::Config(format!(
                    "priority {} has invalid color {:?} (expected #rrggbb)",
                    level.priority, level.color
                )));
            }
        }
        Ok(())
    }

    /// Levels in declaration order
    pub fn levels(&self) -> &[PriorityLevel] {
        &self.levels
    }

    /// Level for a priority, falling back to the UNCATEGORIZED level.
    pub fn level(&self, priority: Priority) -> Option<&PriorityLevel> {
        self.levels
            .iter()
            .find(|l| l.priority == priority)
            .or_else(|| {
                self.levels
                    .iter()
                    .find(|l| l.priority == Priority::Uncategorized)
            })
    }

    /// Weight of a priority. Unknown priorities score like UNCATEGORIZED,
    /// and an undeclared UNCATEGORIZED scores 0.
    pub fn weight(&self, priority: Priority) -> u32 {
        self.level(priority).map(|l| l.weight).unwrap_or(0)
    }

    /// Display color of a priority
    pub fn color(&self, priority: Priority) -> &str {
        self.level(priority)
            .map(|l| l.color.as_str())
            .unwrap_or(UNCATEGORIZED_COLOR)
    }

    /// Levels whose label matches one of `labels`, in declaration order.
    pub fn matching<'a, S: AsRef<str>>(
        &'a self,
        labels: &'a [S],
    ) -> impl Iterator<Item = &'a PriorityLevel> + 'a {
        self.levels.iter().filter(move |level| {
            level.label.as_deref().is_some_and(|name| {
                labels
                    .iter()
                    .any(|label| label.as_ref().eq_ignore_ascii_case(name))
            })
        })
    }

    /// Resolve the priority for a label set.
    ///
    /// The highest-weight match wins; ties go to the level declared first.
    pub fn resolve<S: AsRef<str>>(&self, labels: &[S]) -> Priority {
        let mut best: Option<&PriorityLevel> = None;
        for level in self.matching(labels) {
            match best {
                Some(current) if current.weight >= level.weight => {}
                _ => best = Some(level),
            }
        }
        best.map(|l| l.priority).unwrap_or(Priority::Uncategorized)
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit())
}

// ============================================
// Label classification
// ============================================

/// Rules for classifying labels beyond priority
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRules {
    /// Labels that mark an item as rejected (matched case-insensitively)
    #[serde(default = "default_rejection_labels")]
    pub rejection: Vec<String>,

    /// Prefix of department labels (e.g. `DEPT_BACKEND`)
    #[serde(default = "default_department_prefix")]
    pub department_prefix: Option<String>,

    /// Prefix of category labels (e.g. `TYPE_BUG`)
    #[serde(default = "default_category_prefix")]
    pub category_prefix: Option<String>,

    /// Prefix of story-point labels (e.g. `SP_3`)
    #[serde(default = "default_estimate_prefix")]
    pub estimate_prefix: Option<String>,
}

impl Default for LabelRules {
    fn default() -> Self {
        Self {
            rejection: default_rejection_labels(),
            department_prefix: default_department_prefix(),
            category_prefix: default_category_prefix(),
            estimate_prefix: default_estimate_prefix(),
        }
    }
}

fn default_rejection_labels() -> Vec<String> {
    ["REJECTED", "WONTFIX", "DUPLICATE", "INVALID"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_department_prefix() -> Option<String> {
    Some("DEPT_".to_string())
}

fn default_category_prefix() -> Option<String> {
    Some("TYPE_".to_string())
}

fn default_estimate_prefix() -> Option<String> {
    Some("SP_".to_string())
}

impl LabelRules {
    /// Classify a label set.
    pub fn classify<S: AsRef<str>>(&self, labels: &[S]) -> LabelClassification {
        let rejection = labels
            .iter()
            .map(AsRef::as_ref)
            .find(|label| self.rejection.iter().any(|r| r.eq_ignore_ascii_case(label)))
            .map(str::to_string);

        LabelClassification {
            rejection,
            department: first_with_prefix(labels, self.department_prefix.as_deref()),
            category: first_with_prefix(labels, self.category_prefix.as_deref()),
        }
    }

    /// Story points from the first parsable estimate label.
    pub fn estimate<S: AsRef<str>>(&self, labels: &[S]) -> Option<f64> {
        let prefix = self.estimate_prefix.as_deref()?;
        labels.iter().find_map(|label| {
            strip_prefix_ignore_case(label.as_ref(), prefix)
                .and_then(|rest| rest.trim().parse::<f64>().ok())
                .filter(|points| points.is_finite() && *points >= 0.0)
        })
    }
}

fn first_with_prefix<S: AsRef<str>>(labels: &[S], prefix: Option<&str>) -> Option<String> {
    let prefix = prefix?;
    labels.iter().find_map(|label| {
        strip_prefix_ignore_case(label.as_ref(), prefix)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    })
}

fn strip_prefix_ignore_case<'a>(label: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() || label.len() < prefix.len() || !label.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, rest) = label.split_at(prefix.len());
    head.eq_ignore_ascii_case(prefix).then_some(rest)
}

/// Label-derived metadata used by the rejection analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelClassification {
    /// Rejection label, when the item was rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
    /// Department suffix (label without the department prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Category suffix (label without the category prefix)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// ============================================
// IssueRecord
// ============================================

/// A normalized issue or pull request.
///
/// Immutable for the duration of a report run. Its serialized form is
/// accepted back by the normalizer and yields the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Tracker-wide unique id
    pub id: u64,
    /// Repository-local number (`#123`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// Title, kept for label search listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: IssueKind,
    /// Author handle
    pub author: String,
    pub created_at: DateTime<Utc>,
    /// Close timestamp; never earlier than `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub state: IssueState,
    /// Label names, de-duplicated, in payload order
    #[serde(default)]
    pub labels: Vec<String>,
    pub priority: Priority,
    /// Story points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default)]
    pub classification: LabelClassification,
}

impl IssueRecord {
    pub fn created_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn closed_date(&self) -> Option<NaiveDate> {
        self.closed_at.map(|at| at.date_naive())
    }

    pub fn is_pull_request(&self) -> bool {
        self.kind == IssueKind::PullRequest
    }

    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }

    /// Whether the record was still open at the start of `date`
    pub fn open_at(&self, date: NaiveDate) -> bool {
        self.created_date() < date && self.closed_date().map_or(true, |closed| closed >= date)
    }

    /// Case-insensitive label lookup
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scale_weights() {
        let scale = PriorityScale::default();
        assert_eq!(scale.weight(Priority::Low), 1);
        assert_eq!(scale.weight(Priority::Medium), 2);
        assert_eq!(scale.weight(Priority::High), 3);
        assert_eq!(scale.weight(Priority::Satanic), 5);
        assert_eq!(scale.weight(Priority::Uncategorized), 0);
        assert!(scale.validate().is_ok());
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let scale = PriorityScale::default();
        assert_eq!(scale.resolve(&["priority_high"]), Priority::High);
        assert_eq!(scale.resolve(&["Satanic", "bug"]), Priority::Satanic);
    }

    #[test]
    fn test_resolve_highest_weight_wins() {
        let scale = PriorityScale::default();
        assert_eq!(
            scale.resolve(&["PRIORITY_LOW", "SATANIC", "PRIORITY_HIGH"]),
            Priority::Satanic
        );
    }

    #[test]
    fn test_resolve_ties_use_declaration_order() {
        let scale = PriorityScale::new(vec![
            PriorityLevel {
                priority: Priority::Medium,
                label: Some("medium".to_string()),
                weight: 2,
                color: "#ffffff".to_string(),
            },
            PriorityLevel {
                priority: Priority::High,
                label: Some("high".to_string()),
                weight: 2,
                color: "#000000".to_string(),
            },
        ])
        .unwrap();
        assert_eq!(scale.resolve(&["high", "medium"]), Priority::Medium);
    }

    #[test]
    fn test_resolve_without_priority_label() {
        let scale = PriorityScale::default();
        assert_eq!(scale.resolve(&["bug", "docs"]), Priority::Uncategorized);
        let empty: [&str; 0] = [];
        assert_eq!(scale.resolve(&empty), Priority::Uncategorized);
    }

    #[test]
    fn test_missing_level_falls_back_to_uncategorized() {
        let scale = PriorityScale::new(vec![PriorityLevel {
            priority: Priority::High,
            label: Some("PRIORITY_HIGH".to_string()),
            weight: 3,
            color: "#ff9800".to_string(),
        }])
        .unwrap();
        assert_eq!(scale.weight(Priority::Low), 0);
        assert_eq!(scale.color(Priority::Low), "#9e9e9e");
    }

    #[test]
    fn test_scale_rejects_duplicates_and_bad_colors() {
        let level = PriorityLevel {
            priority: Priority::Low,
            label: Some("low".to_string()),
            weight: 1,
            color: "#00ff00".to_string(),
        };
        assert!(PriorityScale::new(vec![level.clone(), level.clone()]).is_err());

        let bad_color = PriorityLevel {
            color: "green".to_string(),
            ..level
        };
        assert!(matches!(
            PriorityScale::new(vec![bad_color]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_classify_labels() {
        let rules = LabelRules::default();
        let c = rules.classify(&["wontfix", "DEPT_Backend", "TYPE_BUG", "DEPT_Ops"]);
        assert_eq!(c.rejection.as_deref(), Some("wontfix"));
        assert_eq!(c.department.as_deref(), Some("Backend"));
        assert_eq!(c.category.as_deref(), Some("BUG"));

        let c = rules.classify(&["bug"]);
        assert_eq!(c, LabelClassification::default());
    }

    #[test]
    fn test_estimate_from_labels() {
        let rules = LabelRules::default();
        assert_eq!(rules.estimate(&["bug", "SP_3"]), Some(3.0));
        assert_eq!(rules.estimate(&["sp_0.5"]), Some(0.5));
        assert_eq!(rules.estimate(&["SP_x"]), None);

        let rules = LabelRules {
            estimate_prefix: None,
            ..LabelRules::default()
        };
        assert_eq!(rules.estimate(&["SP_3"]), None);
    }

    #[test]
    fn test_priority_serde_names() {
        let json = serde_json::to_string(&Priority::Uncategorized).unwrap();
        assert_eq!(json, "\"UNCATEGORIZED\"");
        let parsed: Priority = serde_json::from_str("\"SATANIC\"").unwrap();
        assert_eq!(parsed, Priority::Satanic);
    }
}
