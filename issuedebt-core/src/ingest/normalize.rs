//! Raw payload → [`IssueRecord`] normalization
//!
//! Two payload shapes are accepted:
//!
//! - GitHub REST issue objects (`user.login`, `labels[].name`, a
//!   `pull_request` object on pull requests)
//! - the serialized form of an [`IssueRecord`] (`author`, plain label
//!   strings, explicit `kind`)
//!
//! Accepting the second shape makes normalization idempotent: a record
//! re-normalized from its own JSON comes back unchanged.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::MalformedRecord;
use crate::types::{IssueKind, IssueRecord, IssueState, LabelRules, PriorityScale};

/// Loosely-typed view of a payload.
///
/// Everything is optional so that missing fields surface as
/// [`MalformedRecord`] with a precise reason instead of a serde error.
#[derive(Debug, Deserialize)]
struct RawIssue {
    id: Option<u64>,
    number: Option<u64>,
    title: Option<String>,
    user: Option<RawUser>,
    author: Option<String>,
    created_at: Option<String>,
    closed_at: Option<String>,
    state: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    kind: Option<IssueKind>,
    pull_request: Option<serde_json::Value>,
    estimate: Option<f64>,
    story_points: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Named { name: String },
    Plain(String),
}

impl RawLabel {
    fn into_name(self) -> String {
        match self {
            RawLabel::Named { name } => name,
            RawLabel::Plain(name) => name,
        }
    }
}

/// Outcome of normalizing a batch of payloads.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// Records that normalized cleanly, in payload order
    pub records: Vec<IssueRecord>,
    /// Payloads that were skipped
    pub malformed: Vec<MalformedRecord>,
}

/// Converts raw payloads into canonical records.
///
/// Holds the injected lookup tables; otherwise a pure transform.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    scale: PriorityScale,
    rules: LabelRules,
}

impl Normalizer {
    pub fn new(scale: PriorityScale, rules: LabelRules) -> Self {
        Self { scale, rules }
    }

    pub fn scale(&self) -> &PriorityScale {
        &self.scale
    }

    pub fn rules(&self) -> &LabelRules {
        &self.rules
    }

    /// Normalize one payload.
    pub fn normalize(&self, payload: &serde_json::Value) -> Result<IssueRecord, MalformedRecord> {
        let raw = RawIssue::deserialize(payload).map_err(|e| {
            let id = payload.get("id").and_then(serde_json::Value::as_u64);
            MalformedRecord::new(id, format!("unexpected payload shape: {}", e))
        })?;

        let id = raw
            .id
            .ok_or_else(|| MalformedRecord::new(None, "missing id"))?;

        let author = raw
            .author
            .or_else(|| raw.user.and_then(|u| u.login))
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| MalformedRecord::new(Some(id), "missing author"))?;

        let created_at = match raw.created_at.as_deref() {
            Some(value) => parse_timestamp(id, "created_at", value)?,
            None => return Err(MalformedRecord::new(Some(id), "missing created_at")),
        };
        let closed_at = raw
            .closed_at
            .as_deref()
            .map(|value| parse_timestamp(id, "closed_at", value))
            .transpose()?;

        let state = match raw.state.as_deref() {
            Some(value) => value
                .parse::<IssueState>()
                .map_err(|e| MalformedRecord::new(Some(id), e))?,
            None if closed_at.is_some() => IssueState::Closed,
            None => IssueState::Open,
        };

        // A reopened item keeps its old close timestamp on GitHub.
        let closed_at = match state {
            IssueState::Open => None,
            IssueState::Closed => closed_at,
        };

        if let Some(closed) = closed_at {
            if closed < created_at {
                return Err(MalformedRecord::new(
                    Some(id),
                    format!("closed_at {} is before created_at {}", closed, created_at),
                ));
            }
        }

        let kind = raw.kind.unwrap_or(match raw.pull_request {
            Some(ref value) if !value.is_null() => IssueKind::PullRequest,
            _ => IssueKind::Issue,
        });

        let mut labels: Vec<String> = Vec::with_capacity(raw.labels.len());
        for label in raw.labels.into_iter().map(RawLabel::into_name) {
            let label = label.trim().to_string();
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }

        let estimate = raw
            .estimate
            .or(raw.story_points)
            .filter(|points| points.is_finite() && *points >= 0.0)
            .or_else(|| self.rules.estimate(&labels));

        Ok(IssueRecord {
            id,
            number: raw.number,
            title: raw.title,
            kind,
            author,
            created_at,
            closed_at,
            state,
            priority: self.scale.resolve(&labels),
            classification: self.rules.classify(&labels),
            labels,
            estimate,
        })
    }

    /// Normalize a batch, skipping malformed payloads.
    ///
    /// Each skipped payload is logged; the batch itself never fails.
    pub fn normalize_batch<'a, I>(&self, payloads: I) -> NormalizeOutcome
    where
        I: IntoIterator<Item = &'a serde_json::Value>,
    {
        let mut outcome = NormalizeOutcome::default();

        for payload in payloads {
            match self.normalize(payload) {
                Ok(record) => outcome.records.push(record),
                Err(e) => {
                    tracing::warn!(id = ?e.id, reason = %e.reason, "Skipping malformed record");
                    outcome.malformed.push(e);
                }
            }
        }

        tracing::debug!(
            records = outcome.records.len(),
            malformed = outcome.malformed.len(),
            "Normalized batch"
        );
        outcome
    }
}

fn parse_timestamp(id: u64, field: &str, value: &str) -> Result<DateTime<Utc>, MalformedRecord> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| {
            MalformedRecord::new(Some(id), format!("invalid {} {:?}: {}", field, value, e))
        })
}
