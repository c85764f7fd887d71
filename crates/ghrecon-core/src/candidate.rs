//! Reconciliation candidates and batch normalization.
//!
//! The harvester constructs one [`IssueCandidate`] per (issue, event)
//! observation and one [`PrCandidate`] per pull request, bundles them
//! into a [`Batch`], and hands the batch to the orchestrator. Candidates
//! are consumed once and discarded.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{RemoteIssue, RemoteIssueEvent, RemotePullRequest};
use crate::timefmt::to_ymd_hms;

/// One (issue, event) observation carrying the desired post-state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCandidate {
    /// Repository name in `org/repo` form.
    pub repo: String,
    /// Issue number within the repository.
    pub number: i64,
    /// Issue id (stable across renames).
    pub issue_id: i64,
    /// True when the issue is the issue-side view of a pull request.
    pub is_pr: bool,
    /// Milestone id, if a milestone is attached.
    pub milestone_id: Option<i64>,
    /// Canonical label-id list: ascending ids, comma-joined, no spaces.
    pub labels: String,
    /// Label id → label name.
    pub labels_map: BTreeMap<i64, String>,
    /// Full remote issue object.
    pub issue: RemoteIssue,
    /// Observation timestamp.
    pub observed_at: DateTime<Utc>,
    /// Real source event id.
    pub event_id: i64,
    /// Event type string (`closed`, `labeled`, ...).
    pub event_type: String,
    /// Full remote event object.
    pub event: RemoteIssueEvent,
    /// Single-assignee id, if any.
    pub assignee_id: Option<i64>,
    /// Canonical assignee-id list: ascending ids, comma-joined, no spaces.
    pub assignees: String,
    /// Assignee id → login.
    pub assignees_map: BTreeMap<i64, String>,
}

impl fmt::Display for IssueCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{repo: {}, number: {}, issue_id: {}, event_id: {}, event_type: {}, pr: {}, \
             milestone_id: {}, assignee_id: {}, observed_at: {}, labels: [{}], assignees: [{}]}}",
            self.repo,
            self.number,
            self.issue_id,
            self.event_id,
            self.event_type,
            self.is_pr,
            self.milestone_id.unwrap_or(0),
            self.assignee_id.unwrap_or(0),
            to_ymd_hms(self.observed_at),
            self.labels,
            self.assignees,
        )
    }
}

/// A pull-request observation: the remote PR object plus the issue id it
/// hangs off. Its observation timestamp is the PR's `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrCandidate {
    pub issue_id: i64,
    pub pr: RemotePullRequest,
}

impl PrCandidate {
    /// Observation timestamp of the PR state.
    #[must_use]
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.pr.updated_at
    }
}

/// The unit of a reconciliation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Batch {
    /// Issue id → ordered observations of that issue.
    #[serde(default)]
    pub issues: BTreeMap<i64, Vec<IssueCandidate>>,
    /// Issue id → the pull request hanging off it.
    #[serde(default)]
    pub prs: BTreeMap<i64, PrCandidate>,
}

impl Batch {
    /// Total number of issue candidates across all issue ids.
    #[must_use]
    pub fn issue_candidates(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }
}

/// Builds the canonical join-list form of a set of integer ids:
/// ascending, deduplicated, comma-joined, no spaces.
///
/// Divergence comparison is exact string equality against this form, so
/// it must stay byte-identical to what other readers of the store
/// produce.
#[must_use]
pub fn canonical_id_list<I>(ids: I) -> String
where
    I: IntoIterator<Item = i64>,
{
    let mut ids: Vec<i64> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let mut out = String::new();
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out
}

/// Collapses same-second observations of one issue to a single
/// representative (non-manual mode only).
///
/// Candidates are sorted by (issue-id, observation time, event id)
/// ascending, then grouped by the `YYYY-MM-DD HH:MM:SS` form of the
/// observation time; the last candidate of each group (highest real
/// event id) wins. The result is ordered by second, one entry per
/// second.
#[must_use]
pub fn collapse_same_second(mut candidates: Vec<IssueCandidate>) -> Vec<IssueCandidate> {
    candidates.sort_by(|a, b| {
        (a.issue_id, a.observed_at, a.event_id).cmp(&(b.issue_id, b.observed_at, b.event_id))
    });
    let mut by_second: BTreeMap<String, IssueCandidate> = BTreeMap::new();
    for candidate in candidates {
        by_second.insert(to_ymd_hms(candidate.observed_at), candidate);
    }
    by_second.into_values().collect()
}
