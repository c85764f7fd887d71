//! Field-level divergence detection.
//!
//! Given a candidate post-state and the stored row it should match,
//! compute which fields differ. Nullability is three-valued: both
//! absent is equal, one absent is different, both present compare by
//! value. Timestamps compare at second precision through their
//! formatted form, which absorbs sub-second drift between the API and
//! the event stream.

use std::fmt;

use chrono::{DateTime, Utc};
use ghrecon_core::candidate::IssueCandidate;
use ghrecon_core::canonical_id_list;
use ghrecon_core::model::RemotePullRequest;
use ghrecon_core::timefmt::to_ymd_hms;

use crate::probe::{StoredIssueState, StoredPrState};

/// One diverging field, rendered stored → candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDelta {
    /// Field name (`state`, `title`, `labels`, ...).
    pub field: &'static str,
    /// Stored value, `null` when absent.
    pub from: String,
    /// Candidate value, `null` when absent.
    pub to: String,
}

impl fmt::Display for FieldDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// The set of fields on which a candidate diverges from storage.
#[derive(Debug, Clone, Default)]
pub struct Divergence {
    /// Diverging fields, in comparison order.
    pub deltas: Vec<FieldDelta>,
}

impl Divergence {
    /// True when at least one field diverges.
    #[must_use]
    pub fn any_changed(&self) -> bool {
        !self.deltas.is_empty()
    }

    fn note(&mut self, field: &'static str, from: String, to: String) {
        self.deltas.push(FieldDelta { field, from, to });
    }

    fn cmp_opt_str(&mut self, field: &'static str, stored: Option<&str>, api: Option<&str>) {
        if stored != api {
            self.note(field, render_opt(stored), render_opt(api));
        }
    }

    fn cmp_opt_i64(&mut self, field: &'static str, stored: Option<i64>, api: Option<i64>) {
        if stored != api {
            self.note(
                field,
                render_opt(stored.map(|v| v.to_string()).as_deref()),
                render_opt(api.map(|v| v.to_string()).as_deref()),
            );
        }
    }

    fn cmp_opt_bool(&mut self, field: &'static str, stored: Option<bool>, api: Option<bool>) {
        if stored != api {
            self.note(
                field,
                render_opt(stored.map(|v| v.to_string()).as_deref()),
                render_opt(api.map(|v| v.to_string()).as_deref()),
            );
        }
    }

    /// Stored timestamps are already in second form; the candidate side
    /// is formatted the same way before comparing.
    fn cmp_opt_time(
        &mut self,
        field: &'static str,
        stored: Option<&str>,
        api: Option<DateTime<Utc>>,
    ) {
        let api = api.map(to_ymd_hms);
        self.cmp_opt_str(field, stored, api.as_deref());
    }

    /// Canonical join-lists compare by exact string equality.
    fn cmp_list(&mut self, field: &'static str, stored: &str, api: &str) {
        if stored != api {
            self.note(field, stored.to_string(), api.to_string());
        }
    }
}

fn render_opt(value: Option<&str>) -> String {
    value.map_or_else(|| "null".to_string(), ToString::to_string)
}

/// Compares an issue candidate against its stored state.
///
/// `stored_labels` and `stored_assignees` are the canonical join-lists
/// read for the stored row's event id.
#[must_use]
pub fn diff_issue(
    candidate: &IssueCandidate,
    stored: &StoredIssueState,
    stored_labels: &str,
    stored_assignees: &str,
) -> Divergence {
    let issue = &candidate.issue;
    let mut div = Divergence::default();
    div.cmp_opt_str("state", stored.state.as_deref(), issue.state.as_deref());
    div.cmp_opt_str("title", stored.title.as_deref(), issue.title.as_deref());
    div.cmp_opt_bool("locked", stored.locked, issue.locked);
    div.cmp_opt_time("closed_at", stored.closed_at.as_deref(), issue.closed_at);
    div.cmp_opt_i64("milestone", stored.milestone_id, candidate.milestone_id);
    div.cmp_opt_i64("assignee", stored.assignee_id, candidate.assignee_id);
    div.cmp_list("labels", stored_labels, &candidate.labels);
    div.cmp_list("assignees", stored_assignees, &candidate.assignees);
    div
}

/// Compares a pull-request candidate against its stored state.
///
/// Labels live on the carrying issue, so the candidate's canonical
/// label list comes from `carrier`; assignees and requested reviewers
/// come from the PR object itself.
#[must_use]
pub fn diff_pr(
    carrier: &IssueCandidate,
    pr: &RemotePullRequest,
    stored: &StoredPrState,
    stored_labels: &str,
    stored_assignees: &str,
    stored_reviewers: &str,
) -> Divergence {
    let mut div = Divergence::default();
    div.cmp_opt_str("state", stored.state.as_deref(), pr.state.as_deref());
    div.cmp_opt_str("title", stored.title.as_deref(), pr.title.as_deref());
    div.cmp_opt_bool("merged", stored.merged, pr.merged);
    div.cmp_opt_time("closed_at", stored.closed_at.as_deref(), pr.closed_at);
    div.cmp_opt_time("merged_at", stored.merged_at.as_deref(), pr.merged_at);
    div.cmp_opt_i64("milestone", stored.milestone_id, pr.milestone_id());
    div.cmp_opt_i64("assignee", stored.assignee_id, pr.assignee_id());
    div.cmp_opt_i64("merged_by", stored.merged_by_id, pr.merged_by_id());
    div.cmp_list("labels", stored_labels, &carrier.labels);
    div.cmp_list(
        "assignees",
        stored_assignees,
        &canonical_id_list(pr.assignees.iter().map(|u| u.id)),
    );
    div.cmp_list(
        "requested_reviewers",
        stored_reviewers,
        &canonical_id_list(pr.requested_reviewers.iter().map(|u| u.id)),
    );
    div
}
