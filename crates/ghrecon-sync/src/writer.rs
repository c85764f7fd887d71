//! The transactional snapshot writer.
//!
//! One reconciliation decision produces one bundle: a fresh issue or
//! pull-request snapshot under a synthetic event id, the synthetic
//! top-level event and payload rows, and the label / assignee /
//! requested-reviewer join rows, all committed in a single transaction.
//! Statement order satisfies the foreign-key dependencies: actors →
//! milestone → entity snapshot → event → payload → joins.
//!
//! Writes are insert-if-absent wherever the schema carries a uniqueness
//! key, so re-running the same decision never double-inserts; a rerun
//! that still diverges mints a new synthetic id in a new second instead.

use std::sync::Arc;

use ghrecon_core::candidate::IssueCandidate;
use ghrecon_core::ids::synthetic_event_id;
use ghrecon_core::model::{RemoteMilestone, RemotePullRequest, RemoteUser};
use ghrecon_core::redact::HideSet;
use ghrecon_core::timefmt::to_ymd_hms;
use rusqlite::{params, Transaction};
use tracing::debug;

use crate::store::{Store, StoreError};

/// Issue and milestone bodies are truncated to this many bytes.
const MAX_BODY_LEN: usize = 0xffff;

/// Milestone titles are truncated to this many bytes.
const MAX_TITLE_LEN: usize = 200;

/// Writes snapshot bundles for reconciled candidates.
pub struct SnapshotWriter {
    store: Store,
    hide: Arc<HideSet>,
    skip_writes: bool,
}

impl SnapshotWriter {
    /// Creates a writer. With `skip_writes` set every write is replaced
    /// by a log line (dry runs).
    #[must_use]
    pub fn new(store: Store, hide: Arc<HideSet>, skip_writes: bool) -> Self {
        Self {
            store,
            hide,
            skip_writes,
        }
    }

    /// Writes the full synthetic bundle for an issue candidate.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure; the transaction rolls
    /// back and no partial bundle remains.
    pub fn write_issue_snapshot(&self, candidate: &IssueCandidate) -> Result<(), StoreError> {
        if self.skip_writes {
            debug!(candidate = %candidate, "skip-writes set, not writing issue snapshot");
            return Ok(());
        }
        let event_id = synthetic_event_id(candidate.event_id);
        let issue = &candidate.issue;
        let observed = to_ymd_hms(candidate.observed_at);

        let mut conn = self.store.lock()?;
        let tx = conn.transaction()?;

        upsert_actor(&tx, issue.assignee.as_ref(), &self.hide)?;
        upsert_actor(&tx, issue.user.as_ref(), &self.hide)?;
        for assignee in &issue.assignees {
            upsert_actor(&tx, Some(assignee), &self.hide)?;
        }
        if let Some(milestone) = &issue.milestone {
            upsert_actor(&tx, milestone.creator.as_ref(), &self.hide)?;
            upsert_milestone(&tx, milestone, candidate, event_id, &self.hide)?;
        }

        tx.execute(
            "insert into gha_issues(\
             id, event_id, assignee_id, body, closed_at, comments, created_at, \
             locked, milestone_id, number, state, title, updated_at, user_id, \
             dup_actor_id, dup_actor_login, dup_repo_id, dup_repo_name, dup_type, dup_created_at, \
             dup_user_login, dupn_assignee_login, is_pull_request) \
             values(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, \
             ?15, ?16, (select max(id) from gha_repos where name = ?17), ?18, ?19, ?20, \
             ?21, ?22, ?23)",
            params![
                candidate.issue_id,
                event_id,
                actor_id(issue.assignee.as_ref()),
                issue.body.as_deref().map(|b| trunc(b, MAX_BODY_LEN)),
                issue.closed_at.map(to_ymd_hms),
                issue.comments,
                to_ymd_hms(issue.created_at),
                issue.locked,
                candidate.milestone_id,
                issue.number,
                issue.state,
                issue.title,
                observed,
                actor_id(issue.user.as_ref()),
                actor_id(candidate.event.actor.as_ref()),
                actor_login(candidate.event.actor.as_ref(), &self.hide),
                candidate.repo,
                candidate.repo,
                candidate.event_type,
                observed,
                actor_login(issue.user.as_ref(), &self.hide),
                actor_login(issue.assignee.as_ref(), &self.hide),
                issue.is_pull_request(),
            ],
        )?;

        insert_event_row(&tx, candidate, event_id, &self.hide)?;
        insert_payload_row(&tx, candidate, event_id, None, &self.hide)?;

        for (label_id, label_name) in &candidate.labels_map {
            tx.execute(
                "insert or ignore into gha_issues_labels(issue_id, event_id, label_id, \
                 dup_actor_id, dup_actor_login, dup_repo_id, dup_repo_name, \
                 dup_type, dup_created_at, dup_issue_number, dup_label_name) \
                 values(?1, ?2, ?3, ?4, ?5, (select max(id) from gha_repos where name = ?6), \
                 ?7, ?8, ?9, ?10, ?11)",
                params![
                    candidate.issue_id,
                    event_id,
                    label_id,
                    actor_id(candidate.event.actor.as_ref()),
                    actor_login(candidate.event.actor.as_ref(), &self.hide),
                    candidate.repo,
                    candidate.repo,
                    candidate.event_type,
                    observed,
                    candidate.number,
                    label_name,
                ],
            )?;
        }

        for assignee_id in candidate.assignees_map.keys() {
            tx.execute(
                "insert or ignore into gha_issues_assignees(issue_id, event_id, assignee_id) \
                 values(?1, ?2, ?3)",
                params![candidate.issue_id, event_id, assignee_id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Writes the full synthetic bundle for a pull-request candidate.
    ///
    /// `carrier` is the issue candidate the PR hangs off; its event
    /// supplies the synthetic id, event type, and actor context.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure; the transaction rolls
    /// back and no partial bundle remains.
    pub fn write_pr_snapshot(
        &self,
        carrier: &IssueCandidate,
        pr: &RemotePullRequest,
    ) -> Result<(), StoreError> {
        if self.skip_writes {
            debug!(pr_id = pr.id, candidate = %carrier, "skip-writes set, not writing PR snapshot");
            return Ok(());
        }
        let event_id = synthetic_event_id(carrier.event_id);
        let observed = to_ymd_hms(carrier.observed_at);

        let mut conn = self.store.lock()?;
        let tx = conn.transaction()?;

        upsert_actor(&tx, pr.user.as_ref(), &self.hide)?;
        upsert_actor(&tx, pr.merged_by.as_ref(), &self.hide)?;
        upsert_actor(&tx, pr.assignee.as_ref(), &self.hide)?;
        if let Some(milestone) = &pr.milestone {
            upsert_actor(&tx, milestone.creator.as_ref(), &self.hide)?;
            upsert_milestone(&tx, milestone, carrier, event_id, &self.hide)?;
        }

        let base_sha = pr.base.as_ref().and_then(|b| b.sha.as_deref()).unwrap_or("");
        let head_sha = pr.head.as_ref().and_then(|h| h.sha.as_deref()).unwrap_or("");

        tx.execute(
            "insert into gha_pull_requests(\
             id, event_id, user_id, base_sha, head_sha, merged_by_id, assignee_id, milestone_id, \
             number, state, title, body, created_at, updated_at, closed_at, merged_at, \
             merge_commit_sha, merged, mergeable, mergeable_state, comments, \
             maintainer_can_modify, commits, additions, deletions, changed_files, \
             dup_actor_id, dup_actor_login, dup_repo_id, dup_repo_name, dup_type, dup_created_at, \
             dup_user_login, dupn_assignee_login, dupn_merged_by_login) \
             values(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, \
             ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21, \
             ?22, ?23, ?24, ?25, ?26, \
             ?27, ?28, (select max(id) from gha_repos where name = ?29), ?30, ?31, ?32, \
             ?33, ?34, ?35)",
            params![
                pr.id,
                event_id,
                actor_id(pr.user.as_ref()),
                base_sha,
                head_sha,
                actor_id(pr.merged_by.as_ref()),
                actor_id(pr.assignee.as_ref()),
                pr.milestone_id(),
                pr.number,
                pr.state,
                pr.title,
                pr.body.as_deref().map(|b| trunc(b, MAX_BODY_LEN)),
                pr.created_at.map(to_ymd_hms),
                to_ymd_hms(pr.updated_at),
                pr.closed_at.map(to_ymd_hms),
                pr.merged_at.map(to_ymd_hms),
                pr.merge_commit_sha,
                pr.merged,
                pr.mergeable,
                pr.mergeable_state,
                pr.comments,
                pr.maintainer_can_modify,
                pr.commits,
                pr.additions,
                pr.deletions,
                pr.changed_files,
                actor_id(carrier.event.actor.as_ref()),
                actor_login(carrier.event.actor.as_ref(), &self.hide),
                carrier.repo,
                carrier.repo,
                carrier.event_type,
                observed,
                actor_login(pr.user.as_ref(), &self.hide),
                actor_login(pr.assignee.as_ref(), &self.hide),
                actor_login(pr.merged_by.as_ref(), &self.hide),
            ],
        )?;

        insert_event_row(&tx, carrier, event_id, &self.hide)?;
        insert_payload_row(&tx, carrier, event_id, Some(pr.id), &self.hide)?;

        // An earlier issue-mode pass may have written this payload
        // without knowing the PR id.
        tx.execute(
            "update gha_payloads set pull_request_id = ?1 where issue_id = ?2 and event_id = ?3",
            params![pr.id, carrier.issue_id, event_id],
        )?;

        for assignee in &pr.assignees {
            upsert_actor(&tx, Some(assignee), &self.hide)?;
            tx.execute(
                "insert or ignore into gha_pull_requests_assignees(\
                 pull_request_id, event_id, assignee_id) values(?1, ?2, ?3)",
                params![pr.id, event_id, assignee.id],
            )?;
        }

        for reviewer in &pr.requested_reviewers {
            upsert_actor(&tx, Some(reviewer), &self.hide)?;
            tx.execute(
                "insert or ignore into gha_pull_requests_requested_reviewers(\
                 pull_request_id, event_id, requested_reviewer_id) values(?1, ?2, ?3)",
                params![pr.id, event_id, reviewer.id],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

fn actor_id(user: Option<&RemoteUser>) -> Option<i64> {
    user.map(|u| u.id)
}

fn actor_login(user: Option<&RemoteUser>, hide: &HideSet) -> Option<String> {
    user.and_then(|u| u.login.as_deref())
        .map(|login| hide.maybe_hide(login))
}

fn upsert_actor(
    tx: &Transaction<'_>,
    user: Option<&RemoteUser>,
    hide: &HideSet,
) -> Result<(), rusqlite::Error> {
    let Some(user) = user else { return Ok(()) };
    let Some(login) = user.login.as_deref() else {
        return Ok(());
    };
    tx.execute(
        "insert or ignore into gha_actors(id, login, name) values(?1, ?2, '')",
        params![user.id, hide.maybe_hide(login)],
    )?;
    Ok(())
}

fn upsert_milestone(
    tx: &Transaction<'_>,
    milestone: &RemoteMilestone,
    candidate: &IssueCandidate,
    event_id: i64,
    hide: &HideSet,
) -> Result<(), rusqlite::Error> {
    let observed = to_ymd_hms(candidate.observed_at);
    tx.execute(
        "insert or ignore into gha_milestones(\
         id, event_id, closed_at, closed_issues, created_at, creator_id, \
         description, due_on, number, open_issues, state, title, updated_at, \
         dup_actor_id, dup_actor_login, dup_repo_id, dup_repo_name, dup_type, dup_created_at, \
         dupn_creator_login) \
         values(?1, ?2, ?3, ?4, ?5, ?6, \
         ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
         ?14, ?15, (select max(id) from gha_repos where name = ?16), ?17, ?18, ?19, \
         ?20)",
        params![
            milestone.id,
            event_id,
            milestone.closed_at.map(to_ymd_hms),
            milestone.closed_issues,
            milestone.created_at.map(to_ymd_hms),
            actor_id(milestone.creator.as_ref()),
            milestone.description.as_deref().map(|d| trunc(d, MAX_BODY_LEN)),
            milestone.due_on.map(to_ymd_hms),
            milestone.number,
            milestone.open_issues,
            milestone.state,
            milestone.title.as_deref().map(|t| trunc(t, MAX_TITLE_LEN)),
            milestone.updated_at.map(to_ymd_hms),
            actor_id(candidate.event.actor.as_ref()),
            actor_login(candidate.event.actor.as_ref(), hide),
            candidate.repo,
            candidate.repo,
            candidate.event_type,
            observed,
            actor_login(milestone.creator.as_ref(), hide),
        ],
    )?;
    Ok(())
}

fn insert_event_row(
    tx: &Transaction<'_>,
    candidate: &IssueCandidate,
    event_id: i64,
    hide: &HideSet,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "insert or ignore into gha_events(\
         id, type, actor_id, repo_id, public, created_at, \
         dup_actor_login, dup_repo_name, org_id, forkee_id) \
         values(?1, ?2, ?3, (select max(id) from gha_repos where name = ?4), true, ?5, \
         ?6, ?7, (select max(org_id) from gha_repos where name = ?8), null)",
        params![
            event_id,
            candidate.event_type,
            actor_id(candidate.event.actor.as_ref()),
            candidate.repo,
            to_ymd_hms(candidate.observed_at),
            actor_login(candidate.event.actor.as_ref(), hide),
            candidate.repo,
            candidate.repo,
        ],
    )?;
    Ok(())
}

fn insert_payload_row(
    tx: &Transaction<'_>,
    candidate: &IssueCandidate,
    event_id: i64,
    pr_id: Option<i64>,
    hide: &HideSet,
) -> Result<(), rusqlite::Error> {
    tx.execute(
        "insert or ignore into gha_payloads(\
         event_id, push_id, size, \"ref\", head, befor, action, \
         issue_id, pull_request_id, comment_id, ref_type, master_branch, \"commit\", \
         description, number, forkee_id, release_id, member_id, \
         dup_actor_id, dup_actor_login, dup_repo_id, dup_repo_name, dup_type, dup_created_at) \
         values(?1, null, null, null, null, null, ?2, \
         ?3, ?4, null, null, null, null, \
         null, ?5, null, null, null, \
         ?6, ?7, (select max(id) from gha_repos where name = ?8), ?9, ?10, ?11)",
        params![
            event_id,
            candidate.event_type,
            candidate.issue_id,
            pr_id,
            candidate.issue.number,
            actor_id(candidate.event.actor.as_ref()),
            actor_login(candidate.event.actor.as_ref(), hide),
            candidate.repo,
            candidate.repo,
            candidate.event_type,
            to_ymd_hms(candidate.observed_at),
        ],
    )?;
    Ok(())
}

/// Byte-length truncation that never splits a UTF-8 character.
fn trunc(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
