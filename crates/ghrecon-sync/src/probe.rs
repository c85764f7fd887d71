//! Stored-state lookups.
//!
//! Two probe shapes exist: the exact-second probe used in scheduled
//! runs (the stored row at the candidate's observation second) and the
//! latest-state probe used in manual runs (the most recent stored row
//! regardless of time). Both order by (`updated_at` desc, `event_id`
//! desc) so the representative row for an instant is the one with the
//! highest event id.

use ghrecon_core::canonical_id_list;
use rusqlite::{params, OptionalExtension, Row};

use crate::store::{Store, StoreError};

/// The stored issue fields the divergence detector compares.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIssueState {
    pub milestone_id: Option<i64>,
    pub event_id: i64,
    pub closed_at: Option<String>,
    pub state: Option<String>,
    pub title: Option<String>,
    pub locked: Option<bool>,
    pub assignee_id: Option<i64>,
}

/// The stored pull-request fields the divergence detector compares.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrState {
    pub milestone_id: Option<i64>,
    pub event_id: i64,
    pub closed_at: Option<String>,
    pub state: Option<String>,
    pub title: Option<String>,
    pub assignee_id: Option<i64>,
    pub merged_by_id: Option<i64>,
    pub merged_at: Option<String>,
    pub merged: Option<bool>,
}

const ISSUE_STATE_COLUMNS: &str =
    "milestone_id, event_id, closed_at, state, title, locked, assignee_id";

const PR_STATE_COLUMNS: &str = "milestone_id, event_id, closed_at, state, title, assignee_id, \
                                merged_by_id, merged_at, merged";

fn issue_state_from_row(row: &Row<'_>) -> rusqlite::Result<StoredIssueState> {
    Ok(StoredIssueState {
        milestone_id: row.get(0)?,
        event_id: row.get(1)?,
        closed_at: row.get(2)?,
        state: row.get(3)?,
        title: row.get(4)?,
        locked: row.get(5)?,
        assignee_id: row.get(6)?,
    })
}

fn pr_state_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPrState> {
    Ok(StoredPrState {
        milestone_id: row.get(0)?,
        event_id: row.get(1)?,
        closed_at: row.get(2)?,
        state: row.get(3)?,
        title: row.get(4)?,
        assignee_id: row.get(5)?,
        merged_by_id: row.get(6)?,
        merged_at: row.get(7)?,
        merged: row.get(8)?,
    })
}

impl Store {
    /// Stored issue state at the exact observation second, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn issue_state_at(
        &self,
        issue_id: i64,
        second: &str,
    ) -> Result<Option<StoredIssueState>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "select {ISSUE_STATE_COLUMNS} from gha_issues \
             where id = ?1 and updated_at = ?2 \
             order by updated_at desc, event_id desc limit 1"
        );
        Ok(conn
            .query_row(&sql, params![issue_id, second], issue_state_from_row)
            .optional()?)
    }

    /// Most recent stored issue state, if any (manual mode).
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn latest_issue_state(
        &self,
        issue_id: i64,
    ) -> Result<Option<StoredIssueState>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "select {ISSUE_STATE_COLUMNS} from gha_issues \
             where id = ?1 \
             order by updated_at desc, event_id desc limit 1"
        );
        Ok(conn
            .query_row(&sql, params![issue_id], issue_state_from_row)
            .optional()?)
    }

    /// Stored pull-request state at the exact observation second, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn pr_state_at(
        &self,
        pr_id: i64,
        second: &str,
    ) -> Result<Option<StoredPrState>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "select {PR_STATE_COLUMNS} from gha_pull_requests \
             where id = ?1 and updated_at = ?2 \
             order by updated_at desc, event_id desc limit 1"
        );
        Ok(conn
            .query_row(&sql, params![pr_id, second], pr_state_from_row)
            .optional()?)
    }

    /// Most recent stored pull-request state, if any (manual mode).
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn latest_pr_state(&self, pr_id: i64) -> Result<Option<StoredPrState>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "select {PR_STATE_COLUMNS} from gha_pull_requests \
             where id = ?1 \
             order by updated_at desc, event_id desc limit 1"
        );
        Ok(conn
            .query_row(&sql, params![pr_id], pr_state_from_row)
            .optional()?)
    }

    /// Collision guard: true when a PR row already exists under this
    /// candidate's synthetic event id but with a different `updated_at`.
    /// Writing in that case would duplicate a snapshot differing only
    /// in timestamp metadata.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn pr_collision(
        &self,
        pr_id: i64,
        event_id: i64,
        updated_at: &str,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let found: Option<i64> = conn
            .query_row(
                "select 1 from gha_pull_requests \
                 where id = ?1 and event_id = ?2 and updated_at != ?3",
                params![pr_id, event_id, updated_at],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Canonical label-id list stored for an event.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn issue_label_ids(&self, event_id: i64) -> Result<String, StoreError> {
        self.id_list(
            "select label_id from gha_issues_labels where event_id = ?1 order by label_id",
            event_id,
        )
    }

    /// Canonical assignee-id list stored for an issue event.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn issue_assignee_ids(&self, event_id: i64) -> Result<String, StoreError> {
        self.id_list(
            "select assignee_id from gha_issues_assignees where event_id = ?1 \
             order by assignee_id",
            event_id,
        )
    }

    /// Canonical assignee-id list stored for a pull-request event.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn pr_assignee_ids(&self, event_id: i64) -> Result<String, StoreError> {
        self.id_list(
            "select assignee_id from gha_pull_requests_assignees where event_id = ?1 \
             order by assignee_id",
            event_id,
        )
    }

    /// Canonical requested-reviewer-id list stored for a pull-request
    /// event.
    ///
    /// # Errors
    ///
    /// Returns an error on any driver failure.
    pub fn pr_reviewer_ids(&self, event_id: i64) -> Result<String, StoreError> {
        self.id_list(
            "select requested_reviewer_id from gha_pull_requests_requested_reviewers \
             where event_id = ?1 order by requested_reviewer_id",
            event_id,
        )
    }

    /// Reads an id column for one event and renders it in canonical
    /// join-list form. The sort happens in Rust so the stored form is
    /// byte-identical to the candidate side regardless of driver
    /// aggregation order.
    fn id_list(&self, sql: &str, event_id: i64) -> Result<String, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![event_id], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(canonical_id_list(ids))
    }
}
