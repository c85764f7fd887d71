//! Shared test support: schema bootstrap and candidate builders.
//!
//! The production schema is owned by the bulk importer; this is the
//! minimal shape the engine relies on, including the uniqueness keys
//! that give inserts their if-absent semantics.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use ghrecon_core::candidate::{IssueCandidate, PrCandidate};
use ghrecon_core::model::{RemoteIssueEvent, RemotePullRequest, RemoteUser};
use ghrecon_sync::Store;
use rusqlite::Connection;

pub const SCHEMA_SQL: &str = r#"
    CREATE TABLE gha_repos (
        id INTEGER NOT NULL,
        name TEXT NOT NULL,
        org_id INTEGER,
        org_login TEXT,
        PRIMARY KEY (id, name)
    );

    CREATE TABLE gha_actors (
        id INTEGER NOT NULL PRIMARY KEY,
        login TEXT NOT NULL,
        name TEXT
    );

    CREATE TABLE gha_events (
        id INTEGER NOT NULL PRIMARY KEY,
        type TEXT NOT NULL,
        actor_id INTEGER,
        repo_id INTEGER,
        public INTEGER,
        created_at TEXT NOT NULL,
        dup_actor_login TEXT,
        dup_repo_name TEXT,
        org_id INTEGER,
        forkee_id INTEGER
    );

    CREATE TABLE gha_payloads (
        event_id INTEGER NOT NULL PRIMARY KEY,
        push_id INTEGER, size INTEGER, "ref" TEXT, head TEXT, befor TEXT,
        action TEXT,
        issue_id INTEGER, pull_request_id INTEGER, comment_id INTEGER,
        ref_type TEXT, master_branch TEXT, "commit" TEXT,
        description TEXT, number INTEGER, forkee_id INTEGER,
        release_id INTEGER, member_id INTEGER,
        dup_actor_id INTEGER, dup_actor_login TEXT,
        dup_repo_id INTEGER, dup_repo_name TEXT,
        dup_type TEXT, dup_created_at TEXT
    );

    CREATE TABLE gha_issues (
        id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        assignee_id INTEGER, body TEXT, closed_at TEXT, comments INTEGER,
        created_at TEXT NOT NULL,
        locked INTEGER, milestone_id INTEGER, number INTEGER,
        state TEXT, title TEXT,
        updated_at TEXT NOT NULL,
        user_id INTEGER,
        dup_actor_id INTEGER, dup_actor_login TEXT,
        dup_repo_id INTEGER, dup_repo_name TEXT,
        dup_type TEXT, dup_created_at TEXT,
        dup_user_login TEXT, dupn_assignee_login TEXT,
        is_pull_request INTEGER,
        PRIMARY KEY (id, event_id)
    );

    CREATE TABLE gha_pull_requests (
        id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        user_id INTEGER, base_sha TEXT, head_sha TEXT,
        merged_by_id INTEGER, assignee_id INTEGER, milestone_id INTEGER,
        number INTEGER, state TEXT, title TEXT, body TEXT,
        created_at TEXT, updated_at TEXT NOT NULL,
        closed_at TEXT, merged_at TEXT,
        merge_commit_sha TEXT, merged INTEGER, mergeable INTEGER,
        mergeable_state TEXT, comments INTEGER,
        maintainer_can_modify INTEGER, commits INTEGER,
        additions INTEGER, deletions INTEGER, changed_files INTEGER,
        dup_actor_id INTEGER, dup_actor_login TEXT,
        dup_repo_id INTEGER, dup_repo_name TEXT,
        dup_type TEXT, dup_created_at TEXT,
        dup_user_login TEXT, dupn_assignee_login TEXT, dupn_merged_by_login TEXT,
        PRIMARY KEY (id, event_id)
    );

    CREATE TABLE gha_milestones (
        id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        closed_at TEXT, closed_issues INTEGER, created_at TEXT,
        creator_id INTEGER, description TEXT, due_on TEXT,
        number INTEGER, open_issues INTEGER, state TEXT, title TEXT,
        updated_at TEXT,
        dup_actor_id INTEGER, dup_actor_login TEXT,
        dup_repo_id INTEGER, dup_repo_name TEXT,
        dup_type TEXT, dup_created_at TEXT,
        dupn_creator_login TEXT,
        PRIMARY KEY (id, event_id)
    );

    CREATE TABLE gha_issues_labels (
        issue_id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        label_id INTEGER NOT NULL,
        dup_actor_id INTEGER, dup_actor_login TEXT,
        dup_repo_id INTEGER, dup_repo_name TEXT,
        dup_type TEXT, dup_created_at TEXT,
        dup_issue_number INTEGER, dup_label_name TEXT,
        PRIMARY KEY (issue_id, event_id, label_id)
    );

    CREATE TABLE gha_issues_assignees (
        issue_id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        assignee_id INTEGER NOT NULL,
        PRIMARY KEY (issue_id, event_id, assignee_id)
    );

    CREATE TABLE gha_pull_requests_assignees (
        pull_request_id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        assignee_id INTEGER NOT NULL,
        PRIMARY KEY (pull_request_id, event_id, assignee_id)
    );

    CREATE TABLE gha_pull_requests_requested_reviewers (
        pull_request_id INTEGER NOT NULL,
        event_id INTEGER NOT NULL,
        requested_reviewer_id INTEGER NOT NULL,
        PRIMARY KEY (pull_request_id, event_id, requested_reviewer_id)
    );

    INSERT INTO gha_repos (id, name, org_id, org_login) VALUES (1, 'org/repo', 10, 'org');
"#;

/// Opens an in-memory database with the schema applied, returning both
/// the raw connection handle (for assertions) and the engine's store.
pub fn setup() -> (Arc<Mutex<Connection>>, Store) {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(SCHEMA_SQL).unwrap();
    let shared = Arc::new(Mutex::new(conn));
    let store = Store::new(Arc::clone(&shared));
    (shared, store)
}

pub fn count(conn: &Arc<Mutex<Connection>>, table: &str) -> i64 {
    let conn = conn.lock().unwrap();
    conn.query_row(&format!("select count(*) from {table}"), [], |row| {
        row.get(0)
    })
    .unwrap()
}

pub fn scalar_i64(conn: &Arc<Mutex<Connection>>, sql: &str) -> i64 {
    let conn = conn.lock().unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn scalar_string(conn: &Arc<Mutex<Connection>>, sql: &str) -> String {
    let conn = conn.lock().unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).single().unwrap()
}

/// Builds an issue candidate for `org/repo#42`, issue id 100.
pub fn issue_candidate(
    event_id: i64,
    observed_at: DateTime<Utc>,
    title: &str,
    labels: &[(i64, &str)],
) -> IssueCandidate {
    let labels_map: BTreeMap<i64, String> = labels
        .iter()
        .map(|(id, name)| (*id, (*name).to_string()))
        .collect();
    let canonical = ghrecon_core::canonical_id_list(labels_map.keys().copied());
    IssueCandidate {
        repo: "org/repo".to_string(),
        number: 42,
        issue_id: 100,
        is_pr: false,
        milestone_id: None,
        labels: canonical,
        labels_map,
        issue: serde_json::from_value(serde_json::json!({
            "id": 100,
            "number": 42,
            "state": "open",
            "title": title,
            "locked": false,
            "user": {"id": 201, "login": "author"},
            "created_at": "2024-01-01T00:00:00Z",
        }))
        .unwrap(),
        observed_at,
        event_id,
        event_type: "labeled".to_string(),
        event: RemoteIssueEvent {
            id: event_id,
            event: Some("labeled".to_string()),
            actor: Some(RemoteUser {
                id: 301,
                login: Some("actor".to_string()),
            }),
            created_at: Some(observed_at),
        },
        assignee_id: None,
        assignees: String::new(),
        assignees_map: BTreeMap::new(),
    }
}

/// Builds a PR candidate for issue id 100, PR id 500.
pub fn pr_candidate(observed_at: DateTime<Utc>, title: &str) -> PrCandidate {
    let pr: RemotePullRequest = serde_json::from_value(serde_json::json!({
        "id": 500,
        "number": 42,
        "state": "open",
        "title": title,
        "user": {"id": 201, "login": "author"},
        "assignees": [{"id": 202, "login": "helper"}],
        "requested_reviewers": [{"id": 203, "login": "reviewer"}],
        "merged_by": {"id": 204, "login": "merger"},
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": observed_at.to_rfc3339(),
    }))
    .unwrap();
    PrCandidate { issue_id: 100, pr }
}

/// Pre-inserts a bare stored issue row the probe can find.
pub fn insert_stored_issue(
    conn: &Arc<Mutex<Connection>>,
    issue_id: i64,
    event_id: i64,
    second: &str,
    state: &str,
    title: &str,
) {
    let conn = conn.lock().unwrap();
    conn.execute(
        "insert into gha_issues (id, event_id, created_at, updated_at, state, title, locked, \
         number, is_pull_request) values (?1, ?2, ?3, ?3, ?4, ?5, 0, 42, 0)",
        rusqlite::params![issue_id, event_id, second, state, title],
    )
    .unwrap();
}

/// Pre-inserts a bare stored PR row the probe can find.
pub fn insert_stored_pr(
    conn: &Arc<Mutex<Connection>>,
    pr_id: i64,
    event_id: i64,
    second: &str,
    state: &str,
    title: &str,
) {
    let conn = conn.lock().unwrap();
    conn.execute(
        "insert into gha_pull_requests (id, event_id, updated_at, state, title, number) \
         values (?1, ?2, ?3, ?4, ?5, 42)",
        rusqlite::params![pr_id, event_id, second, state, title],
    )
    .unwrap();
}

pub fn insert_stored_label(
    conn: &Arc<Mutex<Connection>>,
    issue_id: i64,
    event_id: i64,
    label_id: i64,
) {
    let conn = conn.lock().unwrap();
    conn.execute(
        "insert into gha_issues_labels (issue_id, event_id, label_id) values (?1, ?2, ?3)",
        rusqlite::params![issue_id, event_id, label_id],
    )
    .unwrap();
}
