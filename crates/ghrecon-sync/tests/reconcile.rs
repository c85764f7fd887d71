//! End-to-end reconciliation runs against an in-memory store.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    at, count, insert_stored_issue, insert_stored_label, insert_stored_pr, issue_candidate,
    pr_candidate, scalar_i64, scalar_string, setup,
};
use ghrecon_core::candidate::Batch;
use ghrecon_core::config::{EngineConfig, SyncMode};
use ghrecon_core::github::MockRateLimitProbe;
use ghrecon_core::redact::HideSet;
use ghrecon_core::timefmt::to_ymd_hms;
use ghrecon_core::SYNTHETIC_EVENT_OFFSET;
use ghrecon_sync::{Reconciler, Store};

fn engine(store: Store, mode: SyncMode) -> Reconciler {
    engine_with_hide(store, mode, HideSet::empty())
}

fn engine_with_hide(store: Store, mode: SyncMode, hide: HideSet) -> Reconciler {
    Reconciler::new(
        store,
        Arc::new(hide),
        EngineConfig {
            threads: 2,
            debug: 0,
            skip_writes: false,
            mode,
        },
        Arc::new(MockRateLimitProbe::default()),
    )
}

fn issue_batch(candidates: Vec<ghrecon_core::IssueCandidate>) -> Batch {
    let mut issues: BTreeMap<i64, Vec<_>> = BTreeMap::new();
    for candidate in candidates {
        issues.entry(candidate.issue_id).or_default().push(candidate);
    }
    Batch {
        issues,
        prs: BTreeMap::new(),
    }
}

#[test]
fn new_issue_writes_full_bundle() {
    let (conn, store) = setup();
    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![issue_candidate(
        7,
        at(0, 0, 0),
        "boom",
        &[(1, "bug")],
    )]));

    assert_eq!(summary.issue_counts, [1, 0, 0, 0, 0]);
    assert_eq!(count(&conn, "gha_issues"), 1);
    assert_eq!(count(&conn, "gha_events"), 1);
    assert_eq!(count(&conn, "gha_payloads"), 1);
    assert_eq!(count(&conn, "gha_issues_labels"), 1);

    assert_eq!(
        scalar_i64(&conn, "select event_id from gha_issues"),
        281_474_976_710_663
    );
    assert_eq!(scalar_i64(&conn, "select id from gha_events"), 281_474_976_710_663);
    assert_eq!(scalar_i64(&conn, "select label_id from gha_issues_labels"), 1);
    assert_eq!(
        scalar_string(&conn, "select dup_label_name from gha_issues_labels"),
        "bug"
    );
    // Denormalized repo/org ids resolved through the gha_repos lookup.
    assert_eq!(scalar_i64(&conn, "select repo_id from gha_events"), 1);
    assert_eq!(scalar_i64(&conn, "select org_id from gha_events"), 10);
}

#[test]
fn same_second_duplicates_collapse_to_highest_event_id() {
    let (conn, store) = setup();
    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![
        issue_candidate(7, at(0, 0, 0), "boom", &[(1, "bug")]),
        issue_candidate(9, at(0, 0, 0), "boom", &[(1, "bug")]),
    ]));

    assert_eq!(summary.issue_counts, [1, 0, 0, 0, 0]);
    assert_eq!(count(&conn, "gha_issues"), 1);
    assert_eq!(
        scalar_i64(&conn, "select event_id from gha_issues"),
        SYNTHETIC_EVENT_OFFSET + 9
    );
}

#[test]
fn distinct_seconds_write_one_row_each() {
    let (conn, store) = setup();
    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![
        issue_candidate(7, at(0, 0, 0), "boom", &[]),
        issue_candidate(9, at(0, 0, 0), "boom", &[]),
        issue_candidate(11, at(0, 0, 5), "boom", &[]),
    ]));

    // The set of emitted seconds is exactly the set of unique input
    // seconds.
    assert_eq!(summary.issue_counts[0], 2);
    assert_eq!(count(&conn, "gha_issues"), 2);
    assert_eq!(count(&conn, "gha_events"), 2);
}

#[test]
fn existing_artificial_snapshot_is_skipped() {
    let (conn, store) = setup();
    let second = to_ymd_hms(at(0, 0, 0));
    insert_stored_issue(&conn, 100, SYNTHETIC_EVENT_OFFSET + 7, &second, "open", "old");

    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![issue_candidate(
        8,
        at(0, 0, 0),
        "anything",
        &[],
    )]));

    assert_eq!(summary.issue_counts, [0, 1, 0, 0, 0]);
    assert_eq!(count(&conn, "gha_issues"), 1);
    assert_eq!(count(&conn, "gha_events"), 0);
}

#[test]
fn matching_stored_state_needs_no_write() {
    let (conn, store) = setup();
    let second = to_ymd_hms(at(0, 0, 0));
    insert_stored_issue(&conn, 100, 7, &second, "open", "boom");

    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![issue_candidate(
        8,
        at(0, 0, 0),
        "boom",
        &[],
    )]));

    assert_eq!(summary.issue_counts, [0, 0, 1, 0, 0]);
    assert_eq!(count(&conn, "gha_issues"), 1);
}

#[test]
fn divergent_title_triggers_patch() {
    let (conn, store) = setup();
    let second = to_ymd_hms(at(0, 0, 0));
    insert_stored_issue(&conn, 100, 7, &second, "open", "A");

    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![issue_candidate(
        8,
        at(0, 0, 0),
        "B",
        &[],
    )]));

    assert_eq!(summary.issue_counts, [0, 0, 0, 1, 0]);
    assert_eq!(count(&conn, "gha_issues"), 2);
    let patched_title = scalar_string(
        &conn,
        &format!(
            "select title from gha_issues where event_id = {}",
            SYNTHETIC_EVENT_OFFSET + 8
        ),
    );
    assert_eq!(patched_title, "B");
}

#[test]
fn label_set_change_triggers_patch_with_new_joins() {
    let (conn, store) = setup();
    let second = to_ymd_hms(at(0, 0, 0));
    insert_stored_issue(&conn, 100, 7, &second, "open", "boom");
    insert_stored_label(&conn, 100, 7, 1);
    insert_stored_label(&conn, 100, 7, 2);

    let summary = engine(store, SyncMode::Automatic).run(issue_batch(vec![issue_candidate(
        8,
        at(0, 0, 0),
        "boom",
        &[(1, "bug"), (2, "help"), (3, "urgent")],
    )]));

    assert_eq!(summary.issue_counts, [0, 0, 0, 1, 0]);
    let new_label_rows = scalar_i64(
        &conn,
        &format!(
            "select count(*) from gha_issues_labels where event_id = {}",
            SYNTHETIC_EVENT_OFFSET + 8
        ),
    );
    assert_eq!(new_label_rows, 3);
}

#[test]
fn pr_collision_guard_skips_without_writing() {
    let (conn, store) = setup();
    // A PR snapshot already exists under this candidate's synthetic
    // event id, but with a different updated_at.
    insert_stored_pr(
        &conn,
        500,
        SYNTHETIC_EVENT_OFFSET + 5,
        &to_ymd_hms(at(1, 0, 0)),
        "open",
        "A",
    );

    let mut batch = issue_batch(vec![issue_candidate(5, at(2, 0, 0), "A", &[])]);
    batch.prs.insert(100, pr_candidate(at(2, 0, 0), "A"));
    let summary = engine(store, SyncMode::Automatic).run(batch);

    assert_eq!(summary.pr_counts, [0, 0, 0, 0, 1]);
    assert_eq!(count(&conn, "gha_pull_requests"), 1);
}

#[test]
fn new_pr_writes_bundle_and_backfills_payload() {
    let (conn, store) = setup();
    let mut batch = issue_batch(vec![issue_candidate(5, at(2, 0, 0), "A", &[])]);
    batch.prs.insert(100, pr_candidate(at(2, 0, 0), "A"));
    let summary = engine(store, SyncMode::Automatic).run(batch);

    assert_eq!(summary.pr_counts, [1, 0, 0, 0, 0]);
    assert_eq!(count(&conn, "gha_pull_requests"), 1);
    assert_eq!(count(&conn, "gha_pull_requests_assignees"), 1);
    assert_eq!(count(&conn, "gha_pull_requests_requested_reviewers"), 1);

    // The issue phase wrote the payload first without the PR id; the
    // PR phase must backfill it.
    assert_eq!(
        scalar_i64(&conn, "select pull_request_id from gha_payloads"),
        500
    );

    // Every declared actor of the PR bundle exists in gha_actors.
    for actor_id in [201, 202, 203, 204] {
        let found = scalar_i64(
            &conn,
            &format!("select count(*) from gha_actors where id = {actor_id}"),
        );
        assert_eq!(found, 1, "actor {actor_id} missing");
    }
}

#[test]
fn rerun_of_same_batch_writes_nothing_new() {
    let (conn, store) = setup();
    let batch = || {
        let mut batch = issue_batch(vec![issue_candidate(7, at(0, 0, 0), "boom", &[(1, "bug")])]);
        batch.prs.insert(100, pr_candidate(at(0, 0, 0), "boom"));
        batch
    };
    let engine = engine(store, SyncMode::Automatic);
    engine.run(batch());

    let before: Vec<i64> = [
        "gha_issues",
        "gha_pull_requests",
        "gha_events",
        "gha_payloads",
        "gha_issues_labels",
        "gha_pull_requests_assignees",
        "gha_pull_requests_requested_reviewers",
        "gha_actors",
    ]
    .iter()
    .map(|table| count(&conn, table))
    .collect();

    let summary = engine.run(batch());

    let after: Vec<i64> = [
        "gha_issues",
        "gha_pull_requests",
        "gha_events",
        "gha_payloads",
        "gha_issues_labels",
        "gha_pull_requests_assignees",
        "gha_pull_requests_requested_reviewers",
        "gha_actors",
    ]
    .iter()
    .map(|table| count(&conn, table))
    .collect();

    assert_eq!(before, after, "rerun must not add rows");
    assert_eq!(summary.issue_counts[1], 1, "issue rerun hits the artificial guard");
    assert_eq!(summary.pr_counts[1], 1, "PR rerun hits the artificial guard");
}

#[test]
fn manual_mode_compares_against_latest_state() {
    let (conn, store) = setup();
    insert_stored_issue(&conn, 100, 7, &to_ymd_hms(at(0, 0, 0)), "open", "A");

    // Observed an hour later; the exact-second probe would find
    // nothing, the manual probe must find the latest row and diff it.
    let summary = engine(store, SyncMode::Manual).run(issue_batch(vec![issue_candidate(
        8,
        at(1, 0, 0),
        "B",
        &[],
    )]));

    assert_eq!(summary.issue_counts, [0, 0, 0, 1, 0]);
    let updated_at = scalar_string(
        &conn,
        &format!(
            "select updated_at from gha_issues where event_id = {}",
            SYNTHETIC_EVENT_OFFSET + 8
        ),
    );
    assert_eq!(updated_at, "2024-01-01 01:00:00");
}

#[test]
fn hidden_logins_are_redacted_before_persistence() {
    let (conn, store) = setup();
    let summary = engine_with_hide(store, SyncMode::Automatic, HideSet::new(["author"]))
        .run(issue_batch(vec![issue_candidate(7, at(0, 0, 0), "boom", &[])]));

    assert_eq!(summary.issue_counts[0], 1);
    let login = scalar_string(&conn, "select login from gha_actors where id = 201");
    assert!(login.starts_with("anon-"), "login not redacted: {login}");
    let dup_login = scalar_string(&conn, "select dup_user_login from gha_issues");
    assert!(dup_login.starts_with("anon-"));
}

#[test]
fn skip_writes_leaves_store_untouched() {
    let (conn, store) = setup();
    let reconciler = Reconciler::new(
        store,
        Arc::new(HideSet::empty()),
        EngineConfig {
            threads: 2,
            debug: 0,
            skip_writes: true,
            mode: SyncMode::Automatic,
        },
        Arc::new(MockRateLimitProbe::default()),
    );
    let summary = reconciler.run(issue_batch(vec![issue_candidate(7, at(0, 0, 0), "boom", &[])]));

    // The candidate still counts as new; the write itself is bypassed.
    assert_eq!(summary.issue_counts[0], 1);
    assert_eq!(count(&conn, "gha_issues"), 0);
    assert_eq!(count(&conn, "gha_events"), 0);
}

#[test]
fn recent_repos_lists_active_names() {
    let (conn, store) = setup();
    {
        let conn = conn.lock().unwrap();
        conn.execute_batch(
            "insert into gha_events (id, type, created_at, dup_repo_name) values
                 (1, 'PushEvent', '2024-01-02 00:00:00', 'org/repo'),
                 (2, 'PushEvent', '2024-01-02 00:00:01', 'org/repo'),
                 (3, 'PushEvent', '2023-12-01 00:00:00', 'org/stale');",
        )
        .unwrap();
    }
    let repos = store.recent_repos(at(0, 0, 0)).unwrap();
    assert_eq!(repos, vec!["org/repo".to_string()]);
}
