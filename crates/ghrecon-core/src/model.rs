//! Remote objects as returned by the GitHub REST API.
//!
//! The harvester deserializes API responses into these types and hands
//! them to the engine inside candidates. Every field the API reports as
//! nullable is an `Option`; the divergence detector applies one uniform
//! three-valued comparison (both absent = equal, one absent = different,
//! both present = compare by value) instead of sentinel values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub user reference (issue author, assignee, reviewer, actor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteUser {
    pub id: i64,
    pub login: Option<String>,
}

/// A milestone attached to an issue or pull request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMilestone {
    pub id: i64,
    pub number: Option<i64>,
    pub state: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub creator: Option<RemoteUser>,
    pub open_issues: Option<i64>,
    pub closed_issues: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub due_on: Option<DateTime<Utc>>,
}

/// Marker object present on issues that are really pull requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestLinks {
    pub url: Option<String>,
}

/// An issue object as fetched from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIssue {
    pub id: i64,
    pub number: i64,
    pub state: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub user: Option<RemoteUser>,
    pub assignee: Option<RemoteUser>,
    #[serde(default)]
    pub assignees: Vec<RemoteUser>,
    pub milestone: Option<RemoteMilestone>,
    pub locked: Option<bool>,
    pub comments: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub pull_request: Option<PullRequestLinks>,
}

impl RemoteIssue {
    /// Returns true when the issue is the issue-side view of a pull
    /// request.
    #[must_use]
    pub const fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// An issue timeline event as fetched from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteIssueEvent {
    pub id: i64,
    pub event: Option<String>,
    pub actor: Option<RemoteUser>,
    pub created_at: Option<DateTime<Utc>>,
}

/// A branch reference on a pull request (base or head).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteBranchRef {
    pub sha: Option<String>,
}

/// A pull-request object as fetched from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePullRequest {
    pub id: i64,
    pub number: i64,
    pub state: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub user: Option<RemoteUser>,
    pub assignee: Option<RemoteUser>,
    #[serde(default)]
    pub assignees: Vec<RemoteUser>,
    #[serde(default)]
    pub requested_reviewers: Vec<RemoteUser>,
    pub merged_by: Option<RemoteUser>,
    pub milestone: Option<RemoteMilestone>,
    pub base: Option<RemoteBranchRef>,
    pub head: Option<RemoteBranchRef>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merged: Option<bool>,
    pub mergeable: Option<bool>,
    pub mergeable_state: Option<String>,
    pub merge_commit_sha: Option<String>,
    pub comments: Option<i64>,
    pub commits: Option<i64>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub changed_files: Option<i64>,
    pub maintainer_can_modify: Option<bool>,
}

impl RemotePullRequest {
    /// Id of the user who merged the PR, if any.
    #[must_use]
    pub fn merged_by_id(&self) -> Option<i64> {
        self.merged_by.as_ref().map(|u| u.id)
    }

    /// Id of the single assignee, if any.
    #[must_use]
    pub fn assignee_id(&self) -> Option<i64> {
        self.assignee.as_ref().map(|u| u.id)
    }

    /// Id of the attached milestone, if any.
    #[must_use]
    pub fn milestone_id(&self) -> Option<i64> {
        self.milestone.as_ref().map(|m| m.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_pull_request_marker() {
        let json = r#"{
            "id": 10, "number": 3, "state": "open", "title": "t",
            "created_at": "2024-01-01T00:00:00Z",
            "pull_request": {"url": "https://api.github.com/repos/o/r/pulls/3"}
        }"#;
        let issue: RemoteIssue = serde_json::from_str(json).unwrap();
        assert!(issue.is_pull_request());
        assert!(issue.assignees.is_empty());
        assert!(issue.milestone.is_none());
    }

    #[test]
    fn plain_issue_is_not_a_pull_request() {
        let json = r#"{"id": 10, "number": 3, "created_at": "2024-01-01T00:00:00Z"}"#;
        let issue: RemoteIssue = serde_json::from_str(json).unwrap();
        assert!(!issue.is_pull_request());
    }

    #[test]
    fn pull_request_accessors() {
        let json = r#"{
            "id": 55, "number": 3, "state": "closed",
            "updated_at": "2024-01-02T03:04:05Z",
            "merged": true,
            "merged_by": {"id": 9, "login": "m"},
            "assignee": {"id": 4, "login": "a"},
            "milestone": {"id": 77, "title": "v1"}
        }"#;
        let pr: RemotePullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.merged_by_id(), Some(9));
        assert_eq!(pr.assignee_id(), Some(4));
        assert_eq!(pr.milestone_id(), Some(77));
        assert!(pr.requested_reviewers.is_empty());
    }
}
