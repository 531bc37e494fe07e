// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! GitHub API payloads.
//!
//! Only the fields hostwright actually reads are modeled. Everything else
//! in a response is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub login: String,
}

/// Login of an optional author, GitHub calls deleted accounts "ghost".
pub fn login(user: Option<&User>) -> &str {
    user.map(|user| user.login.as_str()).unwrap_or("ghost")
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub has_issues: bool,
    #[serde(default)]
    pub has_wiki: bool,
    #[serde(default)]
    pub has_projects: bool,
    #[serde(default)]
    pub has_discussions: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

/// Body of a repository creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRepository {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    pub has_issues: bool,
    pub has_wiki: bool,
    pub has_projects: bool,
}

impl From<&Repository> for NewRepository {
    fn from(repo: &Repository) -> Self {
        Self {
            name: repo.name.clone(),
            description: repo.description.clone().filter(|text| !text.is_empty()),
            homepage: repo.homepage.clone().filter(|text| !text.is_empty()),
            private: repo.private,
            visibility: repo.visibility.clone(),
            has_issues: repo.has_issues,
            has_wiki: repo.has_wiki,
            has_projects: repo.has_projects,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub due_on: Option<String>,
}

/// Body of a milestone creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMilestone {
    pub title: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_on: Option<String>,
}

impl From<&Milestone> for NewMilestone {
    fn from(milestone: &Milestone) -> Self {
        Self {
            title: milestone.title.clone(),
            state: if milestone.state.is_empty() {
                "open".into()
            } else {
                milestone.state.clone()
            },
            description: milestone.description.clone(),
            due_on: milestone.due_on.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub state_reason: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub labels: Vec<LabelName>,
    #[serde(default)]
    pub milestone: Option<Milestone>,
    /// Present only when this "issue" is really a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state == "closed"
    }
}

/// Body of an issue creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub milestone: Option<u64>,
}

/// Issue that was just created.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIssue {
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub html_url: String,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub draft: bool,
}

/// Review comment attached to a line of a pull request diff.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReviewComment {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub original_line: Option<u64>,
}

/// Review summary of a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscussionCategory {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CategoryName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionComment {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: Option<User>,
    pub created_at: DateTime<Utc>,
}

/// Cursor state of a GraphQL connection.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub end_cursor: Option<String>,
}

impl PageInfo {
    /// Cursor of the next page, if there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.end_cursor.as_deref().filter(|_| self.has_next_page)
    }
}

/// One page of a GraphQL connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nodes<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
    #[serde(default)]
    pub page_info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discussion {
    pub id: String,
    #[serde(default)]
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub author: Option<User>,
    pub category: CategoryName,
    pub comments: Nodes<DiscussionComment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn issue_detects_pull_requests() -> anyhow::Result<()> {
        let issue: Issue = serde_json::from_value(json!({
            "number": 3,
            "title": "Add thing",
            "state": "open",
            "created_at": "2024-03-01T10:00:00Z",
            "pull_request": { "url": "https://api.github.com/repos/o/r/pulls/3" },
        }))?;
        assert!(issue.is_pull_request());
        assert_eq!(issue.body, None);
        assert_eq!(login(issue.user.as_ref()), "ghost");
        Ok(())
    }

    #[test]
    fn new_repository_drops_empty_text() {
        let repo = Repository {
            name: "tools".into(),
            description: Some(String::new()),
            homepage: None,
            private: true,
            visibility: Some("private".into()),
            archived: false,
            has_issues: true,
            has_wiki: false,
            has_projects: false,
            has_discussions: false,
            default_branch: Some("main".into()),
        };
        let body = serde_json::to_value(NewRepository::from(&repo)).unwrap();
        assert_eq!(
            body,
            json!({
                "name": "tools",
                "private": true,
                "visibility": "private",
                "has_issues": true,
                "has_wiki": false,
                "has_projects": false,
            })
        );
    }
}
