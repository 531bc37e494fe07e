// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Typed GitHub client.
//!
//! Wraps a [`GitHubApi`] transport with pagination, pacing of mutating
//! requests, and retries on rate limits.

use crate::github::{
    api::{ApiError, GitHubApi, Method, Result},
    model::{
        Comment, CreatedIssue, Discussion, DiscussionCategory, DiscussionComment, Issue, Label,
        Milestone, NewIssue, NewMilestone, NewRepository, Nodes, PageInfo, PullRequest,
        Repository, Review, ReviewComment,
    },
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::{thread::sleep, time::Duration};
use tracing::{debug, instrument, warn};

const PAGE_SIZE: usize = 100;
const MAX_RETRIES: u32 = 3;

const LIST_DISCUSSIONS: &str = r#"
query($owner: String!, $name: String!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    discussions(first: 50, after: $cursor, orderBy: {field: CREATED_AT, direction: ASC}) {
      pageInfo { hasNextPage endCursor }
      nodes {
        id
        number
        title
        body
        createdAt
        url
        author { login }
        category { name }
        comments(first: 100) {
          pageInfo { hasNextPage endCursor }
          nodes { body createdAt author { login } }
        }
      }
    }
  }
}
"#;

const DISCUSSION_COMMENTS: &str = r#"
query($owner: String!, $name: String!, $number: Int!, $cursor: String) {
  repository(owner: $owner, name: $name) {
    discussion(number: $number) {
      comments(first: 100, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        nodes { body createdAt author { login } }
      }
    }
  }
}
"#;

const DISCUSSION_CATEGORIES: &str = r#"
query($owner: String!, $name: String!) {
  repository(owner: $owner, name: $name) {
    id
    discussionCategories(first: 50) { nodes { id name } }
  }
}
"#;

const CREATE_DISCUSSION: &str = r#"
mutation($repositoryId: ID!, $categoryId: ID!, $title: String!, $body: String!) {
  createDiscussion(input: {repositoryId: $repositoryId, categoryId: $categoryId, title: $title, body: $body}) {
    discussion { id }
  }
}
"#;

const ADD_DISCUSSION_COMMENT: &str = r#"
mutation($discussionId: ID!, $body: String!) {
  addDiscussionComment(input: {discussionId: $discussionId, body: $body}) {
    comment { id }
  }
}
"#;

/// Discussion categories of a repository, plus its GraphQL node ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscussionBoard {
    pub repository_id: String,
    pub categories: Vec<DiscussionCategory>,
}

impl DiscussionBoard {
    pub fn category(&self, name: &str) -> Option<&DiscussionCategory> {
        self.categories.iter().find(|category| category.name == name)
    }
}

/// Typed, paced GitHub client.
#[derive(Debug)]
pub struct Client<'a, A: GitHubApi> {
    api: &'a A,
    throttle: Duration,
    retry_floor: Duration,
}

impl<'a, A: GitHubApi> Client<'a, A> {
    /// Construct new client over API transport.
    pub fn new(api: &'a A) -> Self {
        Self {
            api,
            throttle: Duration::ZERO,
            retry_floor: Duration::from_secs(1),
        }
    }

    /// Sleep this long after every mutating request.
    pub fn throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Smallest delay before retrying a rate limited request.
    pub fn retry_floor(mut self, floor: Duration) -> Self {
        self.retry_floor = floor;
        self
    }

    pub fn list_org_repos(&self, org: &str) -> Result<Vec<Repository>> {
        self.paginate(&format!("orgs/{org}/repos?type=all"))
    }

    /// Lookup repository, returning `None` if it does not exist.
    pub fn find_repo(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        match self.get(&format!("repos/{owner}/{name}")) {
            Ok(repo) => Ok(Some(repo)),
            Err(ApiError::NotFound { .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub fn create_org_repo(&self, org: &str, repo: &NewRepository) -> Result<()> {
        self.mutate(Method::Post, &format!("orgs/{org}/repos"), Some(&encode(repo)?))?;
        Ok(())
    }

    pub fn list_labels(&self, owner: &str, name: &str) -> Result<Vec<Label>> {
        self.paginate(&format!("repos/{owner}/{name}/labels"))
    }

    pub fn create_label(&self, owner: &str, name: &str, label: &Label) -> Result<()> {
        let endpoint = format!("repos/{owner}/{name}/labels");
        self.mutate(Method::Post, &endpoint, Some(&encode(label)?))?;
        Ok(())
    }

    pub fn list_milestones(&self, owner: &str, name: &str) -> Result<Vec<Milestone>> {
        self.paginate(&format!("repos/{owner}/{name}/milestones?state=all"))
    }

    /// Create milestone, returning its number.
    pub fn create_milestone(&self, owner: &str, name: &str, milestone: &NewMilestone) -> Result<u64> {
        let endpoint = format!("repos/{owner}/{name}/milestones");
        let created: CreatedIssue =
            decode(&endpoint, self.mutate(Method::Post, &endpoint, Some(&encode(milestone)?))?)?;
        Ok(created.number)
    }

    /// List issues oldest first. Pull requests are included, GitHub treats
    /// them as issues too.
    pub fn list_issues(&self, owner: &str, name: &str) -> Result<Vec<Issue>> {
        self.paginate(&format!(
            "repos/{owner}/{name}/issues?state=all&sort=created&direction=asc"
        ))
    }

    pub fn list_issue_comments(&self, owner: &str, name: &str, number: u64) -> Result<Vec<Comment>> {
        self.paginate(&format!("repos/{owner}/{name}/issues/{number}/comments"))
    }

    /// Create issue, returning its number.
    pub fn create_issue(&self, owner: &str, name: &str, issue: &NewIssue) -> Result<u64> {
        let endpoint = format!("repos/{owner}/{name}/issues");
        let created: CreatedIssue =
            decode(&endpoint, self.mutate(Method::Post, &endpoint, Some(&encode(issue)?))?)?;
        Ok(created.number)
    }

    pub fn create_comment(&self, owner: &str, name: &str, number: u64, body: &str) -> Result<()> {
        let endpoint = format!("repos/{owner}/{name}/issues/{number}/comments");
        self.mutate(Method::Post, &endpoint, Some(&json!({ "body": body })))?;
        Ok(())
    }

    pub fn close_issue(&self, owner: &str, name: &str, number: u64, reason: &str) -> Result<()> {
        let endpoint = format!("repos/{owner}/{name}/issues/{number}");
        let body = json!({ "state": "closed", "state_reason": reason });
        self.mutate(Method::Patch, &endpoint, Some(&body))?;
        Ok(())
    }

    pub fn list_pulls(&self, owner: &str, name: &str) -> Result<Vec<PullRequest>> {
        self.paginate(&format!(
            "repos/{owner}/{name}/pulls?state=all&sort=created&direction=asc"
        ))
    }

    pub fn list_review_comments(&self, owner: &str, name: &str, number: u64) -> Result<Vec<ReviewComment>> {
        self.paginate(&format!("repos/{owner}/{name}/pulls/{number}/comments"))
    }

    pub fn list_reviews(&self, owner: &str, name: &str, number: u64) -> Result<Vec<Review>> {
        self.paginate(&format!("repos/{owner}/{name}/pulls/{number}/reviews"))
    }

    /// List discussions oldest first, following GraphQL cursors.
    ///
    /// Comment threads longer than one page are completed through
    /// [`Client::discussion_comments`].
    #[instrument(skip(self), level = "debug")]
    pub fn list_discussions(&self, owner: &str, name: &str) -> Result<Vec<Discussion>> {
        let mut discussions = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let variables = json!({ "owner": owner, "name": name, "cursor": cursor });
            let mut data = self.api.graphql(LIST_DISCUSSIONS, &variables)?;
            let page = data
                .pointer_mut("/repository/discussions")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let page: Nodes<Discussion> = decode("graphql", page)?;
            discussions.extend(page.nodes);

            match page.page_info.next_cursor() {
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        for discussion in &mut discussions {
            if let Some(after) = discussion.comments.page_info.next_cursor().map(str::to_string) {
                let rest = self.discussion_comments(owner, name, discussion.number, &after)?;
                discussion.comments.nodes.extend(rest);
                discussion.comments.page_info = PageInfo::default();
            }
        }

        Ok(discussions)
    }

    /// List comments of a discussion that come after given cursor.
    #[instrument(skip(self), level = "debug")]
    pub fn discussion_comments(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        after: &str,
    ) -> Result<Vec<DiscussionComment>> {
        let mut comments = Vec::new();
        let mut cursor = after.to_string();
        loop {
            let variables = json!({ "owner": owner, "name": name, "number": number, "cursor": cursor });
            let mut data = self.api.graphql(DISCUSSION_COMMENTS, &variables)?;
            let page = data
                .pointer_mut("/repository/discussion/comments")
                .map(Value::take)
                .unwrap_or(Value::Null);
            let page: Nodes<DiscussionComment> = decode("graphql", page)?;
            comments.extend(page.nodes);

            match page.page_info.next_cursor() {
                Some(next) if next != cursor => cursor = next.to_string(),
                _ => break,
            }
        }

        debug!("discussion #{number}: {} more comments", comments.len());
        Ok(comments)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn discussion_board(&self, owner: &str, name: &str) -> Result<DiscussionBoard> {
        let variables = json!({ "owner": owner, "name": name });
        let data = self.api.graphql(DISCUSSION_CATEGORIES, &variables)?;
        let repository = &data["repository"];
        let repository_id = repository["id"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::GraphQl(format!("no repository id for {owner}/{name}")))?;
        let categories: Vec<DiscussionCategory> =
            decode("graphql", repository["discussionCategories"]["nodes"].clone())?;

        Ok(DiscussionBoard {
            repository_id,
            categories,
        })
    }

    /// Create discussion, returning its node ID.
    pub fn create_discussion(
        &self,
        repository_id: &str,
        category_id: &str,
        title: &str,
        body: &str,
    ) -> Result<String> {
        let variables = json!({
            "repositoryId": repository_id,
            "categoryId": category_id,
            "title": title,
            "body": body,
        });
        let data = self.mutate_graphql(CREATE_DISCUSSION, &variables)?;
        data["createDiscussion"]["discussion"]["id"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::GraphQl("createDiscussion returned no id".into()))
    }

    pub fn add_discussion_comment(&self, discussion_id: &str, body: &str) -> Result<()> {
        let variables = json!({ "discussionId": discussion_id, "body": body });
        self.mutate_graphql(ADD_DISCUSSION_COMMENT, &variables)?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        decode(endpoint, self.api.request(Method::Get, endpoint, None)?)
    }

    /// Collect every page of a listing endpoint.
    ///
    /// A page shorter than the page size is the last one.
    fn paginate<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        for page in 1.. {
            let paged = format!("{endpoint}{separator}per_page={PAGE_SIZE}&page={page}");
            let batch: Vec<T> = self.get(&paged)?;
            let count = batch.len();
            items.extend(batch);
            debug!("{paged}: {count} items");

            if count < PAGE_SIZE {
                break;
            }
        }

        Ok(items)
    }

    fn mutate(&self, method: Method, endpoint: &str, body: Option<&Value>) -> Result<Value> {
        self.paced(endpoint, || self.api.request(method, endpoint, body))
    }

    fn mutate_graphql(&self, query: &str, variables: &Value) -> Result<Value> {
        self.paced("graphql", || self.api.graphql(query, variables))
    }

    // INVARIANT: Every mutating request is followed by the throttle sleep, and
    //            rate limited requests are retried with a doubling delay.
    fn paced(&self, endpoint: &str, request: impl Fn() -> Result<Value>) -> Result<Value> {
        let mut delay = self.throttle.max(self.retry_floor);
        let mut attempt = 0;
        loop {
            match request() {
                Err(ApiError::RateLimited { .. }) if attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!("rate limited at {endpoint}, retry {attempt}/{MAX_RETRIES} in {delay:?}");
                    sleep(delay);
                    delay *= 2;
                }
                result => {
                    if !self.throttle.is_zero() {
                        sleep(self.throttle);
                    }
                    return result;
                }
            }
        }
    }
}

fn encode(body: &impl Serialize) -> Result<Value> {
    serde_json::to_value(body).map_err(ApiError::Encode)
}

fn decode<T: DeserializeOwned>(endpoint: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|err| ApiError::Decode {
        source: err,
        endpoint: endpoint.into(),
    })
}
