use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, RequestBuilder, Response,
    header::{ACCEPT, AUTHORIZATION, HeaderMap},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{
    domain::{
        Account, NotificationThread, Reason, ReviewGroup, Subject, SubjectState, SubjectType,
        SubjectUser,
    },
    error::{FailureKind, GitifyError, classify_status},
};

const GITHUB_CLOUD_HOST: &str = "github.com";
const USER_AGENT_HEADER: &str = "gitify-core/0.1";
const ACCEPT_HEADER: &str = "application/vnd.github+json";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const CLOSING_KEYWORDS: &[&str] = &[
    "close", "closes", "closed", "fix", "fixes", "fixed", "resolve", "resolves", "resolved",
];

pub fn is_enterprise_host(hostname: &str) -> bool {
    hostname != GITHUB_CLOUD_HOST && !hostname.ends_with(".github.com")
}

/// REST base url for a host, always ending in `/`.
pub fn api_base_url(hostname: &str) -> String {
    if is_enterprise_host(hostname) {
        format!("https://{hostname}/api/v3/")
    } else {
        format!("https://api.{hostname}/")
    }
}

/// State, author and review details of an issue or pull request subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectDetails {
    pub state: Option<SubjectState>,
    pub user: Option<SubjectUser>,
    pub comments: Option<u64>,
    pub labels: Vec<String>,
    pub milestone: Option<String>,
    pub reviews: Vec<ReviewGroup>,
    pub linked_issues: Vec<String>,
}

impl SubjectDetails {
    pub fn apply_to(self, subject: &mut Subject) {
        subject.state = self.state;
        subject.user = self.user;
        subject.comments = self.comments;
        subject.labels = self.labels;
        subject.milestone = self.milestone;
        subject.reviews = self.reviews;
        subject.linked_issues = self.linked_issues;
    }
}

/// Authenticated GitHub REST operations. Every call targets exactly one
/// account and reports failures through the classified taxonomy.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    async fn list_notifications(
        &self,
        account: &Arc<Account>,
        participating_only: bool,
    ) -> Result<Vec<NotificationThread>, GitifyError>;

    async fn mark_thread_read(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError>;

    async fn mark_thread_done(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError>;

    async fn ignore_thread_subscription(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError>;

    async fn mark_repo_notifications_read(
        &self,
        repo_full_name: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError>;

    /// Fetches issue/pull request details for a subject. `Ok(None)` means the
    /// subject kind carries no details.
    async fn subject_details(
        &self,
        _account: &Account,
        _subject: &Subject,
    ) -> Result<Option<SubjectDetails>, GitifyError> {
        Ok(None)
    }
}

pub struct GitHubClient {
    http: Client,
}

impl GitHubClient {
    pub fn new() -> Result<Self, GitifyError> {
        let http = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .build()
            .map_err(|err| GitifyError::with_message(FailureKind::Unknown, err.to_string()))?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    fn authorized(&self, request: RequestBuilder, token: &str) -> RequestBuilder {
        request
            .header(ACCEPT, ACCEPT_HEADER)
            .header(AUTHORIZATION, format!("token {token}"))
    }

    fn list_request(&self, account: &Account, participating_only: bool) -> RequestBuilder {
        let url = format!("{}notifications", api_base_url(&account.hostname));
        self.authorized(self.http.get(url), &account.token)
            .query(&[("participating", participating_only.to_string())])
    }

    fn thread_read_request(&self, thread_id: &str, hostname: &str, token: &str) -> RequestBuilder {
        self.authorized(self.http.patch(thread_url(thread_id, hostname)), token)
    }

    fn thread_done_request(&self, thread_id: &str, hostname: &str, token: &str) -> RequestBuilder {
        self.authorized(self.http.delete(thread_url(thread_id, hostname)), token)
    }

    fn ignore_request(&self, thread_id: &str, hostname: &str, token: &str) -> RequestBuilder {
        let url = format!("{}/subscription", thread_url(thread_id, hostname));
        self.authorized(self.http.put(url), token)
            .json(&json!({ "ignored": true }))
    }

    fn repo_read_request(&self, repo_full_name: &str, hostname: &str, token: &str) -> RequestBuilder {
        let url = format!(
            "{}repos/{repo_full_name}/notifications",
            api_base_url(hostname)
        );
        self.authorized(self.http.put(url), token).json(&json!({}))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, GitifyError> {
        let response = request.send().await.map_err(classify_transport)?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(classify_response(response).await)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &str,
    ) -> Result<T, GitifyError> {
        let request = self.authorized(self.http.get(url), token);
        self.send(request)
            .await?
            .json()
            .await
            .map_err(classify_transport)
    }

    async fn pull_request_details(
        &self,
        url: &str,
        token: &str,
    ) -> Result<SubjectDetails, GitifyError> {
        let pull: PullResponse = self.get_json(url, token).await?;
        let reviews: Vec<ReviewResponse> = self.get_json(&format!("{url}/reviews"), token).await?;

        let state = if pull.merged {
            SubjectState::Merged
        } else if pull.draft {
            SubjectState::Draft
        } else {
            issue_state(&pull.state, None)
        };

        Ok(SubjectDetails {
            state: Some(state),
            user: pull.user.map(SubjectUser::from),
            comments: Some(pull.comments),
            labels: pull.labels.into_iter().map(|label| label.name).collect(),
            milestone: pull.milestone.map(|milestone| milestone.title),
            reviews: group_latest_reviews(reviews),
            linked_issues: parse_linked_issues(pull.body.as_deref().unwrap_or_default()),
        })
    }

    async fn issue_details(&self, url: &str, token: &str) -> Result<SubjectDetails, GitifyError> {
        let issue: IssueResponse = self.get_json(url, token).await?;
        Ok(SubjectDetails {
            state: Some(issue_state(&issue.state, issue.state_reason.as_deref())),
            user: issue.user.map(SubjectUser::from),
            comments: Some(issue.comments),
            labels: issue.labels.into_iter().map(|label| label.name).collect(),
            milestone: issue.milestone.map(|milestone| milestone.title),
            reviews: Vec::new(),
            linked_issues: Vec::new(),
        })
    }
}

#[async_trait]
impl NotificationsApi for GitHubClient {
    async fn list_notifications(
        &self,
        account: &Arc<Account>,
        participating_only: bool,
    ) -> Result<Vec<NotificationThread>, GitifyError> {
        let request = self.list_request(account, participating_only);
        let response: Vec<NotificationResponse> = self
            .send(request)
            .await?
            .json()
            .await
            .map_err(classify_transport)?;

        debug!(
            hostname = %account.hostname,
            count = response.len(),
            "listed notifications"
        );
        Ok(response
            .into_iter()
            .map(|item| item.into_thread(account))
            .collect())
    }

    async fn mark_thread_read(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError> {
        self.send(self.thread_read_request(thread_id, hostname, token))
            .await?;
        Ok(())
    }

    async fn mark_thread_done(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError> {
        self.send(self.thread_done_request(thread_id, hostname, token))
            .await?;
        Ok(())
    }

    async fn ignore_thread_subscription(
        &self,
        thread_id: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError> {
        self.send(self.ignore_request(thread_id, hostname, token))
            .await?;
        Ok(())
    }

    async fn mark_repo_notifications_read(
        &self,
        repo_full_name: &str,
        hostname: &str,
        token: &str,
    ) -> Result<(), GitifyError> {
        self.send(self.repo_read_request(repo_full_name, hostname, token))
            .await?;
        Ok(())
    }

    async fn subject_details(
        &self,
        account: &Account,
        subject: &Subject,
    ) -> Result<Option<SubjectDetails>, GitifyError> {
        let Some(url) = subject.url.as_deref() else {
            return Ok(None);
        };
        match subject.kind {
            SubjectType::PullRequest => self.pull_request_details(url, &account.token).await.map(Some),
            SubjectType::Issue => self.issue_details(url, &account.token).await.map(Some),
            _ => Ok(None),
        }
    }
}

fn classify_transport(err: reqwest::Error) -> GitifyError {
    if let Some(status) = err.status() {
        return GitifyError::new(classify_status(status.as_u16(), None, None));
    }
    if err.is_connect() || err.is_timeout() || err.is_request() {
        warn!(error = %err, "GitHub host unreachable");
        return GitifyError::new(FailureKind::Network);
    }
    warn!(error = %err, "unexpected GitHub transport failure");
    GitifyError::new(FailureKind::Unknown)
}

async fn classify_response(response: Response) -> GitifyError {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await.unwrap_or_default();
    classify_parts(status, &headers, &body)
}

/// Classifies a non-success response from its status, headers and raw body.
fn classify_parts(status: u16, headers: &HeaderMap, body: &[u8]) -> GitifyError {
    let remaining = rate_limit_remaining(headers);
    let message = serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .and_then(|body| body.message);
    let kind = classify_status(status, remaining.as_deref(), message.as_deref());
    warn!(
        status,
        kind = ?kind,
        message = message.as_deref().unwrap_or_default(),
        "GitHub API request failed"
    );
    GitifyError::new(kind)
}

fn thread_url(thread_id: &str, hostname: &str) -> String {
    format!("{}notifications/threads/{thread_id}", api_base_url(hostname))
}

fn rate_limit_remaining(headers: &HeaderMap) -> Option<String> {
    headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn issue_state(state: &str, state_reason: Option<&str>) -> SubjectState {
    match (state, state_reason) {
        ("closed", Some("not_planned")) => SubjectState::NotPlanned,
        ("closed", Some("completed")) => SubjectState::Completed,
        ("closed", _) => SubjectState::Closed,
        (_, Some("reopened")) => SubjectState::Reopened,
        _ => SubjectState::Open,
    }
}

/// Keeps each reviewer's latest review, then groups reviewers by its state.
fn group_latest_reviews(reviews: Vec<ReviewResponse>) -> Vec<ReviewGroup> {
    let mut latest: Vec<(String, String)> = Vec::new();
    for review in reviews {
        let Some(user) = review.user else {
            continue;
        };
        match latest.iter_mut().find(|(login, _)| *login == user.login) {
            Some(entry) => entry.1 = review.state,
            None => latest.push((user.login, review.state)),
        }
    }

    let mut groups: Vec<ReviewGroup> = Vec::new();
    let mut by_state: HashMap<String, usize> = HashMap::new();
    for (login, state) in latest {
        match by_state.get(&state) {
            Some(&idx) => groups[idx].users.push(login),
            None => {
                by_state.insert(state.clone(), groups.len());
                groups.push(ReviewGroup {
                    state,
                    users: vec![login],
                });
            }
        }
    }
    groups
}

/// Issue references following a closing keyword, e.g. `Fixes #12`.
fn parse_linked_issues(body: &str) -> Vec<String> {
    let mut linked: Vec<String> = Vec::new();
    let words: Vec<&str> = body.split_whitespace().collect();
    for pair in words.windows(2) {
        let keyword = pair[0]
            .trim_end_matches(':')
            .to_ascii_lowercase();
        if !CLOSING_KEYWORDS.contains(&keyword.as_str()) {
            continue;
        }
        let reference = pair[1].trim_end_matches(|c: char| !c.is_ascii_digit());
        let Some(number) = reference.strip_prefix('#') else {
            continue;
        };
        if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let issue = format!("#{number}");
        if !linked.contains(&issue) {
            linked.push(issue);
        }
    }
    linked
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationResponse {
    id: String,
    reason: Reason,
    #[serde(default)]
    unread: bool,
    updated_at: DateTime<Utc>,
    subject: SubjectResponse,
    repository: RepositoryResponse,
}

impl NotificationResponse {
    fn into_thread(self, account: &Arc<Account>) -> NotificationThread {
        let mut subject = Subject::new(self.subject.title, self.subject.kind);
        subject.url = self.subject.url;
        subject.latest_comment_url = self.subject.latest_comment_url;
        NotificationThread {
            id: self.id,
            account: Arc::clone(account),
            repository_full_name: self.repository.full_name,
            subject,
            reason: self.reason,
            unread: self.unread,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubjectResponse {
    title: String,
    url: Option<String>,
    latest_comment_url: Option<String>,
    #[serde(rename = "type")]
    kind: SubjectType,
}

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
    html_url: Option<String>,
}

impl From<UserResponse> for SubjectUser {
    fn from(user: UserResponse) -> Self {
        SubjectUser {
            login: user.login,
            html_url: user.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MilestoneResponse {
    title: String,
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    state: String,
    state_reason: Option<String>,
    user: Option<UserResponse>,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    milestone: Option<MilestoneResponse>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    state: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    draft: bool,
    user: Option<UserResponse>,
    #[serde(default)]
    comments: u64,
    #[serde(default)]
    labels: Vec<LabelResponse>,
    milestone: Option<MilestoneResponse>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    user: Option<UserResponse>,
    state: String,
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
