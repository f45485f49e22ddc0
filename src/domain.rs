use std::{collections::HashSet, fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GitifyError;

// Domain data structures shared across modules.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Cloud,
    Enterprise,
}

/// An authenticated GitHub account. The hostname is the identity key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub hostname: String,
    pub token: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

impl Account {
    pub fn new(hostname: impl Into<String>, token: impl Into<String>, kind: AccountType) -> Self {
        Self {
            hostname: hostname.into(),
            token: token.into(),
            account_type: kind,
        }
    }
}

// Tokens must never end up in logs.
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("hostname", &self.hostname)
            .field("token", &"<redacted>")
            .field("account_type", &self.account_type)
            .finish()
    }
}

/// Thread ids are only unique within a host, so identity is the pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub hostname: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubjectType {
    CheckSuite,
    Commit,
    Discussion,
    Issue,
    PullRequest,
    Release,
    RepositoryInvitation,
    RepositoryVulnerabilityAlert,
    WorkflowRun,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectState {
    Open,
    Closed,
    Merged,
    Draft,
    Reopened,
    Completed,
    NotPlanned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    ApprovalRequested,
    Assign,
    Author,
    CiActivity,
    Comment,
    Invitation,
    Manual,
    Mention,
    ReviewRequested,
    SecurityAlert,
    StateChange,
    Subscribed,
    TeamMention,
    #[serde(other)]
    Unknown,
}

impl Reason {
    pub fn label(self) -> &'static str {
        match self {
            Reason::ApprovalRequested => "Approval requested",
            Reason::Assign => "Assigned",
            Reason::Author => "Authored",
            Reason::CiActivity => "Workflow run",
            Reason::Comment => "Commented",
            Reason::Invitation => "Invitation",
            Reason::Manual => "Manually subscribed",
            Reason::Mention => "Mentioned",
            Reason::ReviewRequested => "Review requested",
            Reason::SecurityAlert => "Security alert",
            Reason::StateChange => "State changed",
            Reason::Subscribed => "Updated",
            Reason::TeamMention => "Team mentioned",
            Reason::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectUser {
    pub login: String,
    pub html_url: Option<String>,
}

/// Reviewers grouped by the state of their latest review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewGroup {
    pub state: String,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub title: String,
    /// API url of the subject (issue, pull request, release, ...).
    pub url: Option<String>,
    pub latest_comment_url: Option<String>,
    pub kind: SubjectType,
    pub state: Option<SubjectState>,
    pub user: Option<SubjectUser>,
    pub comments: Option<u64>,
    pub labels: Vec<String>,
    pub linked_issues: Vec<String>,
    pub reviews: Vec<ReviewGroup>,
    pub milestone: Option<String>,
}

impl Subject {
    pub fn new(title: impl Into<String>, kind: SubjectType) -> Self {
        Self {
            title: title.into(),
            url: None,
            latest_comment_url: None,
            kind,
            state: None,
            user: None,
            comments: None,
            labels: Vec::new(),
            linked_issues: Vec::new(),
            reviews: Vec::new(),
            milestone: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationThread {
    pub id: String,
    pub account: Arc<Account>,
    pub repository_full_name: String,
    pub subject: Subject,
    pub reason: Reason,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
}

impl NotificationThread {
    pub fn hostname(&self) -> &str {
        &self.account.hostname
    }

    pub fn key(&self) -> ThreadKey {
        ThreadKey {
            hostname: self.account.hostname.clone(),
            id: self.id.clone(),
        }
    }
}

/// All currently relevant threads of one account, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountNotifications {
    pub account: Arc<Account>,
    pub notifications: Vec<NotificationThread>,
}

impl AccountNotifications {
    pub fn empty(account: Arc<Account>) -> Self {
        Self {
            account,
            notifications: Vec::new(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.account.hostname
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// The reconciled notification mirror owned by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    pub status: FetchStatus,
    pub error: Option<GitifyError>,
    pub buckets: Vec<AccountNotifications>,
}

impl AggregateState {
    pub fn is_fetching(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn request_failed(&self) -> bool {
        self.status == FetchStatus::Error
    }

    pub fn bucket(&self, hostname: &str) -> Option<&AccountNotifications> {
        self.buckets
            .iter()
            .find(|bucket| bucket.hostname() == hostname)
    }

    pub fn total_count(&self) -> usize {
        total_count(&self.buckets)
    }
}

pub fn total_count(buckets: &[AccountNotifications]) -> usize {
    buckets.iter().map(|bucket| bucket.notifications.len()).sum()
}

pub fn thread_keys(buckets: &[AccountNotifications]) -> HashSet<ThreadKey> {
    buckets
        .iter()
        .flat_map(|bucket| bucket.notifications.iter().map(NotificationThread::key))
        .collect()
}

/// User preferences, consumed read-only by the notification core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub participating: bool,
    pub show_notifications: bool,
    pub mark_as_done_on_open: bool,
    pub delay_notification_state: bool,
    pub show_pills: bool,
    pub play_sound: bool,
    pub show_notifications_count_in_tray: bool,
    pub show_account_hostname: bool,
    pub detailed_notifications: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            participating: false,
            show_notifications: true,
            mark_as_done_on_open: false,
            delay_notification_state: false,
            show_pills: true,
            play_sound: true,
            show_notifications_count_in_tray: false,
            show_account_hostname: false,
            detailed_notifications: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_debug_redacts_token() {
        let account = Account::new("github.com", "ghp_secret", AccountType::Cloud);
        let rendered = format!("{account:?}");
        assert!(rendered.contains("github.com"));
        assert!(!rendered.contains("ghp_secret"));
    }

    #[test]
    fn settings_fill_missing_fields_with_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"participating": true}"#).expect("parse");
        assert!(settings.participating);
        assert!(settings.show_notifications);
        assert!(!settings.mark_as_done_on_open);
    }

    #[test]
    fn unknown_reason_and_subject_type_deserialize() {
        let reason: Reason = serde_json::from_str(r#""brand_new_reason""#).expect("reason");
        assert_eq!(reason, Reason::Unknown);
        let kind: SubjectType = serde_json::from_str(r#""PullRequest""#).expect("kind");
        assert_eq!(kind, SubjectType::PullRequest);
        let kind: SubjectType = serde_json::from_str(r#""SomethingElse""#).expect("kind");
        assert_eq!(kind, SubjectType::Unknown);
    }

    #[test]
    fn account_type_serializes_under_type_key() {
        let account = Account::new("ghe.example.com", "t", AccountType::Enterprise);
        let json = serde_json::to_value(&account).expect("serialize");
        assert_eq!(json["type"], "enterprise");
    }
}
