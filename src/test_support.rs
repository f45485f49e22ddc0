use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::{
    domain::{Account, AccountType, NotificationThread, Reason, Subject, SubjectType},
    effects::{NativeNotification, NativeNotifier, TrayColor, TrayIcon},
    error::{FailureKind, GitifyError},
    github::{NotificationsApi, SubjectDetails},
};

pub(crate) fn cloud() -> Arc<Account> {
    Arc::new(Account::new("github.com", "cloud-token", AccountType::Cloud))
}

pub(crate) fn enterprise() -> Arc<Account> {
    Arc::new(Account::new(
        "github.gitify.io",
        "enterprise-token",
        AccountType::Enterprise,
    ))
}

pub(crate) fn thread(account: &Arc<Account>, id: &str, repo: &str) -> NotificationThread {
    NotificationThread {
        id: id.to_owned(),
        account: Arc::clone(account),
        repository_full_name: repo.to_owned(),
        subject: Subject::new(format!("Subject {id}"), SubjectType::Issue),
        reason: Reason::Subscribed,
        unread: true,
        updated_at: Utc.with_ymd_and_hms(2024, 5, 20, 17, 51, 57).unwrap(),
    }
}

/// Scripted API: listing results are keyed by hostname and consumed
/// front to back; mutating calls are recorded and fail for ids listed
/// in `failing_ids`.
#[derive(Default)]
pub(crate) struct StubApi {
    pub listings: Mutex<HashMap<String, Vec<Result<Vec<NotificationThread>, GitifyError>>>>,
    pub calls: Mutex<Vec<String>>,
    pub failing_ids: Mutex<HashSet<String>>,
    pub gate: Option<Arc<tokio::sync::Notify>>,
    pub details: Option<SubjectDetails>,
}

impl StubApi {
    pub(crate) fn listing(
        self,
        hostname: &str,
        result: Result<Vec<NotificationThread>, GitifyError>,
    ) -> Self {
        self.listings
            .lock()
            .expect("lock")
            .entry(hostname.to_owned())
            .or_default()
            .push(result);
        self
    }

    pub(crate) fn failing(self, id: &str) -> Self {
        self.failing_ids.lock().expect("lock").insert(id.to_owned());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }

    fn record(&self, call: String) -> Result<(), GitifyError> {
        let failing = self
            .failing_ids
            .lock()
            .expect("lock")
            .iter()
            .any(|id| call.ends_with(&format!(" {id}")));
        self.calls.lock().expect("lock").push(call);
        if failing {
            Err(GitifyError::new(FailureKind::Unknown))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationsApi for StubApi {
    async fn list_notifications(
        &self,
        account: &Arc<Account>,
        participating_only: bool,
    ) -> Result<Vec<NotificationThread>, GitifyError> {
        self.calls
            .lock()
            .expect("lock")
            .push(format!("list {}", account.hostname));
        if participating_only && let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut listings = self.listings.lock().expect("lock");
        let queue = listings.entry(account.hostname.clone()).or_default();
        if queue.is_empty() {
            return Ok(Vec::new());
        }
        queue.remove(0)
    }

    async fn mark_thread_read(
        &self,
        thread_id: &str,
        hostname: &str,
        _token: &str,
    ) -> Result<(), GitifyError> {
        self.record(format!("read {hostname} {thread_id}"))
    }

    async fn mark_thread_done(
        &self,
        thread_id: &str,
        hostname: &str,
        _token: &str,
    ) -> Result<(), GitifyError> {
        self.record(format!("done {hostname} {thread_id}"))
    }

    async fn ignore_thread_subscription(
        &self,
        thread_id: &str,
        hostname: &str,
        _token: &str,
    ) -> Result<(), GitifyError> {
        self.record(format!("ignore {hostname} {thread_id}"))
    }

    async fn mark_repo_notifications_read(
        &self,
        repo_full_name: &str,
        hostname: &str,
        _token: &str,
    ) -> Result<(), GitifyError> {
        self.record(format!("repo-read {hostname} {repo_full_name}"))
    }

    async fn subject_details(
        &self,
        _account: &Account,
        subject: &Subject,
    ) -> Result<Option<SubjectDetails>, GitifyError> {
        if subject.title.ends_with("broken") {
            return Err(GitifyError::new(FailureKind::Network));
        }
        Ok(self.details.clone())
    }
}

#[derive(Default)]
pub(crate) struct RecordingTray {
    pub colors: Mutex<Vec<TrayColor>>,
    pub titles: Mutex<Vec<String>>,
}

impl RecordingTray {
    pub(crate) fn last_color(&self) -> Option<TrayColor> {
        self.colors.lock().expect("lock").last().copied()
    }
}

impl TrayIcon for RecordingTray {
    fn set_color(&self, color: TrayColor) {
        self.colors.lock().expect("lock").push(color);
    }

    fn set_title(&self, title: &str) {
        self.titles.lock().expect("lock").push(title.to_owned());
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub emitted: Mutex<Vec<NativeNotification>>,
}

impl RecordingNotifier {
    pub(crate) fn emitted_ids(&self) -> Vec<String> {
        self.emitted
            .lock()
            .expect("lock")
            .iter()
            .map(|notification| notification.key.id.clone())
            .collect()
    }
}

impl NativeNotifier for RecordingNotifier {
    fn emit(&self, notification: NativeNotification) {
        self.emitted.lock().expect("lock").push(notification);
    }
}
