use std::{collections::HashSet, sync::Arc};

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::{
    domain::{Account, AccountNotifications, NotificationThread, Settings},
    error::GitifyError,
    github::NotificationsApi,
};

/// Result of one fan-out across all accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedNotifications {
    /// One bucket per account in registry order; failed accounts are empty.
    pub buckets: Vec<AccountNotifications>,
    /// Hosts whose listing failed in this round.
    pub failed_hosts: Vec<String>,
}

impl FetchedNotifications {
    pub fn failed(&self, hostname: &str) -> bool {
        self.failed_hosts.iter().any(|host| host == hostname)
    }
}

/// Fetches every account concurrently and merges the results into one
/// bucket per account, in registry order.
///
/// Accounts are settled independently: a failed account yields an empty
/// bucket as long as at least one other account succeeded. Only when every
/// account fails is the first failure (in registry order) returned.
pub async fn fetch_all(
    api: &dyn NotificationsApi,
    accounts: &[Arc<Account>],
    settings: &Settings,
) -> Result<FetchedNotifications, GitifyError> {
    let results = join_all(
        accounts
            .iter()
            .map(|account| fetch_account(api, account, settings)),
    )
    .await;

    let mut first_failure = None;
    let mut failed_hosts = Vec::new();
    let buckets: Vec<AccountNotifications> = accounts
        .iter()
        .zip(results)
        .map(|(account, result)| match result {
            Ok(notifications) => AccountNotifications {
                account: Arc::clone(account),
                notifications,
            },
            Err(err) => {
                warn!(
                    hostname = %account.hostname,
                    error = %err,
                    "notification fetch failed for account"
                );
                failed_hosts.push(account.hostname.clone());
                first_failure.get_or_insert(err);
                AccountNotifications::empty(Arc::clone(account))
            }
        })
        .collect();

    match first_failure {
        Some(err) if failed_hosts.len() == accounts.len() => Err(err),
        _ => Ok(FetchedNotifications {
            buckets,
            failed_hosts,
        }),
    }
}

async fn fetch_account(
    api: &dyn NotificationsApi,
    account: &Arc<Account>,
    settings: &Settings,
) -> Result<Vec<NotificationThread>, GitifyError> {
    let fetched = api
        .list_notifications(account, settings.participating)
        .await?;
    let mut threads = normalize(account, fetched);
    if settings.detailed_notifications {
        enrich(api, account, &mut threads).await;
    }
    Ok(threads)
}

/// Drops threads that belong to another host or repeat an id already seen.
fn normalize(account: &Account, fetched: Vec<NotificationThread>) -> Vec<NotificationThread> {
    let mut seen = HashSet::new();
    fetched
        .into_iter()
        .filter(|thread| {
            if thread.hostname() != account.hostname {
                warn!(
                    hostname = %account.hostname,
                    thread_host = %thread.hostname(),
                    "dropping thread attributed to another host"
                );
                return false;
            }
            seen.insert(thread.id.clone())
        })
        .collect()
}

async fn enrich(api: &dyn NotificationsApi, account: &Account, threads: &mut [NotificationThread]) {
    let details = join_all(
        threads
            .iter()
            .map(|thread| api.subject_details(account, &thread.subject)),
    )
    .await;

    for (thread, result) in threads.iter_mut().zip(details) {
        match result {
            Ok(Some(details)) => details.apply_to(&mut thread.subject),
            Ok(None) => {}
            Err(err) => debug!(
                hostname = %account.hostname,
                thread_id = %thread.id,
                error = %err,
                "subject details unavailable"
            ),
        }
    }
}
