//! Pure transformations over the per-account buckets.
//!
//! Every function returns a new bucket sequence and leaves its input alone.
//! Missing hosts, ids or repositories are no-ops so that removing something
//! already gone is harmless.

use crate::domain::{AccountNotifications, NotificationThread};

pub fn remove_one(
    buckets: &[AccountNotifications],
    hostname: &str,
    thread_id: &str,
) -> Vec<AccountNotifications> {
    retain_in_bucket(buckets, hostname, |thread| thread.id != thread_id)
}

pub fn remove_all_for_repo(
    buckets: &[AccountNotifications],
    hostname: &str,
    repo_full_name: &str,
) -> Vec<AccountNotifications> {
    retain_in_bucket(buckets, hostname, |thread| {
        thread.repository_full_name != repo_full_name
    })
}

/// Threads of one repository within the bucket for `hostname`.
pub fn threads_for_repo<'a>(
    buckets: &'a [AccountNotifications],
    hostname: &str,
    repo_full_name: &str,
) -> Vec<&'a NotificationThread> {
    buckets
        .iter()
        .filter(|bucket| bucket.hostname() == hostname)
        .flat_map(|bucket| bucket.notifications.iter())
        .filter(|thread| thread.repository_full_name == repo_full_name)
        .collect()
}

fn retain_in_bucket(
    buckets: &[AccountNotifications],
    hostname: &str,
    keep: impl Fn(&NotificationThread) -> bool,
) -> Vec<AccountNotifications> {
    buckets
        .iter()
        .map(|bucket| {
            if bucket.hostname() != hostname {
                return bucket.clone();
            }
            AccountNotifications {
                account: bucket.account.clone(),
                notifications: bucket
                    .notifications
                    .iter()
                    .filter(|thread| keep(thread))
                    .cloned()
                    .collect(),
            }
        })
        .collect()
}
