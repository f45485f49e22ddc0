use std::collections::HashSet;

use tracing::debug;

use crate::domain::{
    AccountNotifications, NotificationThread, Settings, ThreadKey, thread_keys, total_count,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayColor {
    Active,
    Idle,
}

/// Tray icon collaborator.
pub trait TrayIcon: Send + Sync {
    fn set_color(&self, color: TrayColor);
    fn set_title(&self, title: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeNotification {
    pub key: ThreadKey,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub play_sound: bool,
}

/// OS notification collaborator. Implementations must return promptly and
/// hand the actual delivery off to the platform.
pub trait NativeNotifier: Send + Sync {
    fn emit(&self, notification: NativeNotification);
}

pub fn compute_tray_color(buckets: &[AccountNotifications]) -> TrayColor {
    if buckets.iter().any(|bucket| !bucket.notifications.is_empty()) {
        TrayColor::Active
    } else {
        TrayColor::Idle
    }
}

pub fn tray_title(buckets: &[AccountNotifications], settings: &Settings) -> String {
    let count = total_count(buckets);
    if settings.show_notifications_count_in_tray && count > 0 {
        count.to_string()
    } else {
        String::new()
    }
}

/// Tray state derived from a bucket snapshot, applied separately so it can
/// be computed under a lock and pushed to the tray after release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayUpdate {
    pub color: TrayColor,
    pub title: String,
}

impl TrayUpdate {
    pub fn for_buckets(buckets: &[AccountNotifications], settings: &Settings) -> Self {
        Self {
            color: compute_tray_color(buckets),
            title: tray_title(buckets, settings),
        }
    }

    pub fn apply(&self, tray: &dyn TrayIcon) {
        tray.set_color(self.color);
        tray.set_title(&self.title);
    }
}

pub fn update_tray(buckets: &[AccountNotifications], settings: &Settings, tray: &dyn TrayIcon) {
    TrayUpdate::for_buckets(buckets, settings).apply(tray);
}

/// Threads of `current` whose identity key is absent from `previous`.
pub fn new_threads<'a>(
    previous: &[AccountNotifications],
    current: &'a [AccountNotifications],
) -> Vec<&'a NotificationThread> {
    new_threads_against(&thread_keys(previous), current)
}

/// Threads of `current` whose identity key is not in `seen`.
pub fn new_threads_against<'a>(
    seen: &HashSet<ThreadKey>,
    current: &'a [AccountNotifications],
) -> Vec<&'a NotificationThread> {
    current
        .iter()
        .flat_map(|bucket| bucket.notifications.iter())
        .filter(|thread| !seen.contains(&thread.key()))
        .collect()
}

pub fn native_notification(thread: &NotificationThread, settings: &Settings) -> NativeNotification {
    let title = if settings.show_account_hostname {
        format!("{} - {}", thread.hostname(), thread.repository_full_name)
    } else {
        thread.repository_full_name.clone()
    };
    NativeNotification {
        key: thread.key(),
        title,
        body: thread.subject.title.clone(),
        url: thread.subject.url.clone(),
        play_sound: settings.play_sound,
    }
}

/// Payloads for `threads`, or nothing when native notifications are off.
pub fn native_notifications<'a>(
    threads: impl IntoIterator<Item = &'a NotificationThread>,
    settings: &Settings,
) -> Vec<NativeNotification> {
    if !settings.show_notifications {
        return Vec::new();
    }
    threads
        .into_iter()
        .map(|thread| native_notification(thread, settings))
        .collect()
}

/// Emits one native notification per newly observed thread.
///
/// Without a previous snapshot nothing is emitted: the first fetch only
/// establishes what has already been seen. Returns the number emitted.
pub fn trigger_native_notifications(
    previous: Option<&[AccountNotifications]>,
    current: &[AccountNotifications],
    settings: &Settings,
    notifier: &dyn NativeNotifier,
) -> usize {
    if !settings.show_notifications {
        return 0;
    }
    let Some(previous) = previous else {
        debug!("first fetch, treating all threads as already seen");
        return 0;
    };

    let pending = native_notifications(new_threads(previous, current), settings);
    let emitted = pending.len();
    for notification in pending {
        notifier.emit(notification);
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingNotifier, RecordingTray, cloud, enterprise, thread};

    fn bucket(threads: &[&str]) -> AccountNotifications {
        let account = cloud();
        AccountNotifications {
            notifications: threads
                .iter()
                .map(|id| thread(&account, id, "gitify-app/notifications-test"))
                .collect(),
            account,
        }
    }

    #[test]
    fn tray_color_tracks_any_non_empty_bucket() {
        assert_eq!(compute_tray_color(&[]), TrayColor::Idle);
        assert_eq!(compute_tray_color(&[bucket(&[])]), TrayColor::Idle);
        assert_eq!(compute_tray_color(&[bucket(&["1"])]), TrayColor::Active);
        assert_eq!(
            compute_tray_color(&[bucket(&[]), bucket(&[]), bucket(&[])]),
            TrayColor::Idle
        );
        assert_eq!(
            compute_tray_color(&[bucket(&[]), bucket(&["1", "2"]), bucket(&[])]),
            TrayColor::Active
        );
    }

    #[test]
    fn tray_title_shows_count_only_when_enabled() {
        let buckets = [bucket(&["1", "2"]), bucket(&["3"])];
        assert_eq!(tray_title(&buckets, &Settings::default()), "");
        let settings = Settings {
            show_notifications_count_in_tray: true,
            ..Settings::default()
        };
        assert_eq!(tray_title(&buckets, &settings), "3");
        assert_eq!(tray_title(&[bucket(&[])], &settings), "");
    }

    #[test]
    fn tray_update_applies_color_then_title() {
        let settings = Settings {
            show_notifications_count_in_tray: true,
            ..Settings::default()
        };
        let update = TrayUpdate::for_buckets(&[bucket(&["1", "2"])], &settings);
        assert_eq!(update.color, TrayColor::Active);
        assert_eq!(update.title, "2");

        let tray = RecordingTray::default();
        update.apply(&tray);
        assert_eq!(tray.last_color(), Some(TrayColor::Active));
        assert_eq!(*tray.titles.lock().expect("lock"), vec!["2".to_owned()]);
    }

    #[test]
    fn new_threads_against_seen_set_uses_host_and_id() {
        let seen: HashSet<ThreadKey> = thread_keys(&[bucket(&["1"])]);
        let current = [bucket(&["1", "2"])];
        let fresh = new_threads_against(&seen, &current);
        let ids: Vec<_> = fresh.iter().map(|thread| thread.id.as_str()).collect();
        assert_eq!(ids, vec!["2"]);
        assert!(native_notifications(fresh, &Settings {
            show_notifications: false,
            ..Settings::default()
        })
        .is_empty());
    }

    #[test]
    fn only_new_threads_are_notified() {
        let notifier = RecordingNotifier::default();
        let emitted = trigger_native_notifications(
            Some(&[bucket(&["1"])]),
            &[bucket(&["1", "2"])],
            &Settings::default(),
            &notifier,
        );
        assert_eq!(emitted, 1);
        assert_eq!(notifier.emitted_ids(), vec!["2"]);
    }

    #[test]
    fn resolved_threads_do_not_notify() {
        let notifier = RecordingNotifier::default();
        let emitted = trigger_native_notifications(
            Some(&[bucket(&["1", "2"])]),
            &[bucket(&["1"])],
            &Settings::default(),
            &notifier,
        );
        assert_eq!(emitted, 0);
        assert!(notifier.emitted_ids().is_empty());
    }

    #[test]
    fn same_id_on_another_host_is_new() {
        let enterprise = enterprise();
        let current = vec![
            bucket(&["1"]),
            AccountNotifications {
                notifications: vec![thread(&enterprise, "1", "myorg/repo")],
                account: enterprise,
            },
        ];
        let fresh = new_threads(&[bucket(&["1"])], &current);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].hostname(), "github.gitify.io");
    }

    #[test]
    fn first_fetch_and_disabled_setting_suppress_notifications() {
        let notifier = RecordingNotifier::default();
        assert_eq!(
            trigger_native_notifications(None, &[bucket(&["1"])], &Settings::default(), &notifier),
            0
        );
        let muted = Settings {
            show_notifications: false,
            ..Settings::default()
        };
        assert_eq!(
            trigger_native_notifications(Some(&[]), &[bucket(&["1"])], &muted, &notifier),
            0
        );
        assert!(notifier.emitted_ids().is_empty());
    }

    #[test]
    fn payload_respects_hostname_and_sound_settings() {
        let account = cloud();
        let thread = thread(&account, "1", "gitify-app/notifications-test");
        let settings = Settings {
            show_account_hostname: true,
            play_sound: false,
            ..Settings::default()
        };
        let notification = native_notification(&thread, &settings);
        assert_eq!(notification.title, "github.com - gitify-app/notifications-test");
        assert_eq!(notification.body, "Subject 1");
        assert!(!notification.play_sound);
    }
}
