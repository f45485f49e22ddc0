use std::{
    collections::HashSet,
    future::Future,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::{
    aggregator::{self, FetchedNotifications},
    domain::{
        AccountNotifications, AggregateState, FetchStatus, NotificationThread, Settings,
        ThreadKey, thread_keys,
    },
    effects::{self, NativeNotification, NativeNotifier, TrayIcon, TrayUpdate},
    error::GitifyError,
    github::NotificationsApi,
    reconcile,
    registry::AccountRegistry,
};

struct ServiceState {
    current: AggregateState,
    /// Sequence number of the newest fetch whose outcome was committed.
    committed_fetch: u64,
    /// Threads already announced or baselined. Keys of a host whose latest
    /// fetch failed are carried over until that host answers again.
    seen: HashSet<ThreadKey>,
    /// Hosts with at least one successful fetch.
    baselined_hosts: HashSet<String>,
}

impl ServiceState {
    fn replace_buckets(&mut self, buckets: Vec<AccountNotifications>) {
        let kept = thread_keys(&buckets);
        let removed: Vec<ThreadKey> = thread_keys(&self.current.buckets)
            .into_iter()
            .filter(|key| !kept.contains(key))
            .collect();
        for key in &removed {
            self.seen.remove(key);
        }
        self.current.buckets = buckets;
    }
}

/// Side effects computed under the state lock and dispatched after it is
/// released, so collaborators may call back into the service.
#[derive(Default)]
struct PendingEffects {
    tray: Option<TrayUpdate>,
    notifications: Vec<NativeNotification>,
}

impl PendingEffects {
    fn tray(update: TrayUpdate) -> Self {
        Self {
            tray: Some(update),
            notifications: Vec::new(),
        }
    }
}

/// Owns the reconciled notification state and sequences every operation
/// against it: API call first, then reconciliation, then side effects.
///
/// Operations may overlap. Mutations reconcile against whatever state is
/// current when they complete, and a fetch that finishes after a newer
/// fetch has been committed is discarded. The tray and notifier are never
/// called while the state lock is held.
pub struct NotificationsService {
    api: Arc<dyn NotificationsApi>,
    tray: Arc<dyn TrayIcon>,
    notifier: Arc<dyn NativeNotifier>,
    state: Mutex<ServiceState>,
    fetch_sequence: AtomicU64,
}

impl NotificationsService {
    pub fn new(
        api: Arc<dyn NotificationsApi>,
        tray: Arc<dyn TrayIcon>,
        notifier: Arc<dyn NativeNotifier>,
    ) -> Self {
        Self {
            api,
            tray,
            notifier,
            state: Mutex::new(ServiceState {
                current: AggregateState::default(),
                committed_fetch: 0,
                seen: HashSet::new(),
                baselined_hosts: HashSet::new(),
            }),
            fetch_sequence: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> AggregateState {
        self.lock_state().current.clone()
    }

    pub async fn fetch_notifications(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
    ) -> Result<(), GitifyError> {
        let sequence = self.fetch_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(FetchStatus::Loading);

        let outcome = aggregator::fetch_all(self.api.as_ref(), auth.accounts(), settings).await;

        let (result, pending) = self.commit_fetch(sequence, outcome, settings);
        self.dispatch(pending);
        result
    }

    fn commit_fetch(
        &self,
        sequence: u64,
        outcome: Result<FetchedNotifications, GitifyError>,
        settings: &Settings,
    ) -> (Result<(), GitifyError>, PendingEffects) {
        let mut state = self.lock_state();
        if sequence < state.committed_fetch {
            debug!(sequence, committed = state.committed_fetch, "discarding superseded fetch");
            return (outcome.map(|_| ()), PendingEffects::default());
        }
        state.committed_fetch = sequence;

        let fetched = match outcome {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(error = %err, "notification fetch failed for every account");
                state.current.status = FetchStatus::Error;
                state.current.error = Some(err.clone());
                return (Err(err), PendingEffects::default());
            }
        };

        // A host's first successful fetch only establishes its baseline.
        let notifications = effects::native_notifications(
            effects::new_threads_against(&state.seen, &fetched.buckets)
                .into_iter()
                .filter(|thread| state.baselined_hosts.contains(thread.hostname())),
            settings,
        );

        let mut seen = thread_keys(&fetched.buckets);
        seen.extend(
            state
                .seen
                .iter()
                .filter(|key| fetched.failed(&key.hostname))
                .cloned(),
        );
        state.seen = seen;
        for bucket in &fetched.buckets {
            if !fetched.failed(bucket.hostname()) {
                state
                    .baselined_hosts
                    .insert(bucket.hostname().to_owned());
            }
        }

        info!(
            accounts = fetched.buckets.len(),
            failed = fetched.failed_hosts.len(),
            notifications = crate::domain::total_count(&fetched.buckets),
            emitted = notifications.len(),
            "notifications fetched"
        );

        let tray = TrayUpdate::for_buckets(&fetched.buckets, settings);
        state.current = AggregateState {
            status: FetchStatus::Success,
            error: None,
            buckets: fetched.buckets,
        };
        (
            Ok(()),
            PendingEffects {
                tray: Some(tray),
                notifications,
            },
        )
    }

    pub async fn mark_notification_read(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        thread: &NotificationThread,
    ) -> Result<(), GitifyError> {
        let hostname = thread.hostname();
        self.mutate(
            settings,
            async {
                let token = auth.resolve_token(hostname)?;
                self.api.mark_thread_read(&thread.id, hostname, token).await
            },
            |buckets| reconcile::remove_one(buckets, hostname, &thread.id),
        )
        .await
    }

    pub async fn mark_notification_done(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        thread: &NotificationThread,
    ) -> Result<(), GitifyError> {
        let hostname = thread.hostname();
        self.mutate(
            settings,
            async {
                let token = auth.resolve_token(hostname)?;
                self.api.mark_thread_done(&thread.id, hostname, token).await
            },
            |buckets| reconcile::remove_one(buckets, hostname, &thread.id),
        )
        .await
    }

    /// Ignores the thread's subscription, then marks it read.
    pub async fn unsubscribe_notification(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        thread: &NotificationThread,
    ) -> Result<(), GitifyError> {
        let hostname = thread.hostname();
        self.mutate(
            settings,
            async {
                let token = auth.resolve_token(hostname)?;
                self.api
                    .ignore_thread_subscription(&thread.id, hostname, token)
                    .await?;
                self.api.mark_thread_read(&thread.id, hostname, token).await
            },
            |buckets| reconcile::remove_one(buckets, hostname, &thread.id),
        )
        .await
    }

    pub async fn mark_repo_notifications(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        repo_full_name: &str,
        hostname: &str,
    ) -> Result<(), GitifyError> {
        self.mutate(
            settings,
            async {
                let token = auth.resolve_token(hostname)?;
                self.api
                    .mark_repo_notifications_read(repo_full_name, hostname, token)
                    .await
            },
            |buckets| reconcile::remove_all_for_repo(buckets, hostname, repo_full_name),
        )
        .await
    }

    /// Marks every known thread of the repository done, one call per thread.
    ///
    /// All calls settle before the repository is removed from state; the
    /// removal happens even if some calls failed, in which case the first
    /// failure is reported.
    pub async fn mark_repo_notifications_done(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        repo_full_name: &str,
        hostname: &str,
    ) -> Result<(), GitifyError> {
        self.set_status(FetchStatus::Loading);
        let token = match auth.resolve_token(hostname) {
            Ok(token) => token,
            Err(err) => return self.commit_failure(err.into()),
        };

        let thread_ids: Vec<String> = {
            let state = self.lock_state();
            reconcile::threads_for_repo(&state.current.buckets, hostname, repo_full_name)
                .into_iter()
                .map(|thread| thread.id.clone())
                .collect()
        };

        let results = join_all(
            thread_ids
                .iter()
                .map(|id| self.api.mark_thread_done(id, hostname, token)),
        )
        .await;
        let first_failure = results.into_iter().find_map(Result::err);

        let (result, update) = {
            let mut state = self.lock_state();
            let buckets =
                reconcile::remove_all_for_repo(&state.current.buckets, hostname, repo_full_name);
            state.replace_buckets(buckets);
            let result = match first_failure {
                Some(err) => {
                    warn!(
                        hostname,
                        repo = repo_full_name,
                        error = %err,
                        "some threads could not be marked done"
                    );
                    state.current.status = FetchStatus::Error;
                    state.current.error = Some(err.clone());
                    Err(err)
                }
                None => {
                    state.current.status = FetchStatus::Success;
                    state.current.error = None;
                    Ok(())
                }
            };
            (result, TrayUpdate::for_buckets(&state.current.buckets, settings))
        };
        self.dispatch(PendingEffects::tray(update));
        result
    }

    /// Drops a thread locally, for threads already resolved server side.
    pub fn remove_notification_from_state(&self, settings: &Settings, id: &str, hostname: &str) {
        let update = {
            let mut state = self.lock_state();
            let buckets = reconcile::remove_one(&state.current.buckets, hostname, id);
            state.replace_buckets(buckets);
            TrayUpdate::for_buckets(&state.current.buckets, settings)
        };
        self.dispatch(PendingEffects::tray(update));
    }

    /// Handles the user opening a thread in the browser.
    pub async fn open_notification(
        &self,
        auth: &AccountRegistry,
        settings: &Settings,
        thread: &NotificationThread,
    ) -> Result<(), GitifyError> {
        if settings.mark_as_done_on_open {
            return self.mark_notification_done(auth, settings, thread).await;
        }
        self.remove_notification_from_state(settings, &thread.id, thread.hostname());
        Ok(())
    }

    async fn mutate<F>(
        &self,
        settings: &Settings,
        call: F,
        apply: impl FnOnce(&[AccountNotifications]) -> Vec<AccountNotifications>,
    ) -> Result<(), GitifyError>
    where
        F: Future<Output = Result<(), GitifyError>>,
    {
        self.set_status(FetchStatus::Loading);
        if let Err(err) = call.await {
            return self.commit_failure(err);
        }

        let update = {
            let mut state = self.lock_state();
            let buckets = apply(&state.current.buckets);
            state.replace_buckets(buckets);
            state.current.status = FetchStatus::Success;
            state.current.error = None;
            TrayUpdate::for_buckets(&state.current.buckets, settings)
        };
        self.dispatch(PendingEffects::tray(update));
        Ok(())
    }

    fn commit_failure(&self, err: GitifyError) -> Result<(), GitifyError> {
        warn!(error = %err, "notification action failed");
        let mut state = self.lock_state();
        state.current.status = FetchStatus::Error;
        state.current.error = Some(err.clone());
        Err(err)
    }

    fn dispatch(&self, pending: PendingEffects) {
        if let Some(update) = pending.tray {
            update.apply(self.tray.as_ref());
        }
        for notification in pending.notifications {
            self.notifier.emit(notification);
        }
    }

    fn set_status(&self, status: FetchStatus) {
        self.lock_state().current.status = status;
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
