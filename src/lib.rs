//! Notification state core for a multi-account GitHub tray client.
//!
//! [`NotificationsService`] owns the reconciled per-account notification
//! mirror and drives read/done/unsubscribe operations through a
//! [`NotificationsApi`] implementation such as [`GitHubClient`].

pub mod aggregator;
pub mod config;
pub mod domain;
pub mod effects;
pub mod error;
pub mod facade;
pub mod github;
pub mod poller;
pub mod reconcile;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use domain::{
    Account, AccountNotifications, AccountType, AggregateState, FetchStatus, NotificationThread,
    Settings, ThreadKey,
};
pub use effects::{NativeNotification, NativeNotifier, TrayColor, TrayIcon};
pub use error::{FailureKind, GitifyError};
pub use facade::NotificationsService;
pub use github::{GitHubClient, NotificationsApi};
pub use registry::{AccountRegistry, RegistryError};
