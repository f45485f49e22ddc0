use std::sync::Arc;

use anyhow::{Context, Result};
use gitify_core::{
    GitHubClient, NativeNotification, NativeNotifier, NotificationsService, TrayColor, TrayIcon,
    config::ConfigStore, poller,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Tray stand-in for headless runs.
struct LogTray;

impl TrayIcon for LogTray {
    fn set_color(&self, color: TrayColor) {
        info!(color = ?color, "tray icon updated");
    }

    fn set_title(&self, title: &str) {
        if !title.is_empty() {
            info!(title, "tray title updated");
        }
    }
}

struct LogNotifier;

impl NativeNotifier for LogNotifier {
    fn emit(&self, notification: NativeNotification) {
        info!(
            hostname = %notification.key.hostname,
            thread_id = %notification.key.id,
            title = %notification.title,
            body = %notification.body,
            "new notification"
        );
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let store = ConfigStore::initialize().context("failed to locate config directory")?;
    let config = store
        .load()
        .with_context(|| format!("failed to load {}", store.path().display()))?;
    if config.registry.is_empty() {
        warn!(
            path = %store.path().display(),
            "no accounts configured; nothing will be fetched"
        );
    }

    let api = GitHubClient::new().context("failed to build HTTP client")?;
    let service = NotificationsService::new(Arc::new(api), Arc::new(LogTray), Arc::new(LogNotifier));

    poller::run_until(
        &service,
        &config.registry,
        &config.settings,
        config.poll_interval,
        async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        },
    )
    .await;

    Ok(())
}
