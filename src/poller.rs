use std::{future::Future, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::{domain::Settings, facade::NotificationsService, registry::AccountRegistry};

/// Fetches on every tick of `period` until `shutdown` resolves.
///
/// `shutdown` is polled for the whole run, including while a fetch is in
/// flight; an interrupted fetch is dropped without committing.
pub async fn run_until<F>(
    service: &NotificationsService,
    auth: &AccountRegistry,
    settings: &Settings,
    period: Duration,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            _ = async {
                ticker.tick().await;
                // Failures are already logged and recorded in the service state.
                let _ = service.fetch_notifications(auth, settings).await;
            } => {}
        }
    }
}
