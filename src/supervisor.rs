//! The Background Supervisor (§4.L). A periodic loop in the shape of the
//! teacher's `bg_poll::background_polling::poll_repo_updates` — sleep,
//! sweep, repeat — driving `cleanup_stuck_operations` on
//! `cleanup_interval_seconds` instead of a per-repo git poll.

use std::time::Duration;

use tracing::{error, info};

use crate::application::Application;

pub async fn run(app: Application) {
    let interval = Duration::from_secs(app.config.cleanup_interval_seconds);
    info!(interval_seconds = interval.as_secs(), "background supervisor started");

    loop {
        tokio::time::sleep(interval).await;
        match app.sync_manager.cleanup_stuck_operations().await {
            Ok(count) if count > 0 => info!(count, "supervisor reclaimed stuck sync operations"),
            Ok(_) => {}
            Err(err) => error!(error = %err, "supervisor cleanup sweep failed"),
        }
    }
}
