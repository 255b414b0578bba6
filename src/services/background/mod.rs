use std::sync::Arc;

use crate::config::Config;
use crate::http_server::state::AppState;

pub mod release_check;

/// Release checks need the job enabled and a catalog to ask.
pub fn release_checks_configured(config: &Config) -> bool {
    if !config.release_check.enabled {
        tracing::info!("Release checks disabled");
        return false;
    }
    if config.spotify.is_none() {
        tracing::warn!("No [spotify] section in config; skipping release checks");
        return false;
    }
    true
}

pub fn run_background_tasks(app_state: Arc<AppState>) {
    if !release_checks_configured(&app_state.config) {
        return;
    }
    let release_check = app_state.config.release_check.clone();

    // Check tracked artists for new releases
    let _ = tokio::spawn(async move {
        tracing::info!(interval = ?release_check.interval, "Checking releases in background");
        loop {
            tokio::time::sleep(release_check.interval).await;
            match release_check::check_all_releases(
                &app_state.db,
                app_state.catalog.as_ref(),
                release_check.delay,
            )
            .await
            {
                Ok(_) => {}
                Err(e) => tracing::error!("Failed to check for new releases: {e:?}"),
            }
        }
    });
}
