use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::ports::auth::AuthVerifier;
use crate::ports::music_catalog::MusicCatalog;
use crate::rate_limit::RateLimiter;
use crate::services::calendar_feed::CalendarService;

pub struct AppState {
    pub db: Arc<Database>,
    pub config: Config,
    pub auth: Arc<dyn AuthVerifier>,
    pub catalog: Arc<dyn MusicCatalog>,
    pub rate_limiter: RateLimiter,
    pub calendar: CalendarService,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        config: Config,
        auth: Arc<dyn AuthVerifier>,
        catalog: Arc<dyn MusicCatalog>,
    ) -> color_eyre::Result<Self> {
        let calendar = CalendarService::new(db.clone(), &config.public_base_url)?;
        Ok(Self {
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            db,
            config,
            auth,
            catalog,
            calendar,
        })
    }
}
