use std::time::Duration;

use color_eyre::{Result, eyre::Context};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database as SeaDatabase, DatabaseConnection};

pub struct Database {
    pub conn: DatabaseConnection,
}

impl Database {
    /// Connect to the database at `url` (postgres:// or sqlite://) and run pending migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        tracing::debug!(backend = url_scheme(url), "Connecting to database");

        let mut opt = ConnectOptions::new(url.to_owned());
        opt.max_connections(max_connections)
            .min_connections(1)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .sqlx_logging(false);

        let conn = SeaDatabase::connect(opt)
            .await
            .context("Failed to connect to database")?;

        tracing::debug!("Running database migrations");
        migration::Migrator::up(&conn, None)
            .await
            .context("Failed to run database migrations")?;

        tracing::info!(backend = url_scheme(url), "Database ready");
        Ok(Database { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        self.conn.ping().await.context("Database ping failed")
    }
}

/// Only the scheme is logged; the rest of the URL can carry credentials.
fn url_scheme(url: &str) -> &str {
    url.split_once(':').map_or("unknown", |(scheme, _)| scheme)
}
