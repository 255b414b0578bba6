pub use sea_orm_migration::prelude::*;

mod m20260301_000001_create_communities_and_shows;
mod m20260315_000001_create_artist_tracking;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260301_000001_create_communities_and_shows::Migration),
            Box::new(m20260315_000001_create_artist_tracking::Migration),
        ]
    }
}
