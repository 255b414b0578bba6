use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{EntityTrait, QueryOrder};
use tracing::instrument;

use crate::database::Database;
use crate::entities;
use crate::ports::music_catalog::MusicCatalog;
use crate::services::artist::store_new_releases;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseCheckSummary {
    pub artists_checked: usize,
    pub new_releases: usize,
    pub failures: usize,
}

/// Syncs releases for every tracked artist. A failing artist is logged and skipped.
///
/// Artists tracked by several users share one catalog lookup.
#[instrument(skip(db, catalog))]
pub async fn check_all_releases(
    db: &Database,
    catalog: &dyn MusicCatalog,
    delay: Duration,
) -> Result<ReleaseCheckSummary> {
    let artists = entities::artist::Entity::find()
        .order_by_asc(entities::artist::Column::SpotifyId)
        .all(&db.conn)
        .await
        .wrap_err("Failed to fetch tracked artists")?;

    let mut by_catalog_id: BTreeMap<String, Vec<entities::artist::Model>> = BTreeMap::new();
    for artist in artists {
        by_catalog_id
            .entry(artist.spotify_id.clone())
            .or_default()
            .push(artist);
    }

    tracing::info!(artists = by_catalog_id.len(), "Checking for new releases");
    let mut summary = ReleaseCheckSummary::default();

    for (index, (spotify_id, trackers)) in by_catalog_id.iter().enumerate() {
        if index > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let releases = match catalog.artist_releases(spotify_id).await {
            Ok(releases) => releases,
            Err(e) => {
                tracing::error!(spotify_id, "Failed to fetch releases: {e:?}");
                summary.failures += 1;
                continue;
            }
        };

        for artist in trackers {
            match store_new_releases(&db.conn, artist, &releases, Utc::now()).await {
                Ok(inserted) => {
                    summary.artists_checked += 1;
                    summary.new_releases += inserted.len();
                    for release in &inserted {
                        tracing::info!(
                            artist = %artist.name,
                            user_id = %artist.user_id,
                            release = %release.name,
                            release_date = %release.release_date,
                            "New release"
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(artist_id = artist.id, "Failed to store releases: {e:?}");
                    summary.failures += 1;
                }
            }
        }
    }

    tracing::info!(
        artists_checked = summary.artists_checked,
        new_releases = summary.new_releases,
        failures = summary.failures,
        "Release check finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use color_eyre::eyre::eyre;
    use sea_orm::{ActiveModelBehavior, ActiveModelTrait, Set};

    use super::*;
    use crate::ports::music_catalog::MockMusicCatalog;
    use crate::services::artist::tests::catalog_release;
    use crate::test_utils::test_db;

    async fn insert_artist(db: &Database, user_id: &str, spotify_id: &str) -> entities::artist::Model {
        entities::artist::ActiveModel {
            user_id: Set(user_id.into()),
            spotify_id: Set(spotify_id.into()),
            name: Set(format!("Artist {spotify_id}")),
            genres: Set(String::new()),
            ..entities::artist::ActiveModel::new()
        }
        .insert(&db.conn)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let db = test_db().await;
        insert_artist(&db, "u1", "broken").await;
        insert_artist(&db, "u1", "healthy").await;

        let mut catalog = MockMusicCatalog::new();
        catalog.expect_artist_releases().returning(|id| {
            if id == "broken" {
                Err(eyre!("catalog unavailable"))
            } else {
                Ok(vec![catalog_release("r1", "2026-10-01", "day")])
            }
        });

        let summary = check_all_releases(&db, &catalog, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(
            summary,
            ReleaseCheckSummary {
                artists_checked: 1,
                new_releases: 1,
                failures: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_shared_artist_fetched_once() {
        let db = test_db().await;
        insert_artist(&db, "u1", "a1").await;
        insert_artist(&db, "u2", "a1").await;

        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_artist_releases()
            .times(1)
            .returning(|_| Ok(vec![catalog_release("r1", "2026-10-01", "day")]));
        let catalog = Arc::new(catalog);

        let summary = check_all_releases(&db, catalog.as_ref(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(summary.artists_checked, 2);
        assert_eq!(summary.new_releases, 2);

        let releases = entities::release::Entity::find().all(&db.conn).await.unwrap();
        assert_eq!(releases.len(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_finds_nothing_new() {
        let db = test_db().await;
        insert_artist(&db, "u1", "a1").await;

        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_artist_releases()
            .returning(|_| Ok(vec![catalog_release("r1", "2026-10-01", "day")]));

        check_all_releases(&db, &catalog, Duration::ZERO).await.unwrap();
        let summary = check_all_releases(&db, &catalog, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.new_releases, 0);
        assert_eq!(summary.artists_checked, 1);
    }
}
