use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use color_eyre::eyre::{Result, WrapErr};
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;

use crate::database::Database;
use crate::entities;
use crate::error::DomainError;
use crate::ports::music_catalog::{CatalogArtist, CatalogRelease, MusicCatalog};

pub const DEFAULT_RELEASE_WINDOW_DAYS: i64 = 30;
const MAX_RELEASE_WINDOW_DAYS: i64 = 365;
const SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseView {
    #[serde(flatten)]
    pub release: entities::release::Model,
    pub artist_name: String,
}

/// Catalog dates come as "2024", "2024-05" or "2024-05-10"; coarse ones map to the
/// first day of their period.
pub fn parse_release_date(date: &str, precision: &str) -> Option<NaiveDate> {
    match precision {
        "day" => NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
        "month" => NaiveDate::parse_from_str(&format!("{date}-01"), "%Y-%m-%d").ok(),
        "year" => date
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        _ => None,
    }
}

/// Stores the releases not seen before for `artist` and stamps `last_checked_at`.
pub(crate) async fn store_new_releases(
    conn: &impl ConnectionTrait,
    artist: &entities::artist::Model,
    releases: &[CatalogRelease],
    now: DateTime<Utc>,
) -> Result<Vec<entities::release::Model>> {
    let mut known: HashSet<String> = entities::release::Entity::find()
        .select_only()
        .column(entities::release::Column::SpotifyId)
        .filter(entities::release::Column::ArtistId.eq(artist.id))
        .into_tuple::<String>()
        .all(conn)
        .await
        .wrap_err("Failed to fetch known releases")?
        .into_iter()
        .collect();

    let mut inserted = Vec::new();
    for release in releases {
        if known.contains(&release.id) {
            continue;
        }
        let Some(release_date) =
            parse_release_date(&release.release_date, &release.release_date_precision)
        else {
            tracing::warn!(
                artist = %artist.name,
                release_id = %release.id,
                date = %release.release_date,
                precision = %release.release_date_precision,
                "Skipping release with unparseable date"
            );
            continue;
        };

        let model = entities::release::ActiveModel {
            artist_id: Set(artist.id),
            spotify_id: Set(release.id.clone()),
            name: Set(release.name.clone()),
            release_type: Set(release.release_type.clone()),
            release_date: Set(release_date),
            release_date_precision: Set(release.release_date_precision.clone()),
            total_tracks: Set(release.total_tracks),
            image_url: Set(release.image_url.clone()),
            spotify_url: Set(release.url.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(conn)
        .await
        .wrap_err_with(|| format!("Failed to save release {}", release.id))?;

        known.insert(release.id.clone());
        inserted.push(model);
    }

    let mut checked: entities::artist::ActiveModel = artist.clone().into();
    checked.last_checked_at = Set(Some(now));
    checked
        .update(conn)
        .await
        .wrap_err("Failed to update artist check time")?;

    Ok(inserted)
}

pub struct ArtistService {
    db: Arc<Database>,
    catalog: Arc<dyn MusicCatalog>,
}

impl ArtistService {
    pub fn new(db: Arc<Database>, catalog: Arc<dyn MusicCatalog>) -> Self {
        Self { db, catalog }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<CatalogArtist>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(DomainError::validation("q is required").into());
        }
        self.catalog.search_artists(query, SEARCH_LIMIT).await
    }

    /// Starts tracking an artist and pulls in their existing releases.
    #[tracing::instrument(skip(self))]
    pub async fn track(&self, user_id: &str, spotify_id: &str) -> Result<entities::artist::Model> {
        let spotify_id = spotify_id.trim();
        if spotify_id.is_empty() {
            return Err(DomainError::validation("spotify_id is required").into());
        }
        if self.find_by_spotify_id(user_id, spotify_id).await?.is_some() {
            return Err(DomainError::conflict("you already track this artist").into());
        }

        let catalog_artist = self.catalog.artist(spotify_id).await?;
        let releases = self.catalog.artist_releases(&catalog_artist.id).await?;

        let txn = self
            .db
            .conn
            .begin()
            .await
            .wrap_err("Failed to start transaction")?;
        let artist = entities::artist::ActiveModel {
            user_id: Set(user_id.to_string()),
            spotify_id: Set(catalog_artist.id.clone()),
            name: Set(catalog_artist.name.clone()),
            image_url: Set(catalog_artist.image_url.clone()),
            genres: Set(catalog_artist.genres.join(",")),
            spotify_url: Set(catalog_artist.url.clone()),
            ..entities::artist::ActiveModel::new()
        }
        .insert(&txn)
        .await;

        let artist = match artist {
            Ok(artist) => artist,
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(DomainError::conflict("you already track this artist").into());
            }
            Err(err) => return Err(err).wrap_err("Failed to save artist"),
        };

        let inserted = store_new_releases(&txn, &artist, &releases, Utc::now()).await?;
        txn.commit().await.wrap_err("Failed to commit tracked artist")?;
        tracing::info!(artist = %artist.name, releases = inserted.len(), "Tracking artist");

        self.get(user_id, artist.id).await
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<entities::artist::Model>> {
        entities::artist::Entity::find()
            .filter(entities::artist::Column::UserId.eq(user_id))
            .order_by_asc(entities::artist::Column::Name)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch tracked artists")
    }

    pub async fn untrack(&self, user_id: &str, artist_id: i64) -> Result<()> {
        let artist = self.get(user_id, artist_id).await?;
        artist
            .delete(&self.db.conn)
            .await
            .wrap_err("Failed to untrack artist")?;
        Ok(())
    }

    /// Fetches the artist's catalog and returns only the releases that were new.
    pub async fn sync(&self, user_id: &str, artist_id: i64) -> Result<Vec<entities::release::Model>> {
        let artist = self.get(user_id, artist_id).await?;
        let releases = self.catalog.artist_releases(&artist.spotify_id).await?;
        store_new_releases(&self.db.conn, &artist, &releases, Utc::now()).await
    }

    pub async fn recent_releases(&self, user_id: &str, days: Option<i64>) -> Result<Vec<ReleaseView>> {
        self.recent_releases_on(user_id, days, Utc::now().date_naive())
            .await
    }

    /// Releases dated within the last `days` days (inclusive of `today`), newest first.
    pub async fn recent_releases_on(
        &self,
        user_id: &str,
        days: Option<i64>,
        today: NaiveDate,
    ) -> Result<Vec<ReleaseView>> {
        let days = days.unwrap_or(DEFAULT_RELEASE_WINDOW_DAYS);
        if !(1..=MAX_RELEASE_WINDOW_DAYS).contains(&days) {
            return Err(DomainError::validation(format!(
                "days must be between 1 and {MAX_RELEASE_WINDOW_DAYS}"
            ))
            .into());
        }
        let since = today - Duration::days(days);

        let releases = entities::release::Entity::find()
            .find_also_related(entities::artist::Entity)
            .filter(entities::artist::Column::UserId.eq(user_id))
            .filter(entities::release::Column::ReleaseDate.gte(since))
            .filter(entities::release::Column::ReleaseDate.lte(today))
            .order_by_desc(entities::release::Column::ReleaseDate)
            .order_by_asc(entities::release::Column::Name)
            .all(&self.db.conn)
            .await
            .wrap_err("Failed to fetch recent releases")?;

        Ok(releases
            .into_iter()
            .filter_map(|(release, artist)| {
                artist.map(|artist| ReleaseView {
                    release,
                    artist_name: artist.name,
                })
            })
            .collect())
    }

    async fn get(&self, user_id: &str, artist_id: i64) -> Result<entities::artist::Model> {
        let artist = entities::artist::Entity::find_by_id(artist_id)
            .filter(entities::artist::Column::UserId.eq(user_id))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch artist")?
            .ok_or(DomainError::NotFound("artist"))?;
        Ok(artist)
    }

    async fn find_by_spotify_id(
        &self,
        user_id: &str,
        spotify_id: &str,
    ) -> Result<Option<entities::artist::Model>> {
        entities::artist::Entity::find()
            .filter(entities::artist::Column::UserId.eq(user_id))
            .filter(entities::artist::Column::SpotifyId.eq(spotify_id))
            .one(&self.db.conn)
            .await
            .wrap_err("Failed to fetch artist")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::find_domain_error;
    use crate::ports::music_catalog::MockMusicCatalog;
    use crate::test_utils::test_db;

    pub(crate) fn catalog_artist(id: &str, name: &str) -> CatalogArtist {
        CatalogArtist {
            id: id.into(),
            name: name.into(),
            image_url: None,
            genres: vec!["indie folk".into(), "indie rock".into()],
            followers: Some(1000),
            url: Some(format!("https://open.spotify.com/artist/{id}")),
        }
    }

    pub(crate) fn catalog_release(id: &str, date: &str, precision: &str) -> CatalogRelease {
        CatalogRelease {
            id: id.into(),
            name: format!("Release {id}"),
            release_type: "album".into(),
            release_date: date.into(),
            release_date_precision: precision.into(),
            total_tracks: 10,
            image_url: None,
            url: None,
        }
    }

    fn mock_catalog(releases: Vec<CatalogRelease>) -> MockMusicCatalog {
        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_artist()
            .returning(|id| Ok(catalog_artist(id, "Big Thief")));
        catalog
            .expect_artist_releases()
            .returning(move |_| Ok(releases.clone()));
        catalog
    }

    #[test]
    fn test_parse_release_date_precisions() {
        assert_eq!(
            parse_release_date("2024-05-10", "day"),
            NaiveDate::from_ymd_opt(2024, 5, 10)
        );
        assert_eq!(
            parse_release_date("2024-05", "month"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(
            parse_release_date("2016", "year"),
            NaiveDate::from_ymd_opt(2016, 1, 1)
        );
        assert_eq!(parse_release_date("2024-13-01", "day"), None);
        assert_eq!(parse_release_date("2024", "decade"), None);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let db = test_db().await;
        let service = ArtistService::new(db, Arc::new(MockMusicCatalog::new()));

        let err = service.search("   ").await.unwrap_err();
        assert!(matches!(
            find_domain_error(&err),
            Some(DomainError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_search_passes_trimmed_query() {
        let db = test_db().await;
        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_search_artists()
            .withf(|query, limit| query == "big thief" && *limit == SEARCH_LIMIT)
            .returning(|_, _| Ok(vec![catalog_artist("a1", "Big Thief")]));
        let service = ArtistService::new(db, Arc::new(catalog));

        let results = service.search("  big thief ").await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_track_stores_artist_and_releases() {
        let db = test_db().await;
        let catalog = mock_catalog(vec![
            catalog_release("r1", "2026-01-16", "day"),
            catalog_release("r2", "2019-10", "month"),
            catalog_release("r3", "not a date", "day"),
        ]);
        let service = ArtistService::new(db.clone(), Arc::new(catalog));

        let artist = service.track("u1", "a1").await.unwrap();

        assert_eq!(artist.name, "Big Thief");
        assert_eq!(artist.genres, "indie folk,indie rock");
        assert!(artist.last_checked_at.is_some());
        let releases = entities::release::Entity::find().all(&db.conn).await.unwrap();
        assert_eq!(releases.len(), 2);
    }

    #[tokio::test]
    async fn test_track_twice_conflicts() {
        let db = test_db().await;
        let service = ArtistService::new(db, Arc::new(mock_catalog(vec![])));

        service.track("u1", "a1").await.unwrap();
        let err = service.track("u1", "a1").await.unwrap_err();
        assert!(matches!(
            find_domain_error(&err),
            Some(DomainError::Conflict(_))
        ));

        // A different user may track the same artist.
        service.track("u2", "a1").await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_release_fetch_leaves_nothing_tracked() {
        let db = test_db().await;
        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_artist()
            .returning(|id| Ok(catalog_artist(id, "Big Thief")));
        let mut calls = 0;
        catalog.expect_artist_releases().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(color_eyre::eyre::eyre!("catalog timed out"))
            } else {
                Ok(vec![catalog_release("r1", "2026-01-16", "day")])
            }
        });
        let service = ArtistService::new(db.clone(), Arc::new(catalog));

        assert!(service.track("u1", "a1").await.is_err());
        assert!(service.list("u1").await.unwrap().is_empty());

        let artist = service.track("u1", "a1").await.unwrap();
        assert_eq!(artist.name, "Big Thief");
        let releases = entities::release::Entity::find().all(&db.conn).await.unwrap();
        assert_eq!(releases.len(), 1);
    }

    #[tokio::test]
    async fn test_sync_returns_only_new_releases() {
        let db = test_db().await;
        let mut catalog = MockMusicCatalog::new();
        catalog
            .expect_artist()
            .returning(|id| Ok(catalog_artist(id, "Big Thief")));
        let mut calls = 0;
        catalog.expect_artist_releases().returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(vec![catalog_release("r1", "2026-01-16", "day")])
            } else {
                Ok(vec![
                    catalog_release("r1", "2026-01-16", "day"),
                    catalog_release("r2", "2026-03-02", "day"),
                ])
            }
        });
        let service = ArtistService::new(db, Arc::new(catalog));

        let artist = service.track("u1", "a1").await.unwrap();
        let new_releases = service.sync("u1", artist.id).await.unwrap();

        assert_eq!(new_releases.len(), 1);
        assert_eq!(new_releases[0].spotify_id, "r2");

        let err = service.sync("u2", artist.id).await.unwrap_err();
        assert_eq!(
            find_domain_error(&err),
            Some(&DomainError::NotFound("artist"))
        );
    }

    #[tokio::test]
    async fn test_untrack_removes_releases() {
        let db = test_db().await;
        let catalog = mock_catalog(vec![catalog_release("r1", "2026-01-16", "day")]);
        let service = ArtistService::new(db.clone(), Arc::new(catalog));

        let artist = service.track("u1", "a1").await.unwrap();
        service.untrack("u1", artist.id).await.unwrap();

        assert!(service.list("u1").await.unwrap().is_empty());
        let releases = entities::release::Entity::find().all(&db.conn).await.unwrap();
        assert!(releases.is_empty());
    }

    #[tokio::test]
    async fn test_recent_releases_window() {
        let db = test_db().await;
        let catalog = mock_catalog(vec![
            catalog_release("today", "2026-10-19", "day"),
            catalog_release("last-month", "2026-09-25", "day"),
            catalog_release("old", "2026-01-01", "day"),
            catalog_release("future", "2026-11-20", "day"),
        ]);
        let service = ArtistService::new(db, Arc::new(catalog));
        service.track("u1", "a1").await.unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();

        let recent = service.recent_releases_on("u1", None, today).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|r| r.release.spotify_id.as_str()).collect();
        assert_eq!(ids, vec!["today", "last-month"]);
        assert_eq!(recent[0].artist_name, "Big Thief");

        let narrow = service.recent_releases_on("u1", Some(7), today).await.unwrap();
        assert_eq!(narrow.len(), 1);

        assert!(service.recent_releases_on("u2", None, today).await.unwrap().is_empty());

        let err = service
            .recent_releases_on("u1", Some(0), today)
            .await
            .unwrap_err();
        assert!(matches!(
            find_domain_error(&err),
            Some(DomainError::Validation(_))
        ));
    }
}
