use color_eyre::eyre::Result;
use serde::Serialize;

/// Decoupled representation of an artist from the music catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogArtist {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub genres: Vec<String>,
    pub followers: Option<i64>,
    pub url: Option<String>,
}

/// Decoupled representation of an album or single from the music catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRelease {
    pub id: String,
    pub name: String,
    pub release_type: String,
    /// "2024", "2024-05" or "2024-05-10" depending on `release_date_precision`.
    pub release_date: String,
    pub release_date_precision: String,
    pub total_tracks: i32,
    pub image_url: Option<String>,
    pub url: Option<String>,
}

/// Port trait wrapping the music catalog capabilities used by business logic.
///
/// Implementations live in `services::spotify::client` (production) or test mocks.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MusicCatalog: Send + Sync {
    async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<CatalogArtist>>;
    async fn artist(&self, artist_id: &str) -> Result<CatalogArtist>;
    async fn artist_releases(&self, artist_id: &str) -> Result<Vec<CatalogRelease>>;
}
