use serde::Deserialize;

use crate::ports::music_catalog::{CatalogArtist, CatalogRelease};

/// Client credentials token response
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyImage {
    pub url: String,
    pub width: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpotifyExternalUrls {
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyFollowers {
    pub total: Option<i64>,
}

/// Spotify artist from API
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub followers: Option<SpotifyFollowers>,
    #[serde(default)]
    pub external_urls: SpotifyExternalUrls,
}

/// Spotify album (simplified object) from API
#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyAlbum {
    pub id: String,
    pub name: String,
    pub album_type: String,
    /// Present on the artist albums endpoint; wins over `album_type`.
    pub album_group: Option<String>,
    pub release_date: String,
    pub release_date_precision: String,
    pub total_tracks: i32,
    #[serde(default)]
    pub images: Vec<SpotifyImage>,
    #[serde(default)]
    pub external_urls: SpotifyExternalUrls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyPage<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifySearchResponse {
    pub artists: SpotifyPage<SpotifyArtist>,
}

/// Picks the widest image; Spotify usually sends several sizes.
fn largest_image(images: &[SpotifyImage]) -> Option<String> {
    images
        .iter()
        .max_by_key(|image| image.width.unwrap_or(0))
        .map(|image| image.url.clone())
}

impl From<SpotifyArtist> for CatalogArtist {
    fn from(artist: SpotifyArtist) -> Self {
        Self {
            image_url: largest_image(&artist.images),
            id: artist.id,
            name: artist.name,
            genres: artist.genres,
            followers: artist.followers.and_then(|f| f.total),
            url: artist.external_urls.spotify,
        }
    }
}

impl From<SpotifyAlbum> for CatalogRelease {
    fn from(album: SpotifyAlbum) -> Self {
        Self {
            image_url: largest_image(&album.images),
            id: album.id,
            name: album.name,
            release_type: album.album_group.unwrap_or(album.album_type),
            release_date: album.release_date,
            release_date_precision: album.release_date_precision,
            total_tracks: album.total_tracks,
            url: album.external_urls.spotify,
        }
    }
}
