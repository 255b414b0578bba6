use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::InMemoryState, state::direct::NotKeyed,
};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use crate::ports::music_catalog::{CatalogArtist, CatalogRelease, MusicCatalog};
use crate::services::spotify::types::{
    SpotifyAlbum, SpotifyArtist, SpotifyPage, SpotifySearchResponse, SpotifyTokenResponse,
};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API_URL: &str = "https://api.spotify.com/v1/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh the token this long before Spotify says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const MAX_RELEASE_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct SpotifyApiCredentials {
    client_id: String,
    client_secret: String,
}

impl SpotifyApiCredentials {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpotifyRequestError {
    #[error("Failed to send http request: {0}")]
    FailedToSendRequest(reqwest::Error),
    #[error("Spotify responded with {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },
    #[error("Failed to parse response: {0}")]
    FailedToParseResponse(reqwest::Error),
}

impl SpotifyRequestError {
    /// Timeouts, throttling and server errors are worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            SpotifyRequestError::FailedToSendRequest(_) => true,
            SpotifyRequestError::UnexpectedStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            SpotifyRequestError::FailedToParseResponse(_) => false,
        }
    }
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Spotify Web API client using the client credentials flow.
pub struct SpotifyCatalogClient {
    client: reqwest::Client,
    credentials: SpotifyApiCredentials,
    api_url: Url,
    token_url: Url,
    token: Mutex<Option<AccessToken>>,
    rate_limiter: DirectRateLimiter,
}

impl SpotifyCatalogClient {
    pub fn new(credentials: SpotifyApiCredentials, requests_per_second: u32) -> Result<Self> {
        Self::with_endpoints(
            credentials,
            requests_per_second,
            SPOTIFY_API_URL,
            SPOTIFY_TOKEN_URL,
        )
    }

    pub fn with_endpoints(
        credentials: SpotifyApiCredentials,
        requests_per_second: u32,
        api_url: &str,
        token_url: &str,
    ) -> Result<Self> {
        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .wrap_err("Failed to build Spotify http client")?,
            credentials,
            api_url: Url::parse(api_url).wrap_err("Invalid Spotify API URL")?,
            token_url: Url::parse(token_url).wrap_err("Invalid Spotify token URL")?,
            token: Mutex::new(None),
            rate_limiter: RateLimiter::direct(quota),
        })
    }

    /// Returns a cached access token, fetching a new one when it is about to expire.
    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some(existing) = token.as_ref()
            && existing.expires_at > Instant::now()
        {
            return Ok(existing.value.clone());
        }

        tracing::debug!(client_id = self.credentials.client_id(), "Requesting Spotify access token");
        let response = self
            .client
            .post(self.token_url.clone())
            // This automatically serializes to x-www-form-urlencoded (as required by spotify)
            .form(&[("grant_type", "client_credentials")])
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .send()
            .await
            .map_err(SpotifyRequestError::FailedToSendRequest)?;

        if !response.status().is_success() {
            return Err(SpotifyRequestError::UnexpectedStatus {
                status: response.status(),
                body: response
                    .text()
                    .await
                    .unwrap_or("Failed to get error text".to_string()),
            })
            .wrap_err("Spotify rejected the client credentials");
        }

        let token_response: SpotifyTokenResponse = response
            .json()
            .await
            .map_err(SpotifyRequestError::FailedToParseResponse)?;

        let lifetime = Duration::from_secs(token_response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *token = Some(AccessToken {
            value: token_response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token_response.access_token)
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        url: &Url,
        access_token: &str,
    ) -> Result<T, SpotifyRequestError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(url.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(SpotifyRequestError::FailedToSendRequest)?;

        if !response.status().is_success() {
            return Err(SpotifyRequestError::UnexpectedStatus {
                status: response.status(),
                body: response
                    .text()
                    .await
                    .unwrap_or("Failed to get error text".to_string()),
            });
        }

        response
            .json()
            .await
            .map_err(SpotifyRequestError::FailedToParseResponse)
    }

    /// GET a Spotify endpoint, retrying with exponential backoff since the API throttles bursts.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let access_token = self.access_token().await?;
        let value = (|| async { self.send_once::<T>(&url, &access_token).await })
            .retry(ExponentialBuilder::default().with_max_times(3))
            .when(SpotifyRequestError::is_retryable)
            .notify(|err, delay| {
                tracing::warn!(error = %err, ?delay, "Retrying Spotify request");
            })
            .await
            .wrap_err_with(|| format!("Spotify request failed: {}", url.path()))?;
        Ok(value)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .wrap_err_with(|| format!("Invalid Spotify endpoint: {path}"))
    }
}

#[async_trait::async_trait]
impl MusicCatalog for SpotifyCatalogClient {
    async fn search_artists(&self, query: &str, limit: u32) -> Result<Vec<CatalogArtist>> {
        let mut url = self.endpoint("search")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("type", "artist")
            .append_pair("limit", &limit.clamp(1, 50).to_string());

        let response: SpotifySearchResponse = self.get_json(url).await?;
        Ok(response.artists.items.into_iter().map(Into::into).collect())
    }

    async fn artist(&self, artist_id: &str) -> Result<CatalogArtist> {
        let url = self.endpoint(&format!("artists/{}", urlencoding::encode(artist_id)))?;
        let artist: SpotifyArtist = self.get_json(url).await?;
        Ok(artist.into())
    }

    async fn artist_releases(&self, artist_id: &str) -> Result<Vec<CatalogRelease>> {
        let mut url = self.endpoint(&format!(
            "artists/{}/albums",
            urlencoding::encode(artist_id)
        ))?;
        url.query_pairs_mut()
            .append_pair("include_groups", "album,single")
            .append_pair("limit", "50");

        let mut releases = Vec::new();
        let mut next_url = Some(url);
        let mut pages = 0;

        while let Some(url) = next_url {
            let page: SpotifyPage<SpotifyAlbum> = self.get_json(url).await?;
            releases.extend(page.items.into_iter().map(CatalogRelease::from));
            pages += 1;
            if pages >= MAX_RELEASE_PAGES {
                tracing::warn!(artist_id, pages, "Stopping release pagination early");
                break;
            }
            next_url = page
                .next
                .map(|next| Url::parse(&next))
                .transpose()
                .wrap_err("Spotify returned an invalid next page URL")?;
        }

        Ok(releases)
    }
}

/// Stand-in used when no Spotify credentials are configured.
pub struct UnconfiguredCatalog;

#[async_trait::async_trait]
impl MusicCatalog for UnconfiguredCatalog {
    async fn search_artists(&self, _query: &str, _limit: u32) -> Result<Vec<CatalogArtist>> {
        Err(unconfigured())
    }

    async fn artist(&self, _artist_id: &str) -> Result<CatalogArtist> {
        Err(unconfigured())
    }

    async fn artist_releases(&self, _artist_id: &str) -> Result<Vec<CatalogRelease>> {
        Err(unconfigured())
    }
}

fn unconfigured() -> color_eyre::Report {
    crate::error::DomainError::Unavailable("Music catalog is not configured".to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainError, find_domain_error};

    #[test]
    fn test_retryable_statuses() {
        let throttled = SpotifyRequestError::UnexpectedStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        let server = SpotifyRequestError::UnexpectedStatus {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let not_found = SpotifyRequestError::UnexpectedStatus {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };

        assert!(throttled.is_retryable());
        assert!(server.is_retryable());
        assert!(!not_found.is_retryable());
    }

    #[test]
    fn test_endpoint_joins_api_base() {
        let client = SpotifyCatalogClient::new(
            SpotifyApiCredentials::new("id".into(), "secret".into()),
            5,
        )
        .unwrap();

        assert_eq!(
            client.endpoint("artists/abc/albums").unwrap().as_str(),
            "https://api.spotify.com/v1/artists/abc/albums"
        );
    }

    #[tokio::test]
    async fn test_unconfigured_catalog_is_unavailable() {
        let err = UnconfiguredCatalog.search_artists("big thief", 5).await.unwrap_err();
        assert!(matches!(
            find_domain_error(&err),
            Some(DomainError::Unavailable(_))
        ));
    }
}
