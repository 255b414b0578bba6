use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::entities;
use crate::http_server::{
    error::Report,
    extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
    state::AppState,
};
use crate::ports::music_catalog::CatalogArtist;
use crate::services::artist::{ArtistService, ReleaseView};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackArtistInput {
    #[serde(default)]
    spotify_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseParams {
    days: Option<i64>,
}

fn service(state: &AppState) -> ArtistService {
    ArtistService::new(state.db.clone(), state.catalog.clone())
}

pub async fn search_artists(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<Json<Vec<CatalogArtist>>, Report> {
    Ok(Json(service(&state).search(&params.q).await?))
}

pub async fn list_artists(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<entities::artist::Model>>, Report> {
    Ok(Json(service(&state).list(&user.id).await?))
}

pub async fn track_artist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<TrackArtistInput>,
) -> Result<(StatusCode, Json<entities::artist::Model>), Report> {
    let artist = service(&state)
        .track(&user.id, &input.spotify_id)
        .await?;
    Ok((StatusCode::CREATED, Json(artist)))
}

pub async fn untrack_artist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(artist_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    service(&state).untrack(&user.id, artist_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_artist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(artist_id): ApiPath<i64>,
) -> Result<Json<Vec<entities::release::Model>>, Report> {
    Ok(Json(service(&state).sync(&user.id, artist_id).await?))
}

pub async fn recent_releases(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(params): ApiQuery<ReleaseParams>,
) -> Result<Json<Vec<ReleaseView>>, Report> {
    Ok(Json(
        service(&state)
            .recent_releases(&user.id, params.days)
            .await?,
    ))
}
