use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::entities;
use crate::http_server::{
    error::Report,
    extract::{ApiJson, ApiPath, ApiQuery, CurrentUser},
    state::AppState,
};
use crate::services::calendar_feed::CalendarLinks;
use crate::services::rsvp::{RsvpService, RsvpView};
use crate::services::show::{PublicShowView, ShowQuery, ShowScope, ShowService, ShowView};
use crate::services::{Page, PaginatedResult};
use crate::validation::{ShowInput, parse_rsvp_status};

pub const ICS_CONTENT_TYPE: &str = "text/calendar; charset=utf-8";

#[derive(Debug, Deserialize)]
pub struct ShowListParams {
    community_id: Option<i64>,
    scope: Option<ShowScope>,
    page: Option<u64>,
    page_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RsvpInput {
    status: Option<String>,
}

pub async fn list_shows(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiQuery(params): ApiQuery<ShowListParams>,
) -> Result<Json<PaginatedResult<ShowView>>, Report> {
    let query = ShowQuery {
        community_id: params.community_id,
        scope: params.scope.unwrap_or_default(),
        page: Page::new(params.page, params.page_size),
    };
    Ok(Json(
        ShowService::new(state.db.clone())
            .list(&user.id, query)
            .await?,
    ))
}

pub async fn create_show(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<ShowInput>,
) -> Result<(StatusCode, Json<ShowView>), Report> {
    let show = ShowService::new(state.db.clone())
        .create(&user.id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(show)))
}

pub async fn get_show(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<Json<ShowView>, Report> {
    Ok(Json(
        ShowService::new(state.db.clone())
            .get(&user.id, show_id)
            .await?,
    ))
}

pub async fn update_show(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
    ApiJson(input): ApiJson<ShowInput>,
) -> Result<Json<ShowView>, Report> {
    Ok(Json(
        ShowService::new(state.db.clone())
            .update(&user.id, show_id, input)
            .await?,
    ))
}

pub async fn delete_show(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    ShowService::new(state.db.clone())
        .delete(&user.id, show_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn public_show(
    State(state): State<Arc<AppState>>,
    ApiPath(share_token): ApiPath<String>,
) -> Result<Json<PublicShowView>, Report> {
    Ok(Json(
        ShowService::new(state.db.clone())
            .get_public(&share_token)
            .await?,
    ))
}

pub async fn list_rsvps(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<Json<Vec<RsvpView>>, Report> {
    Ok(Json(
        RsvpService::new(state.db.clone())
            .list(&user.id, show_id)
            .await?,
    ))
}

pub async fn set_rsvp(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
    ApiJson(input): ApiJson<RsvpInput>,
) -> Result<Json<entities::rsvp::Model>, Report> {
    let status = parse_rsvp_status(input.status.as_deref())?;
    Ok(Json(
        RsvpService::new(state.db.clone())
            .set(&user.id, show_id, status)
            .await?,
    ))
}

pub async fn delete_rsvp(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    RsvpService::new(state.db.clone())
        .delete(&user.id, show_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn show_ics(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<impl IntoResponse, Report> {
    let ics = state.calendar.show_ics(&user.id, show_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, ICS_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"show-{show_id}.ics\""),
            ),
        ],
        ics,
    ))
}

pub async fn show_calendar_links(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(show_id): ApiPath<i64>,
) -> Result<Json<CalendarLinks>, Report> {
    Ok(Json(state.calendar.show_links(&user.id, show_id).await?))
}
