use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::entities;
use crate::http_server::{
    error::Report,
    extract::{ApiJson, CurrentUser},
    state::AppState,
};
use crate::services::profile::{ProfileService, ProfileUpdate};

#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    profile: entities::profile::Model,
    /// Only ever shown to the profile's owner.
    calendar_feed_url: String,
}

#[derive(Serialize)]
pub struct CalendarTokenResponse {
    calendar_feed_url: String,
}

fn profile_response(state: &AppState, profile: entities::profile::Model) -> ProfileResponse {
    ProfileResponse {
        calendar_feed_url: state.calendar.feed_url(&profile.calendar_token),
        profile,
    }
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Json<ProfileResponse> {
    Json(profile_response(&state, user.profile))
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(update): ApiJson<ProfileUpdate>,
) -> Result<Json<ProfileResponse>, Report> {
    let profile = ProfileService::new(state.db.clone())
        .update(&user.id, update)
        .await?;
    Ok(Json(profile_response(&state, profile)))
}

pub async fn rotate_calendar_token(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<CalendarTokenResponse>, Report> {
    let token = ProfileService::new(state.db.clone())
        .rotate_calendar_token(&user.id)
        .await?;
    Ok(Json(CalendarTokenResponse {
        calendar_feed_url: state.calendar.feed_url(&token),
    }))
}
