use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};

use crate::entities;
use crate::http_server::{
    error::Report,
    extract::{ApiJson, ApiPath, CurrentUser},
    state::AppState,
};
use crate::services::community::{
    CommunityInput, CommunityService, CommunityView, InviteOptions, MemberView,
};

fn service(state: &AppState) -> CommunityService {
    CommunityService::new(state.db.clone())
}

pub async fn list_communities(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<CommunityView>>, Report> {
    Ok(Json(service(&state).list_for_user(&user.id).await?))
}

pub async fn create_community(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiJson(input): ApiJson<CommunityInput>,
) -> Result<(StatusCode, Json<CommunityView>), Report> {
    let community = service(&state).create(&user.id, input).await?;
    Ok((StatusCode::CREATED, Json(community)))
}

pub async fn get_community(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
) -> Result<Json<CommunityView>, Report> {
    Ok(Json(service(&state).get(&user.id, community_id).await?))
}

pub async fn update_community(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
    ApiJson(input): ApiJson<CommunityInput>,
) -> Result<Json<CommunityView>, Report> {
    Ok(Json(
        service(&state)
            .update(&user.id, community_id, input)
            .await?,
    ))
}

pub async fn delete_community(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    service(&state).delete(&user.id, community_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
) -> Result<Json<Vec<MemberView>>, Report> {
    Ok(Json(service(&state).members(&user.id, community_id).await?))
}

pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath((community_id, member_id)): ApiPath<(i64, String)>,
) -> Result<StatusCode, Report> {
    service(&state)
        .remove_member(&user.id, community_id, &member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn leave_community(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    service(&state).leave(&user.id, community_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_invites(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
) -> Result<Json<Vec<entities::community_invite::Model>>, Report> {
    Ok(Json(
        service(&state)
            .list_invites(&user.id, community_id)
            .await?,
    ))
}

pub async fn create_invite(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(community_id): ApiPath<i64>,
    ApiJson(options): ApiJson<InviteOptions>,
) -> Result<(StatusCode, Json<entities::community_invite::Model>), Report> {
    let invite = service(&state)
        .create_invite(&user.id, community_id, options)
        .await?;
    Ok((StatusCode::CREATED, Json(invite)))
}

pub async fn revoke_invite(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(invite_id): ApiPath<i64>,
) -> Result<StatusCode, Report> {
    service(&state).revoke_invite(&user.id, invite_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn accept_invite(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<CommunityView>, Report> {
    Ok(Json(service(&state).accept_invite(&user.id, &token).await?))
}
