use std::sync::Arc;

use axum::{
    RequestPartsExt,
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};

use crate::entities;
use crate::error::DomainError;
use crate::http_server::{error::Report, state::AppState};
use crate::services::profile::ProfileService;

/// `axum::Json` with rejections reported as `{"error": ...}` 400s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(Report))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(Report))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(Report))]
pub struct ApiQuery<T>(pub T);

/// The authenticated caller. Their profile is created on first sight.
pub struct CurrentUser {
    pub id: String,
    pub profile: entities::profile::Model,
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = Report;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| DomainError::Unauthorized)?;

        let user = state
            .auth
            .verify(bearer.token())
            .await?
            .ok_or(DomainError::Unauthorized)?;

        let profile = ProfileService::new(state.db.clone()).ensure(&user).await?;
        Ok(CurrentUser {
            id: user.id,
            profile,
        })
    }
}
