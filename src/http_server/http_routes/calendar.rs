use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse};

use crate::http_server::{
    error::Report, extract::ApiPath, http_routes::shows::ICS_CONTENT_TYPE, state::AppState,
};

/// Personal feed for calendar apps. The token in the path is the only credential.
pub async fn calendar_feed(
    State(state): State<Arc<AppState>>,
    ApiPath(token): ApiPath<String>,
) -> Result<impl IntoResponse, Report> {
    // Some calendar apps only subscribe to URLs ending in .ics
    let token = token.strip_suffix(".ics").unwrap_or(&token);
    let ics = state.calendar.feed(token).await?;
    Ok((
        [
            (header::CONTENT_TYPE, ICS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "private, max-age=300"),
        ],
        ics,
    ))
}
