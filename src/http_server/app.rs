use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    routing::{delete, get, post, put},
};
use color_eyre::eyre::{Context, eyre};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::http_server::{
    http_routes::{artists, calendar, communities, profile, shows},
    rate_limit::rate_limit,
    state::AppState,
};
use crate::services::background::run_background_tasks;

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!("Health check failed: {e:?}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

fn cors_layer(origins: &[String]) -> color_eyre::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::RETRY_AFTER]);

    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).wrap_err_with(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<color_eyre::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/profile",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .route(
            "/profile/calendar-token",
            post(profile::rotate_calendar_token),
        )
        .route(
            "/communities",
            get(communities::list_communities).post(communities::create_community),
        )
        .route(
            "/communities/{id}",
            get(communities::get_community)
                .patch(communities::update_community)
                .delete(communities::delete_community),
        )
        .route("/communities/{id}/members", get(communities::list_members))
        .route(
            "/communities/{id}/members/{user_id}",
            delete(communities::remove_member),
        )
        .route("/communities/{id}/leave", post(communities::leave_community))
        .route(
            "/communities/{id}/invites",
            get(communities::list_invites).post(communities::create_invite),
        )
        .route("/invites/{id}", delete(communities::revoke_invite))
        .route("/invites/{id}/accept", post(communities::accept_invite))
        .route("/shows", get(shows::list_shows).post(shows::create_show))
        .route(
            "/shows/{id}",
            get(shows::get_show)
                .patch(shows::update_show)
                .delete(shows::delete_show),
        )
        .route("/shows/{id}/rsvps", get(shows::list_rsvps))
        .route(
            "/shows/{id}/rsvp",
            put(shows::set_rsvp).delete(shows::delete_rsvp),
        )
        .route("/shows/{id}/calendar.ics", get(shows::show_ics))
        .route(
            "/shows/{id}/calendar-links",
            get(shows::show_calendar_links),
        )
        .route("/public/shows/{share_token}", get(shows::public_show))
        .route("/calendar/{calendar_token}", get(calendar::calendar_feed))
        .route("/artists/search", get(artists::search_artists))
        .route(
            "/artists",
            get(artists::list_artists).post(artists::track_artist),
        )
        .route("/artists/{id}", delete(artists::untrack_artist))
        .route("/artists/{id}/sync", post(artists::sync_artist))
        .route("/releases", get(artists::recent_releases))
}

/// The full application router. `/health` sits outside the rate limiter.
pub fn router(app_state: Arc<AppState>) -> color_eyre::Result<Router> {
    let cors = cors_layer(&app_state.config.cors_origins)?;

    let api = api_routes().layer(middleware::from_fn_with_state(
        app_state.clone(),
        rate_limit,
    ));

    Ok(Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(app_state))
}

pub async fn start(port: u16, app_state: Arc<AppState>) -> color_eyre::Result<()> {
    let app = router(app_state.clone())?;

    run_background_tasks(app_state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .wrap_err_with(|| eyre!("Failed to bind to port {}", port))?;
    tracing::info!(port, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .wrap_err("Failed to start HTTP server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
