//! HTTP routes, all under `/api/v1`.
//!
//! `/api/v1/auth/*` is public. Everything else requires an access token
//! (bearer header or `auth_token` cookie) and passes through
//! [`auth_middleware`].

pub mod auth;
pub mod environments;
pub mod orgs;
pub mod projects;
pub mod users;

use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use axum::middleware as axum_mw;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::auth_middleware;
use crate::state::AppState;

/// Plain acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Build the complete application router.
pub fn router(state: Arc<AppState>) -> Router {
    let authenticated = Router::new()
        .merge(users::router())
        .merge(orgs::router())
        .merge(projects::router())
        .merge(environments::router())
        .route_layer(axum_mw::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let api = Router::new()
        .nest("/auth", auth::router())
        .merge(authenticated);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}
