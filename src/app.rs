use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use constant_time_eq::constant_time_eq;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Bearer token for `/api/*`; `None` leaves the API open.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let api_token = pipeline.config().api_token.as_deref().map(Arc::from);
        Self { pipeline, api_token }
    }
}

pub async fn run_server(state: AppState, bind_addr: &str) -> Result<()> {
    if state.api_token.is_none() {
        warn!("API_TOKEN is not set; control API is unauthenticated");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/config", get(get_config))
        .route("/api/preview", get(preview))
        .route("/api/send", post(send_now))
        .route("/api/stats", get(stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = &state.api_token {
        if !bearer_matches(request.headers(), expected) {
            warn!("Rejecting {} without a valid token", request.uri().path());
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(request).await
}

fn bearer_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| constant_time_eq(token.trim().as_bytes(), expected.as_bytes()))
        .unwrap_or(false)
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.config().redacted())
}

async fn preview(State(state): State<AppState>) -> Response {
    match state.pipeline.preview().await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Preview failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": format!("Preview failed: {}", e)})),
            )
                .into_response()
        }
    }
}

async fn send_now(State(state): State<AppState>) -> impl IntoResponse {
    // The handle is dropped; the send finishes on its own and logs its outcome.
    let _ = state.pipeline.submit_send();
    info!("Send submitted from control API");
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted"})),
    )
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pipeline.stats().await)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        term.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(!bearer_matches(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(bearer_matches(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cre"));
        assert!(!bearer_matches(&headers, "s3cret"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic s3cret"));
        assert!(!bearer_matches(&headers, "s3cret"));
    }
}
