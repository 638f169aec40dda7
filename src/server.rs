use anyhow::{Context, Result};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::catalog::Recommendation;
use crate::config::Config;
use crate::error::RecommendError;
use crate::recommend::Recommender;

pub const RECOMMEND_PATH: &str = "/shoecommend/recommend/";

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
}

/// Errors reported to the HTTP caller as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Upload too large")]
    PayloadTooLarge,

    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Recommend(RecommendError::ImageProcessing(_)) => StatusCode::BAD_REQUEST,
            ApiError::Recommend(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();
        if status.is_server_error() {
            error!("request failed: {}", message);
        } else {
            warn!("rejected request: {}", message);
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(recommender: Arc<Recommender>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route(RECOMMEND_PATH, recommend_route())
        .route(RECOMMEND_PATH.trim_end_matches('/'), recommend_route())
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(recommender)
}

fn recommend_route() -> MethodRouter<Arc<Recommender>> {
    post(recommend).fallback(post_required)
}

async fn recommend(
    State(recommender): State<Arc<Recommender>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RecommendResponse>, ApiError> {
    // a body that is not multipart at all carries no upload either
    let Ok(mut multipart) = multipart else {
        return Err(ApiError::BadRequest("No image uploaded".to_string()));
    };

    // only file parts count as uploads; a repeated field keeps the last one
    let mut image = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("image") && field.file_name().is_some() {
            image = Some(field.bytes().await.map_err(multipart_error)?);
        }
    }
    let image = image.ok_or_else(|| ApiError::BadRequest("No image uploaded".to_string()))?;
    info!("received outfit image ({} bytes)", image.len());

    let recommendations = tokio::task::spawn_blocking(move || recommender.recommend(&image))
        .await
        .map_err(|e| ApiError::Internal(format!("recommendation task failed: {e}")))??;

    Ok(Json(RecommendResponse { recommendations }))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge
    } else {
        ApiError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn post_required() -> ApiError {
    ApiError::BadRequest("POST required".to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind and serve until Ctrl+C.
pub async fn serve(recommender: Arc<Recommender>, cfg: &Config) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("binding {}", cfg.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(recommender, cfg.max_upload_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
