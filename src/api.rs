// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};
use url::Url;

use crate::aggregator::{Aggregator, FeedOptions};
use crate::cache::{KEY_ARTICLES_ALL, KEY_PHOTOS_ALL};
use crate::model::{ArchiveGroup, FeedItem};

/// The one external origin the image proxy will fetch from. Its CDN
/// enforces hotlink protection keyed on the Referer header.
const ALLOWED_IMAGE_HOST: &str = "doubanio.com";

const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/feed", get(feed))
        .route("/api/archives", get(archives))
        .route("/api/photos", get(photos))
        .route("/api/cache-clear", get(cache_clear))
        .route("/api/proxy-image", get(proxy_image))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Unexpected failures become a generic 500; details go to the log, never
/// to the client.
struct ApiError(anyhow::Error);

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = ?self.0, "request failed");
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

#[derive(serde::Deserialize)]
struct FeedQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn feed(
    State(state): State<AppState>,
    Query(q): Query<FeedQuery>,
) -> Json<Vec<FeedItem>> {
    let opts = FeedOptions {
        limit: q.limit,
        ..FeedOptions::default()
    };
    Json(state.aggregator.get_feed(&opts).await)
}

async fn archives(State(state): State<AppState>) -> Json<Vec<ArchiveGroup>> {
    Json(state.aggregator.get_archive_groups().await)
}

async fn photos(State(state): State<AppState>) -> Json<Vec<FeedItem>> {
    Json(state.aggregator.get_photos().await)
}

#[derive(serde::Serialize)]
struct CacheClearResp {
    cleared: Vec<&'static str>,
}

async fn cache_clear(State(state): State<AppState>) -> Result<Json<CacheClearResp>, ApiError> {
    state.aggregator.clear_durable().await?;
    Ok(Json(CacheClearResp {
        cleared: vec![KEY_ARTICLES_ALL, KEY_PHOTOS_ALL],
    }))
}

#[derive(serde::Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

fn host_allowed(host: &str) -> bool {
    host == ALLOWED_IMAGE_HOST || host.ends_with(&format!(".{ALLOWED_IMAGE_HOST}"))
}

async fn proxy_image(State(state): State<AppState>, Query(q): Query<ProxyQuery>) -> Response {
    let Some(raw) = q.url else {
        return error_response(StatusCode::BAD_REQUEST, "missing url parameter");
    };
    let Ok(target) = Url::parse(&raw) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid url parameter");
    };
    let Some(host) = target.host_str().map(str::to_string) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid url parameter");
    };
    if !host_allowed(&host) {
        return error_response(StatusCode::FORBIDDEN, "origin not allowed");
    }

    // The origin checks Referer; present ourselves as coming from it.
    let referer = format!("{}://{}/", target.scheme(), host);
    let upstream = state
        .aggregator
        .http_client()
        .get(target)
        .header(header::REFERER, referer)
        .send()
        .await
        .and_then(|r| r.error_for_status());

    let upstream = match upstream {
        Ok(r) => r,
        Err(e) => {
            warn!(error = ?e, "image proxy upstream fetch failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "upstream fetch failed");
        }
    };

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    match upstream.bytes().await {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            warn!(error = ?e, "image proxy upstream body read failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "upstream fetch failed")
        }
    }
}
