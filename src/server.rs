use crate::config::Config;
use crate::db::Db;
use crate::error::{Result, VidshelfError};
use crate::media::stream::{is_plain_file_name, resolve_video_path, PartialContent};
use crate::media::thumbnail::thumbnail_file_name;
use crate::range::parse_range;
use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const POPULAR_LIMIT: i64 = 10;
const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub config: Arc<Config>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoInfo {
    pub title: String,
    pub views: i64,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    is_complete: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VideoParam {
    #[serde(default)]
    video: String,
}

impl IntoResponse for VidshelfError {
    fn into_response(self) -> Response {
        match self {
            VidshelfError::NotFound(message) => (StatusCode::NOT_FOUND, message).into_response(),
            VidshelfError::StoreUnavailable(e) => {
                error!("Catalog store error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Catalog unavailable").into_response()
            }
            other => {
                error!("Request failed: {}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/videos", get(list_videos))
        .route("/videos/popular", get(list_popular_videos))
        .route("/videos/:filename", get(stream_video))
        .route("/thumbnails/:filename", get(get_thumbnail))
        .route("/search", get(search_videos))
        .route("/search/history", get(search_history))
        .route("/video-info", get(video_info))
        .route("/increment-views", post(increment_views))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<F>(state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = state.config.server.bind.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn list_videos(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.list_all().await?))
}

async fn list_popular_videos(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.list_top_by_views(POPULAR_LIMIT).await?))
}

async fn stream_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    headers: HeaderMap,
) -> Result<PartialContent> {
    let path = resolve_video_path(&state.config.library.video_dirs, &filename).await?;

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    let range = parse_range(range_header);
    if range_header.is_some() && range.is_none() {
        warn!("Ignoring unsupported range {:?} for {}", range_header, filename);
    }

    PartialContent::open(&path, range).await
}

async fn get_thumbnail(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response> {
    let name = thumbnail_file_name(&filename)
        .filter(|name| is_plain_file_name(name))
        .ok_or_else(VidshelfError::thumbnail_not_found)?;
    let path = state.config.library.thumbnail_dir.join(name);

    match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => return Err(VidshelfError::thumbnail_not_found()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VidshelfError::thumbnail_not_found())
        }
        Err(e) => return Err(e.into()),
    }

    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };
    if response.status().is_success() {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL),
        );
    }
    Ok(response)
}

async fn search_videos(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<String>>> {
    let is_complete = params
        .is_complete
        .as_deref()
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let videos = state.db.search_by_filename(&params.q).await?;
    state
        .db
        .record_search_if_complete(&params.q, !videos.is_empty(), is_complete)
        .await?;

    Ok(Json(videos))
}

async fn search_history(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.db.recent_search_history().await?))
}

async fn video_info(
    State(state): State<AppState>,
    Query(params): Query<VideoParam>,
) -> Result<Json<VideoInfo>> {
    let record = state
        .db
        .get_video(&params.video)
        .await?
        .ok_or_else(VidshelfError::video_not_found)?;

    Ok(Json(VideoInfo {
        title: record.filename,
        views: record.views,
    }))
}

async fn increment_views(
    State(state): State<AppState>,
    Query(params): Query<VideoParam>,
) -> Result<StatusCode> {
    state.db.increment_views(&params.video).await?;
    Ok(StatusCode::NO_CONTENT)
}
