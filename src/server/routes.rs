//! Request handlers for the web front end.

use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Form, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

use crate::core::extractor::{is_youtube_url, ExtractorOptions};
use crate::core::ffmpeg;
use crate::core::models::OutputKind;

use super::ServerState;

const INDEX_HTML: &str = include_str!("assets/index.html");
const APP_JS: &str = include_str!("assets/app.js");

/// JSON error payload with a status, matching what the front end expects.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn app_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], APP_JS)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "app": crate::NAME,
        "version": crate::VERSION,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    url: String,
}

pub async fn preview(
    State(state): State<ServerState>,
    Query(params): Query<PreviewParams>,
) -> Result<Json<crate::core::models::MediaPreview>, ApiError> {
    let url = params.url.trim();
    if !is_youtube_url(url) {
        return Err(ApiError::bad_request("Invalid YouTube URL."));
    }

    match state.extractor.probe(url).await {
        Ok(preview) => Ok(Json(preview)),
        Err(e) => {
            warn!("Preview failed for {}: {}", url, e);
            Err(ApiError::unprocessable(
                "Could not load a preview for this link.",
            ))
        }
    }
}

fn default_mode() -> String {
    "mp3".to_string()
}

fn default_quality() -> String {
    "192".to_string()
}

fn default_video_quality() -> String {
    "720".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DownloadForm {
    url: String,
    #[serde(default = "default_mode")]
    mode: String,
    #[serde(default = "default_quality")]
    quality: String,
    #[serde(default = "default_video_quality")]
    video_quality: String,
}

pub async fn download(
    State(state): State<ServerState>,
    Form(form): Form<DownloadForm>,
) -> Result<Response, ApiError> {
    let url = form.url.trim().to_string();
    if url.is_empty() || !is_youtube_url(&url) {
        return Err(ApiError::bad_request("Provide a valid YouTube URL."));
    }

    let kind = OutputKind::from_request(&form.mode, &form.quality, &form.video_quality);
    info!("⬇️ Web download requested: {} as {}", url, kind.label());

    let ffmpeg_location =
        ffmpeg::locate_ffmpeg().map_err(|e| ApiError::internal(e.to_string()))?;

    // Each request gets its own directory so concurrent downloads never
    // fight over the newest-file resolution.
    let request_dir = state
        .config
        .download_dir()
        .map_err(|e| ApiError::internal(e.to_string()))?
        .join("web")
        .join(uuid::Uuid::new_v4().to_string());

    let options = ExtractorOptions::new(
        kind,
        request_dir.clone(),
        ffmpeg_location,
        state.config.download.user_agent.clone(),
    );

    let file_path = match state.extractor.download(&url, &options, None).await {
        Ok(path) => path,
        Err(e) => {
            error!("Web download failed for {}: {}", url, e);
            let _ = tokio::fs::remove_dir_all(&request_dir).await;
            return Err(ApiError::internal(format!("Download failed: {}", e)));
        }
    };

    stream_download(file_path, request_dir).await
}

/// Build the attachment response; the request directory is removed once the
/// response body has been dropped.
async fn stream_download(file_path: PathBuf, request_dir: PathBuf) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&file_path)
        .await
        .map_err(|_| ApiError::internal("Download failed to produce a file."))?;

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "_"))
        .unwrap_or_else(|| "download".to_string());

    let media_type = mime_guess::from_path(&file_path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    let stream = CleanupOnDrop {
        inner: ReaderStream::new(file),
        _guard: DirCleanup(request_dir),
    };

    let mut response = Body::from_stream(stream).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        media_type
            .parse()
            .unwrap_or_else(|_| header::HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(value) = format!("attachment; filename=\"{}\"", file_name).parse() {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }

    Ok(response)
}

/// Removes the per-request directory when dropped, i.e. after the response
/// body has been fully sent or the client went away.
struct DirCleanup(PathBuf);

impl Drop for DirCleanup {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.0) {
            warn!("Failed to clean up {}: {}", self.0.display(), e);
        }
    }
}

struct CleanupOnDrop<S> {
    inner: S,
    _guard: DirCleanup,
}

impl<S: Stream + Unpin> Stream for CleanupOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}
