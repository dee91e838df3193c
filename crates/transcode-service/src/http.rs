//! HTTP surface of the job service.
//!
//! | Route | Handler |
//! |---|---|
//! | `POST /convert` | multipart `video` + `fps`/`width`/`quality` |
//! | `GET /status/{job_id}` | job status |
//! | `GET /download/{job_id}` | artifact, then reclaim |
//! | `DELETE /cleanup/{job_id}` | explicit reclaim |
//! | `GET /health` | liveness and job count |

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use loopcast_common::error::LoopcastError;
use loopcast_model::job::{ConversionParams, QualityTier};
use loopcast_model::wire::{ApiError, CleanupResponse, ConvertResponse};

use crate::service::TranscodeService;

/// Multipart framing on top of the clip itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TranscodeService>,
}

pub fn build_router(service: Arc<TranscodeService>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/convert", post(convert))
        .route("/status/{job_id}", get(status))
        .route("/download/{job_id}", get(download))
        .route("/cleanup/{job_id}", delete(cleanup))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
        .with_state(AppState { service })
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiError::new(message))).into_response()
}

/// Map a service error onto the API's status codes and bodies.
fn error_response(error: LoopcastError) -> Response {
    match error {
        LoopcastError::JobNotFound { .. } => json_error(StatusCode::NOT_FOUND, "Job not found"),
        LoopcastError::ConversionNotReady { .. } => {
            json_error(StatusCode::BAD_REQUEST, "Conversion not complete")
        }
        other => {
            tracing::error!(error = %other, "Request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

async fn convert(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let defaults = ConversionParams::default();
    let mut params = defaults;
    let mut clip = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return json_error(e.status(), e.body_text()),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "video" => match field.bytes().await {
                Ok(bytes) => clip = Some(bytes),
                Err(e) => return json_error(e.status(), e.body_text()),
            },
            "fps" | "width" | "quality" => {
                let value = match field.text().await {
                    Ok(value) => value,
                    Err(e) => return json_error(e.status(), e.body_text()),
                };
                match name.as_str() {
                    "fps" => params.fps = parse_positive(&value).unwrap_or(defaults.fps),
                    "width" => params.width = parse_positive(&value).unwrap_or(defaults.width),
                    _ => params.quality = QualityTier::from_name(&value),
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let Some(clip) = clip.filter(|bytes| !bytes.is_empty()) else {
        return json_error(StatusCode::BAD_REQUEST, "No video file uploaded");
    };

    match state.service.submit(&clip, params).await {
        Ok(job_id) => Json(ConvertResponse::started(job_id)).into_response(),
        Err(e) => error_response(e),
    }
}

fn parse_positive(value: &str) -> Option<u32> {
    value.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

async fn status(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.service.status(&job_id).await {
        Ok(body) => Json(body).into_response(),
        Err(e) => error_response(e),
    }
}

async fn download(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.service.download(&job_id).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "image/gif".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"recording-{job_id}.gif\""),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

async fn cleanup(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    state.service.delete(&job_id).await;
    Json(CleanupResponse::default()).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    Json(state.service.health().await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_fields_fall_back_on_garbage() {
        assert_eq!(parse_positive("15"), Some(15));
        assert_eq!(parse_positive(" 480 "), Some(480));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("fast"), None);
        assert_eq!(parse_positive("-3"), None);
    }
}
