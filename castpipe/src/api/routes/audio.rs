//! Audio streaming route with byte-range support.
//!
//! Serves the completed session's merged audio file. Outputs can be tens of
//! megabytes, so both full and partial responses stream the requested byte
//! window from disk instead of buffering the file.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tokio_util::io::ReaderStream;

use crate::api::error::{ApiError, ApiResult};
use crate::api::range::{parse_range, unsatisfiable_content_range};
use crate::api::server::AppState;
use crate::domain::Stage;

const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// The pipeline currently produces a single chapter.
const SUPPORTED_CHAPTER: u32 = 1;

/// Stream a completed session's audio, honoring an optional `Range` header.
pub async fn stream_audio(
    State(state): State<AppState>,
    Path((id, chapter)): Path<(String, u32)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    // 404 before anything else: an unknown chapter never exists, whatever
    // state the session is in.
    if chapter != SUPPORTED_CHAPTER {
        return Err(ApiError::not_found(format!("chapter {chapter} not found")));
    }

    let session = state.engine.get(&id).await?;

    // Completion precondition, checked before touching the filesystem.
    if session.stage != Stage::Completed {
        return Err(ApiError::processing_not_complete(
            "session processing is not complete",
        ));
    }

    let audio_path = session.audio_path.as_deref().ok_or_else(|| {
        tracing::error!("completed session {} has no audio path", session.id);
        ApiError::internal("audio file reference missing for completed session")
    })?;

    let mut file = tokio::fs::File::open(audio_path).await.map_err(|e| {
        tracing::error!("failed to open audio for session {}: {}", session.id, e);
        ApiError::internal("failed to open audio file")
    })?;
    let total_size = file
        .metadata()
        .await
        .map_err(|e| {
            tracing::error!("failed to stat audio for session {}: {}", session.id, e);
            ApiError::internal("failed to read audio file")
        })?
        .len();

    let range_header = match headers.get(header::RANGE) {
        Some(value) => match value.to_str() {
            Ok(raw) => Some(raw.to_string()),
            // Non-ASCII Range header: not parseable, answer 416.
            Err(_) => return range_not_satisfiable(total_size),
        },
        None => None,
    };

    let Some(raw_range) = range_header else {
        let stream = ReaderStream::new(file);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::CONTENT_LENGTH, total_size)
            .body(Body::from_stream(stream))
            .map_err(|e| ApiError::internal(e.to_string()));
    };

    let range = match parse_range(&raw_range, total_size) {
        Ok(range) => range,
        Err(_) => return range_not_satisfiable(total_size),
    };

    file.seek(SeekFrom::Start(range.start))
        .await
        .map_err(|e| ApiError::internal(format!("seek failed: {e}")))?;
    let window = file.take(range.len());

    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_RANGE, range.content_range(total_size))
        .header(header::CONTENT_LENGTH, range.len())
        .body(Body::from_stream(ReaderStream::new(window)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn range_not_satisfiable(total_size: u64) -> ApiResult<Response> {
    Response::builder()
        .status(StatusCode::RANGE_NOT_SATISFIABLE)
        .header(header::CONTENT_TYPE, AUDIO_CONTENT_TYPE)
        .header(
            header::CONTENT_RANGE,
            unsatisfiable_content_range(total_size),
        )
        .body(Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))
}
