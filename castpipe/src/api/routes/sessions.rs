//! Session management routes: submission, status, listing, deletion.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::models::{
    CreateSessionRequest, SessionCreatedResponse, SessionListResponse, SessionStatusResponse,
};
use crate::api::routes::audio;
use crate::api::server::AppState;

/// Create the sessions router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session).get(list_sessions))
        .route("/{id}", get(get_session).delete(delete_session))
        .route("/{id}/audio/{chapter}", get(audio::stream_audio))
}

/// Submit a new session for pipeline processing.
async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult<(StatusCode, Json<SessionCreatedResponse>)> {
    let session = state
        .engine
        .submit(request.inputs, request.main_index, request.options)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreatedResponse::from_session(&session)),
    ))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

/// List recent sessions with their progress.
async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<SessionListResponse>> {
    let sessions = state.engine.list_recent(params.limit.min(200)).await?;
    Ok(Json(SessionListResponse::from_sessions(&sessions)))
}

/// Get a single session's status.
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let session = state.engine.get(&id).await?;
    Ok(Json(SessionStatusResponse::from_session(&session)))
}

/// Delete a session. In-flight pipeline work is discarded cooperatively.
async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
