use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::dto::anti_cheat_dto::RecordAntiCheatRequest;
use crate::error::Result;
use crate::services::identity_service::Caller;
use crate::AppState;

#[axum::debug_handler]
pub async fn record_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<RecordAntiCheatRequest>,
) -> Result<impl IntoResponse> {
    let event = state
        .anti_cheat
        .record(&caller, session_id, payload.kind, payload.details)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn list_events(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let log = state.anti_cheat.list(&caller, session_id).await?;
    Ok(Json(log))
}
