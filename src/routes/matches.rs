use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::dto::match_dto::UpdateMatchStatusRequest;
use crate::error::Result;
use crate::services::identity_service::Caller;
use crate::AppState;

#[axum::debug_handler]
pub async fn compute_matches(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let matches = state.matching.compute_matches(&caller, project_id).await?;
    Ok(Json(json!({
        "project_id": project_id,
        "count": matches.len(),
    })))
}

pub async fn list_project_matches(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let matches = state.matching.list_project_matches(&caller, project_id).await?;
    Ok(Json(matches))
}

pub async fn my_matches(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse> {
    let matches = state.matching.my_matches(&caller).await?;
    Ok(Json(matches))
}

#[axum::debug_handler]
pub async fn update_match_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(match_id): Path<Uuid>,
    Json(payload): Json<UpdateMatchStatusRequest>,
) -> Result<impl IntoResponse> {
    let updated = state
        .matching
        .update_status(&caller, match_id, payload.status)
        .await?;
    Ok(Json(updated))
}
