use axum::{extract::State, response::IntoResponse, Extension, Json};
use validator::Validate;

use crate::dto::vetting_dto::{EnglishSubmissionRequest, SkillSelectionRequest};
use crate::error::Result;
use crate::services::identity_service::Caller;
use crate::AppState;

#[axum::debug_handler]
pub async fn get_my_vetting(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse> {
    let view = state.vetting.get_mine(&caller).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn submit_english(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<EnglishSubmissionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state.vetting.submit_english(&caller, payload).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn select_skills(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<SkillSelectionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state.vetting.select_skills(&caller, payload).await?;
    Ok(Json(view))
}
