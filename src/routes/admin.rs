use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::services::identity_service::Caller;
use crate::AppState;

pub async fn get_freelancer_vetting(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(freelancer_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.vetting.get_for_freelancer(&caller, freelancer_id).await?;
    Ok(Json(view))
}

pub async fn get_session_audit(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    caller.require_staff()?;
    let entries = state
        .audit
        .list_for_entity("skill_test_session", session_id)
        .await?;
    Ok(Json(entries))
}
