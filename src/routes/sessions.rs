use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::session_dto::{
    CodingRunRequest, ListSessionsQuery, PortfolioLinkRequest, PortfolioReviewRequest,
    StartSessionRequest, SubmitMcqRequest,
};
use crate::error::{Error, Result};
use crate::services::identity_service::Caller;
use crate::AppState;

#[axum::debug_handler]
pub async fn start_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<StartSessionRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state.sessions.start(&caller, payload).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse> {
    let sessions = state.sessions.list(&caller, query.freelancer_id).await?;
    Ok(Json(sessions))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.sessions.get(&caller, id).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn submit_mcq(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitMcqRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state.sessions.submit_mcq(&caller, id, payload.answers).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn submit_coding_run(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CodingRunRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    if payload.passed > payload.total {
        return Err(Error::BadRequest("passed cannot exceed total".to_string()));
    }
    let view = state.sessions.submit_coding_run(&caller, id, payload).await?;
    Ok(Json(view))
}

pub async fn complete_session(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let view = state.sessions.complete(&caller, id).await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn attach_portfolio(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PortfolioLinkRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state
        .sessions
        .attach_portfolio(&caller, id, &payload.portfolio_url)
        .await?;
    Ok(Json(view))
}

#[axum::debug_handler]
pub async fn review_portfolio(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PortfolioReviewRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let view = state
        .sessions
        .review_portfolio(&caller, id, payload.portfolio_score, payload.notes)
        .await?;
    Ok(Json(view))
}
