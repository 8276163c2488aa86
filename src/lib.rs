pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::error::Result;
use crate::middleware::auth::require_auth;
use crate::middleware::rate_limit::{new_rps_state, rps_middleware};
use crate::services::{
    ai_service::{AIService, QuestionGenerator},
    anti_cheat_service::AntiCheatService,
    audit_service::AuditService,
    event_service::EventService,
    identity_service::{IdentityProvider, PgIdentityProvider},
    matching_service::MatchingService,
    pool_service::PoolService,
    scoring_service::ScoringService,
    session_service::SessionService,
    vetting_service::VettingService,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub jwt_secret: Arc<str>,
    pub identity: Arc<dyn IdentityProvider>,
    pub vetting: VettingService,
    pub sessions: SessionService,
    pub anti_cheat: AntiCheatService,
    pub matching: MatchingService,
    pub events: EventService,
    pub audit: AuditService,
}

impl AppState {
    pub fn new(pool: PgPool) -> Result<Self> {
        let config = crate::config::get_config()?;
        let http_client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        let identity = Arc::new(PgIdentityProvider::new(pool.clone()));
        let generator = Arc::new(AIService::new(
            config.openai_api_key.clone(),
            config.openai_model.clone(),
            http_client.clone(),
        ));
        Ok(Self::with_collaborators(pool, config, identity, generator, http_client))
    }

    pub fn with_collaborators(
        pool: PgPool,
        config: &Config,
        identity: Arc<dyn IdentityProvider>,
        generator: Arc<dyn QuestionGenerator>,
        http_client: Client,
    ) -> Self {
        let scoring = ScoringService::new(pool.clone(), config.aggregation_policy);
        let pools = PoolService::new(
            pool.clone(),
            generator,
            config.mcq_pool_min_size,
            config.coding_pool_min_size,
        );

        Self {
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            identity,
            vetting: VettingService::new(pool.clone(), scoring.clone()),
            sessions: SessionService::new(pool.clone(), pools, scoring),
            anti_cheat: AntiCheatService::new(pool.clone()),
            matching: MatchingService::new(pool.clone()),
            events: EventService::new(
                pool.clone(),
                http_client,
                config.event_webhook_url.clone(),
                config.event_webhook_secret.clone(),
            ),
            audit: AuditService::new(pool.clone()),
            pool,
        }
    }
}

pub fn router(state: AppState, public_rps: u32, api_rps: u32) -> Router {
    let public = Router::new()
        .route("/health", get(routes::health::health))
        .layer(axum::middleware::from_fn_with_state(
            new_rps_state(public_rps),
            rps_middleware,
        ));

    let api = Router::new()
        .route("/api/vetting/me", get(routes::vetting::get_my_vetting))
        .route("/api/vetting/english", post(routes::vetting::submit_english))
        .route("/api/vetting/skills", post(routes::vetting::select_skills))
        .route(
            "/api/sessions",
            get(routes::sessions::list_sessions).post(routes::sessions::start_session),
        )
        .route("/api/sessions/:id", get(routes::sessions::get_session))
        .route("/api/sessions/:id/mcq", post(routes::sessions::submit_mcq))
        .route(
            "/api/sessions/:id/coding-runs",
            post(routes::sessions::submit_coding_run),
        )
        .route(
            "/api/sessions/:id/complete",
            post(routes::sessions::complete_session),
        )
        .route(
            "/api/sessions/:id/portfolio",
            post(routes::sessions::attach_portfolio),
        )
        .route(
            "/api/sessions/:id/portfolio-review",
            post(routes::sessions::review_portfolio),
        )
        .route(
            "/api/sessions/:id/anti-cheat",
            get(routes::anti_cheat::list_events).post(routes::anti_cheat::record_event),
        )
        .route(
            "/api/projects/:id/matches/compute",
            post(routes::matches::compute_matches),
        )
        .route(
            "/api/projects/:id/matches",
            get(routes::matches::list_project_matches),
        )
        .route("/api/matches/mine", get(routes::matches::my_matches))
        .route(
            "/api/matches/:id/status",
            post(routes::matches::update_match_status),
        )
        .route(
            "/api/admin/freelancers/:id/vetting",
            get(routes::admin::get_freelancer_vetting),
        )
        .route(
            "/api/admin/sessions/:id/audit",
            get(routes::admin::get_session_audit),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            new_rps_state(api_rps),
            rps_middleware,
        ));

    public.merge(api).with_state(state)
}
