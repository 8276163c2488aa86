use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::freelancer::Freelancer;
use crate::models::match_record::{Match, MatchStatus, ScoringBreakdown};

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMatchStatusRequest {
    pub status: MatchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientMatchView {
    pub match_id: Uuid,
    pub display_name: String,
    pub total_score: i32,
    pub vetting_score: i32,
    pub status: MatchStatus,
    pub rank: i32,
}

impl ClientMatchView {
    pub fn new(record: &Match, freelancer: &Freelancer) -> Self {
        Self {
            match_id: record.id,
            display_name: freelancer.display_name(),
            total_score: record.scoring_breakdown.total_score,
            vetting_score: record.scoring_breakdown.vetting_score,
            status: record.status,
            rank: record.rank,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FreelancerMatchView {
    pub match_id: Uuid,
    pub project_id: Uuid,
    pub project_title: String,
    pub status: MatchStatus,
    pub rank: i32,
    pub scoring_breakdown: Json<ScoringBreakdown>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffMatchView {
    #[serde(rename = "match")]
    pub record: Match,
    pub freelancer: Freelancer,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", content = "matches", rename_all = "snake_case")]
pub enum ProjectMatches {
    Client(Vec<ClientMatchView>),
    Freelancer(Vec<FreelancerMatchView>),
    Staff(Vec<StaffMatchView>),
}
