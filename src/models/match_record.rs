use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "match_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringBreakdown {
    pub vetting_score: i32,
    pub skill_score: i32,
    pub experience_score: i32,
    pub category_score: i32,
    pub total_score: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Match {
    pub id: Uuid,
    pub project_id: Uuid,
    pub freelancer_id: Uuid,
    pub status: MatchStatus,
    pub scoring_breakdown: Json<ScoringBreakdown>,
    pub rank: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
