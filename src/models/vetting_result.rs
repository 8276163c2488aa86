use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::experience::ExperienceLevel;
use crate::models::skill_test_session::PathType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vetting_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VettingStatus {
    Pending,
    InProgress,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "vetting_step", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VettingStep {
    English,
    SkillSelection,
    Test,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnglishProficiency {
    pub reading: i32,
    pub writing: i32,
    pub listening: i32,
    pub speaking: i32,
    pub overall: i32,
}

impl EnglishProficiency {
    pub fn new(reading: i32, writing: i32, listening: i32, speaking: i32) -> Self {
        let sum = f64::from(reading + writing + listening + speaking);
        Self {
            reading,
            writing,
            listening,
            speaking,
            overall: (sum / 4.0).round() as i32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillAssessmentSummary {
    pub session_id: Uuid,
    pub category_id: Uuid,
    pub path_type: PathType,
    pub experience_level: ExperienceLevel,
    pub mcq_score: Option<i32>,
    pub coding_score: Option<i32>,
    pub portfolio_score: Option<i32>,
    pub effective_score: i32,
    pub passed: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VettingResult {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub english_proficiency: Option<Json<EnglishProficiency>>,
    pub skill_assessments: Json<Vec<SkillAssessmentSummary>>,
    pub overall_score: Option<i32>,
    pub status: VettingStatus,
    pub current_step: VettingStep,
    pub steps_completed: Vec<String>,
    pub selected_category_id: Option<Uuid>,
    pub selected_skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
