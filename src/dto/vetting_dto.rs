use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::vetting_result::VettingResult;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EnglishSubmissionRequest {
    #[validate(range(min = 0, max = 100))]
    pub reading: i32,
    #[validate(range(min = 0, max = 100))]
    pub writing: i32,
    #[validate(range(min = 0, max = 100))]
    pub listening: i32,
    #[validate(range(min = 0, max = 100))]
    pub speaking: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SkillSelectionRequest {
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 30))]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VettingView {
    #[serde(flatten)]
    pub vetting: VettingResult,
    pub failed_session_count: usize,
}
