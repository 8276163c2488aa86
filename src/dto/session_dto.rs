use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::experience::ExperienceLevel;
use crate::models::question::{CodingPrompt, McqQuestion, PublicCodingPrompt, PublicMcqQuestion};
use crate::models::skill_test_session::{
    CodingSubmission, McqAnswer, PathType, RunResult, SessionStatus, SkillTestSession,
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartSessionRequest {
    pub category_id: Uuid,
    pub path_type: PathType,
    pub experience_level: Option<String>,
    #[validate(length(min = 1, max = 30))]
    pub selected_skills: Vec<String>,
    #[validate(length(min = 1, max = 40))]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitMcqRequest {
    #[validate(length(max = 100))]
    pub answers: Vec<McqAnswer>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CodingRunRequest {
    pub prompt_id: Uuid,
    pub passed: u32,
    #[validate(range(max = 10000))]
    pub total: u32,
}

impl CodingRunRequest {
    pub fn run_result(&self) -> RunResult {
        RunResult {
            passed: self.passed,
            total: self.total,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PortfolioLinkRequest {
    #[validate(length(min = 1, max = 2048))]
    pub portfolio_url: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PortfolioReviewRequest {
    #[validate(range(min = 0, max = 100))]
    pub portfolio_score: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListSessionsQuery {
    pub freelancer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub status: SessionStatus,
    pub path_type: PathType,
    pub experience_level: ExperienceLevel,
    pub category_id: Uuid,
    pub selected_skills: Vec<String>,
    pub selected_language: Option<String>,
    pub time_limit_seconds: u32,
    pub seconds_remaining: i64,
    pub mcq_questions: Vec<PublicMcqQuestion>,
    pub coding_prompts: Vec<PublicCodingPrompt>,
    pub mcq_score: Option<i32>,
    pub coding_score: Option<i32>,
    pub portfolio_url: Option<String>,
    pub portfolio_score: Option<i32>,
    pub effective_score: Option<i32>,
    pub coding_submissions: Vec<CodingSubmission>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionView {
    pub fn new(
        session: &SkillTestSession,
        questions: &[McqQuestion],
        prompts: &[CodingPrompt],
        now: DateTime<Utc>,
    ) -> Self {
        let complexity =
            crate::services::complexity_service::resolve_complexity(session.experience_level);
        Self {
            id: session.id,
            freelancer_id: session.freelancer_id,
            status: session.effective_status(now),
            path_type: session.path_type,
            experience_level: session.experience_level,
            category_id: session.category_id,
            selected_skills: session.selected_skills.clone(),
            selected_language: session.selected_language.clone(),
            time_limit_seconds: complexity.time_limit_seconds,
            seconds_remaining: session.seconds_remaining(now),
            mcq_questions: questions.iter().map(McqQuestion::to_public).collect(),
            coding_prompts: prompts.iter().map(CodingPrompt::to_public).collect(),
            mcq_score: session.mcq_score,
            coding_score: match session.path_type {
                PathType::CodingMcq if session.mcq_score.is_some() => Some(session.coding_score()),
                _ => None,
            },
            portfolio_url: session.portfolio_url.clone(),
            portfolio_score: session.portfolio_score,
            effective_score: session.contributing_score(now),
            coding_submissions: session.coding_submissions.0.clone(),
            started_at: session.started_at,
            expires_at: session.expires_at,
            completed_at: session.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub status: SessionStatus,
    pub path_type: PathType,
    pub experience_level: ExperienceLevel,
    pub category_id: Uuid,
    pub mcq_score: Option<i32>,
    pub effective_score: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionSummary {
    pub fn new(session: &SkillTestSession, now: DateTime<Utc>) -> Self {
        Self {
            id: session.id,
            status: session.effective_status(now),
            path_type: session.path_type,
            experience_level: session.experience_level,
            category_id: session.category_id,
            mcq_score: session.mcq_score,
            effective_score: session.contributing_score(now),
            started_at: session.started_at,
            expires_at: session.expires_at,
            completed_at: session.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skill_test_session::SessionPlan;
    use chrono::Duration;
    use sqlx::types::Json;

    #[test]
    fn view_never_serializes_answer_keys() {
        let now = Utc::now();
        let question = McqQuestion {
            id: Uuid::new_v4(),
            category_id: Uuid::nil(),
            experience_level: ExperienceLevel::Junior,
            rotation_index: 0,
            question: "Which keyword declares an immutable binding?".into(),
            options: Json(vec!["let".into(), "mut".into()]),
            correct_option_index: 0,
            explanation: Some("secret explanation".into()),
            created_at: now,
        };
        let session = SkillTestSession::open(
            SessionPlan {
                freelancer_id: Uuid::new_v4(),
                vetting_result_id: Uuid::new_v4(),
                path_type: PathType::McqOnly,
                experience_level: ExperienceLevel::Junior,
                category_id: Uuid::nil(),
                selected_skills: vec!["rust".into()],
                selected_language: None,
                mcq_question_ids: vec![question.id],
                coding_prompt_ids: vec![],
            },
            now,
        );
        let view = SessionView::new(&session, &[question], &[], now);
        let text = serde_json::to_string(&view).unwrap();
        assert!(!text.contains("correct_option_index"));
        assert!(!text.contains("secret explanation"));
        assert_eq!(view.seconds_remaining, 30 * 60);
        assert_eq!(view.time_limit_seconds, 900);
    }

    #[test]
    fn summary_reports_derived_expiry() {
        let now = Utc::now();
        let session = SkillTestSession::open(
            SessionPlan {
                freelancer_id: Uuid::new_v4(),
                vetting_result_id: Uuid::new_v4(),
                path_type: PathType::McqOnly,
                experience_level: ExperienceLevel::Mid,
                category_id: Uuid::nil(),
                selected_skills: vec![],
                selected_language: None,
                mcq_question_ids: vec![],
                coding_prompt_ids: vec![],
            },
            now,
        );
        let later = now + Duration::minutes(45);
        assert_eq!(SessionSummary::new(&session, later).status, SessionStatus::Expired);
    }
}
