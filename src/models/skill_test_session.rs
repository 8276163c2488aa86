use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::experience::ExperienceLevel;
use crate::models::question::McqQuestion;
use crate::services::scoring_service;

/// Hard wall-clock limit of one attempt. There is no grace period.
pub const SESSION_DURATION_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Mcq,
    Coding,
    PortfolioReview,
    Completed,
    Expired,
    Abandoned,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Expired | SessionStatus::Abandoned
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Mcq => "mcq",
            SessionStatus::Coding => "coding",
            SessionStatus::PortfolioReview => "portfolio_review",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "path_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PathType {
    McqOnly,
    CodingMcq,
    PortfolioMcq,
}

impl PathType {
    pub fn initial_status(self) -> SessionStatus {
        SessionStatus::Mcq
    }

    pub fn status_after_mcq(self) -> SessionStatus {
        match self {
            PathType::McqOnly => SessionStatus::Completed,
            PathType::CodingMcq => SessionStatus::Coding,
            PathType::PortfolioMcq => SessionStatus::PortfolioReview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub passed: u32,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingSubmission {
    pub prompt_id: Uuid,
    pub run_result: RunResult,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct McqAnswer {
    pub question_id: Uuid,
    pub selected_option: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SkillTestSession {
    pub id: Uuid,
    pub freelancer_id: Uuid,
    pub vetting_result_id: Uuid,
    pub status: SessionStatus,
    pub path_type: PathType,
    pub experience_level: ExperienceLevel,
    pub category_id: Uuid,
    pub selected_skills: Vec<String>,
    pub selected_language: Option<String>,
    pub mcq_question_ids: Vec<Uuid>,
    pub coding_prompt_ids: Vec<Uuid>,
    pub mcq_score: Option<i32>,
    pub portfolio_score: Option<i32>,
    pub portfolio_url: Option<String>,
    pub coding_submissions: Json<Vec<CodingSubmission>>,
    pub version: i32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub freelancer_id: Uuid,
    pub vetting_result_id: Uuid,
    pub path_type: PathType,
    pub experience_level: ExperienceLevel,
    pub category_id: Uuid,
    pub selected_skills: Vec<String>,
    pub selected_language: Option<String>,
    pub mcq_question_ids: Vec<Uuid>,
    pub coding_prompt_ids: Vec<Uuid>,
}

impl SkillTestSession {
    pub fn open(plan: SessionPlan, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            freelancer_id: plan.freelancer_id,
            vetting_result_id: plan.vetting_result_id,
            status: plan.path_type.initial_status(),
            path_type: plan.path_type,
            experience_level: plan.experience_level,
            category_id: plan.category_id,
            selected_skills: plan.selected_skills,
            selected_language: plan.selected_language,
            mcq_question_ids: plan.mcq_question_ids,
            coding_prompt_ids: plan.coding_prompt_ids,
            mcq_score: None,
            portfolio_score: None,
            portfolio_url: None,
            coding_submissions: Json(Vec::new()),
            version: 0,
            started_at: now,
            expires_at: now + Duration::minutes(SESSION_DURATION_MINUTES),
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as seen at `now`: a live session past its deadline reads as expired
    /// whatever the stored column says.
    pub fn effective_status(&self, now: DateTime<Utc>) -> SessionStatus {
        if !self.status.is_terminal() && now >= self.expires_at {
            SessionStatus::Expired
        } else {
            self.status
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.effective_status(now).is_terminal()
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        if self.is_active(now) {
            (self.expires_at - now).num_seconds().max(0)
        } else {
            0
        }
    }

    fn ensure_stage(&self, now: DateTime<Utc>, expected: SessionStatus) -> Result<()> {
        let current = self.effective_status(now);
        if current.is_terminal() {
            return Err(Error::InvalidSessionState(format!(
                "session {} is {}",
                self.id, current
            )));
        }
        if current != expected {
            return Err(Error::InvalidSessionState(format!(
                "session {} is in the {} stage, not {}",
                self.id, current, expected
            )));
        }
        Ok(())
    }

    pub fn record_mcq(
        &mut self,
        answers: &[McqAnswer],
        questions: &[McqQuestion],
        now: DateTime<Utc>,
    ) -> Result<i32> {
        self.ensure_stage(now, SessionStatus::Mcq)?;

        let issued: HashSet<Uuid> = self.mcq_question_ids.iter().copied().collect();
        let mut selected: HashMap<Uuid, Option<i32>> = HashMap::with_capacity(answers.len());
        for answer in answers {
            if !issued.contains(&answer.question_id) {
                return Err(Error::UnknownReference(format!(
                    "question {} does not belong to session {}",
                    answer.question_id, self.id
                )));
            }
            if selected
                .insert(answer.question_id, answer.selected_option)
                .is_some()
            {
                return Err(Error::BadRequest(format!(
                    "question {} answered more than once",
                    answer.question_id
                )));
            }
        }

        let keys: HashMap<Uuid, &McqQuestion> = questions.iter().map(|q| (q.id, q)).collect();
        let correct = self
            .mcq_question_ids
            .iter()
            .filter(|id| {
                let choice = selected.get(*id).copied().flatten();
                keys.get(*id).map(|q| q.is_correct(choice)).unwrap_or(false)
            })
            .count();

        let score = scoring_service::percentage(correct as u32, self.mcq_question_ids.len() as u32);
        self.mcq_score = Some(score);
        self.transition(self.path_type.status_after_mcq(), now);
        Ok(score)
    }

    pub fn record_coding_run(
        &mut self,
        prompt_id: Uuid,
        run_result: RunResult,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_stage(now, SessionStatus::Coding)?;
        if !self.coding_prompt_ids.contains(&prompt_id) {
            return Err(Error::UnknownReference(format!(
                "prompt {} does not belong to session {}",
                prompt_id, self.id
            )));
        }
        if run_result.passed > run_result.total {
            return Err(Error::BadRequest(format!(
                "passed ({}) exceeds total ({})",
                run_result.passed, run_result.total
            )));
        }
        self.coding_submissions.0.push(CodingSubmission {
            prompt_id,
            run_result,
            submitted_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn complete_coding(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_stage(now, SessionStatus::Coding)?;
        self.transition(SessionStatus::Completed, now);
        Ok(())
    }

    pub fn attach_portfolio(&mut self, url: String, now: DateTime<Utc>) -> Result<()> {
        self.ensure_stage(now, SessionStatus::PortfolioReview)?;
        self.portfolio_url = Some(url);
        self.updated_at = now;
        Ok(())
    }

    pub fn record_portfolio_review(&mut self, score: i32, now: DateTime<Utc>) -> Result<()> {
        self.ensure_stage(now, SessionStatus::PortfolioReview)?;
        if !(0..=100).contains(&score) {
            return Err(Error::BadRequest(format!(
                "portfolio score {} outside 0..=100",
                score
            )));
        }
        self.portfolio_score = Some(score);
        self.transition(SessionStatus::Completed, now);
        Ok(())
    }

    pub fn abandon(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_active(now) {
            return false;
        }
        self.transition(SessionStatus::Abandoned, now);
        true
    }

    pub fn settle_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() || self.effective_status(now) != SessionStatus::Expired {
            return false;
        }
        self.status = SessionStatus::Expired;
        self.updated_at = now;
        true
    }

    fn transition(&mut self, next: SessionStatus, now: DateTime<Utc>) {
        tracing::info!(
            session_id = %self.id,
            from = %self.status,
            to = %next,
            "session transition"
        );
        self.status = next;
        if next == SessionStatus::Completed {
            self.completed_at = Some(now);
        }
        self.updated_at = now;
    }

    pub fn coding_score(&self) -> i32 {
        scoring_service::coding_score(&self.coding_submissions.0)
    }

    pub fn effective_score(&self) -> Option<i32> {
        scoring_service::effective_score(
            self.path_type,
            self.mcq_score,
            self.portfolio_score,
            &self.coding_submissions.0,
        )
    }

    pub fn contributing_score(&self, now: DateTime<Utc>) -> Option<i32> {
        if self.effective_status(now) == SessionStatus::Completed {
            self.effective_score()
        } else {
            None
        }
    }
}
