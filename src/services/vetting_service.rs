use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::dto::vetting_dto::{EnglishSubmissionRequest, SkillSelectionRequest, VettingView};
use crate::error::{Error, Result};
use crate::models::user::Role;
use crate::models::vetting_result::{EnglishProficiency, VettingResult};
use crate::services::audit_service::AuditService;
use crate::services::identity_service::Caller;
use crate::services::scoring_service::ScoringService;
use crate::services::session_service::load_category;

const ENTITY: &str = "vetting_result";

#[derive(Clone)]
pub struct VettingService {
    pool: PgPool,
    scoring: ScoringService,
}

impl VettingService {
    pub fn new(pool: PgPool, scoring: ScoringService) -> Self {
        Self { pool, scoring }
    }

    pub async fn ensure(conn: &mut PgConnection, freelancer_id: Uuid) -> Result<VettingResult> {
        let row = sqlx::query_as::<_, VettingResult>(
            r#"
            INSERT INTO vetting_results (freelancer_id)
            VALUES ($1)
            ON CONFLICT (freelancer_id) DO UPDATE SET freelancer_id = EXCLUDED.freelancer_id
            RETURNING *
            "#,
        )
        .bind(freelancer_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    pub async fn get_mine(&self, caller: &Caller) -> Result<VettingView> {
        caller.require_role(Role::Freelancer)?;
        let mut conn = self.pool.acquire().await?;
        let vetting = Self::ensure(&mut conn, caller.user_id).await?;
        drop(conn);
        self.with_failures(vetting).await
    }

    pub async fn get_for_freelancer(&self, caller: &Caller, freelancer_id: Uuid) -> Result<VettingView> {
        caller.require_staff()?;
        let vetting = sqlx::query_as::<_, VettingResult>(
            r#"SELECT * FROM vetting_results WHERE freelancer_id = $1"#,
        )
        .bind(freelancer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            Error::UnknownReference(format!("no vetting record for freelancer {}", freelancer_id))
        })?;
        self.with_failures(vetting).await
    }

    async fn with_failures(&self, vetting: VettingResult) -> Result<VettingView> {
        let failed_session_count = self
            .scoring
            .count_failed_skill_test_sessions(vetting.freelancer_id)
            .await?;
        Ok(VettingView {
            vetting,
            failed_session_count,
        })
    }

    pub async fn submit_english(
        &self,
        caller: &Caller,
        req: EnglishSubmissionRequest,
    ) -> Result<VettingView> {
        caller.require_role(Role::Freelancer)?;
        let english = EnglishProficiency::new(req.reading, req.writing, req.listening, req.speaking);
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        Self::ensure(&mut tx, caller.user_id).await?;
        let vetting = sqlx::query_as::<_, VettingResult>(
            r#"
            UPDATE vetting_results
            SET english_proficiency = $2,
                current_step = CASE WHEN current_step = 'english' THEN 'skill_selection' ELSE current_step END,
                steps_completed = CASE
                    WHEN 'english' = ANY(steps_completed) THEN steps_completed
                    ELSE array_append(steps_completed, 'english')
                END,
                status = CASE WHEN status = 'pending' THEN 'in_progress' ELSE status END,
                updated_at = $3
            WHERE freelancer_id = $1
            RETURNING *
            "#,
        )
        .bind(caller.user_id)
        .bind(Json(english))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        AuditService::record(
            &mut tx,
            Some(caller.user_id),
            "vetting.english_recorded",
            ENTITY,
            vetting.id,
            Some(json!({ "overall": english.overall })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(freelancer_id = %caller.user_id, overall = english.overall, "english step recorded");
        self.with_failures(vetting).await
    }

    pub async fn select_skills(
        &self,
        caller: &Caller,
        req: SkillSelectionRequest,
    ) -> Result<VettingView> {
        caller.require_role(Role::Freelancer)?;
        let category = load_category(&self.pool, req.category_id).await?;
        if !category.is_active {
            return Err(Error::UnsupportedConfiguration(format!(
                "category {} is not active",
                category.name
            )));
        }
        let skills: Vec<String> = req
            .skills
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let vetting = Self::ensure(&mut tx, caller.user_id).await?;
        let vetting = record_selection(&mut tx, vetting.id, category.id, &skills, false, now).await?;
        AuditService::record(
            &mut tx,
            Some(caller.user_id),
            "vetting.skills_selected",
            ENTITY,
            vetting.id,
            Some(json!({ "category_id": category.id, "skills": skills })),
        )
        .await?;
        tx.commit().await?;
        self.with_failures(vetting).await
    }
}

pub async fn mark_testing(
    conn: &mut PgConnection,
    vetting_id: Uuid,
    category_id: Uuid,
    skills: &[String],
    now: DateTime<Utc>,
) -> Result<VettingResult> {
    record_selection(conn, vetting_id, category_id, skills, true, now).await
}

async fn record_selection(
    conn: &mut PgConnection,
    vetting_id: Uuid,
    category_id: Uuid,
    skills: &[String],
    testing: bool,
    now: DateTime<Utc>,
) -> Result<VettingResult> {
    let row = sqlx::query_as::<_, VettingResult>(
        r#"
        UPDATE vetting_results
        SET selected_category_id = $2,
            selected_skills = $3,
            current_step = CASE
                WHEN $4 OR current_step = 'skill_selection' THEN 'test'::vetting_step
                ELSE current_step
            END,
            steps_completed = CASE
                WHEN 'skill_selection' = ANY(steps_completed) THEN steps_completed
                ELSE array_append(steps_completed, 'skill_selection')
            END,
            status = CASE WHEN $4 THEN 'in_progress'::vetting_status ELSE status END,
            updated_at = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(vetting_id)
    .bind(category_id)
    .bind(skills)
    .bind(testing)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}
