use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::dto::session_dto::{
    CodingRunRequest, SessionSummary, SessionView, StartSessionRequest,
};
use crate::error::{Error, Result};
use crate::models::category::Category;
use crate::models::experience::ExperienceLevel;
use crate::models::skill_test_session::{
    McqAnswer, PathType, SessionPlan, SessionStatus, SkillTestSession,
};
use crate::models::user::Role;
use crate::services::audit_service::AuditService;
use crate::services::complexity_service::resolve_complexity;
use crate::services::identity_service::Caller;
use crate::services::pool_service::{self, normalize_language, PoolService};
use crate::services::scoring_service::ScoringService;
use crate::services::vetting_service::{self, VettingService};

const ENTITY: &str = "skill_test_session";

#[derive(Clone)]
pub struct SessionService {
    pool: PgPool,
    pools: PoolService,
    scoring: ScoringService,
}

impl SessionService {
    pub fn new(pool: PgPool, pools: PoolService, scoring: ScoringService) -> Self {
        Self {
            pool,
            pools,
            scoring,
        }
    }

    pub async fn start(&self, caller: &Caller, req: StartSessionRequest) -> Result<SessionView> {
        caller.require_role(Role::Freelancer)?;
        let freelancer_id = caller.user_id;

        let profile_level = sqlx::query_scalar::<_, ExperienceLevel>(
            r#"SELECT experience_level FROM freelancers WHERE user_id = $1"#,
        )
        .bind(freelancer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::UnknownReference("freelancer profile not found".to_string()))?;
        let level = req
            .experience_level
            .as_deref()
            .map(ExperienceLevel::from_input)
            .unwrap_or(profile_level);

        let category = load_category(&self.pool, req.category_id).await?;
        let language = check_path(&category, req.path_type, req.language.as_deref())?;
        let complexity = resolve_complexity(level);

        let mcq_pool = self.pools.ensure_mcq_pool(&category, level).await?;
        if mcq_pool.is_empty() {
            return Err(Error::GenerationUnavailable(format!(
                "no MCQs available for {} / {}",
                category.name,
                level.as_str()
            )));
        }
        let prompt_pool = match language.as_deref() {
            Some(lang) => {
                let ids = self.pools.ensure_coding_pool(&category, level, lang).await?;
                if ids.is_empty() {
                    return Err(Error::GenerationUnavailable(format!(
                        "no {} prompts available for {} / {}",
                        lang,
                        category.name,
                        level.as_str()
                    )));
                }
                ids
            }
            None => Vec::new(),
        };

        let (mcq_ids, prompt_ids) = {
            let mut rng = rand::thread_rng();
            (
                pool_service::select_subset(&mcq_pool, complexity.question_count, &mut rng),
                pool_service::select_subset(&prompt_pool, 1, &mut rng),
            )
        };
        if mcq_ids.len() < complexity.question_count {
            tracing::warn!(
                category_id = %category.id,
                level = level.as_str(),
                wanted = complexity.question_count,
                issued = mcq_ids.len(),
                "issuing a shorter question set than the level calls for"
            );
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let vetting = VettingService::ensure(&mut tx, freelancer_id).await?;

        let live = sqlx::query_as::<_, SkillTestSession>(
            r#"SELECT * FROM skill_test_sessions
               WHERE freelancer_id = $1 AND status IN ('mcq', 'coding', 'portfolio_review')
               FOR UPDATE"#,
        )
        .bind(freelancer_id)
        .fetch_all(&mut *tx)
        .await?;
        for mut previous in live {
            if previous.abandon(now) {
                tracing::info!(session_id = %previous.id, "superseded by a new session");
                persist(&mut tx, &previous).await?;
            } else if previous.settle_expiry(now) {
                persist(&mut tx, &previous).await?;
            }
        }

        let session = SkillTestSession::open(
            SessionPlan {
                freelancer_id,
                vetting_result_id: vetting.id,
                path_type: req.path_type,
                experience_level: level,
                category_id: category.id,
                selected_skills: clean_skills(&req.selected_skills),
                selected_language: language,
                mcq_question_ids: mcq_ids,
                coding_prompt_ids: prompt_ids,
            },
            now,
        );
        let session = insert(&mut tx, &session).await?;

        vetting_service::mark_testing(&mut tx, vetting.id, category.id, &session.selected_skills, now)
            .await?;
        AuditService::record(
            &mut tx,
            Some(caller.user_id),
            "session.started",
            ENTITY,
            session.id,
            Some(json!({
                "path_type": session.path_type,
                "experience_level": session.experience_level,
                "category_id": session.category_id,
                "questions": session.mcq_question_ids.len(),
            })),
        )
        .await?;

        let questions = pool_service::load_mcqs(&mut tx, &session.mcq_question_ids).await?;
        let prompts = pool_service::load_prompts(&mut tx, &session.coding_prompt_ids).await?;
        tx.commit().await?;

        tracing::info!(
            session_id = %session.id,
            freelancer_id = %freelancer_id,
            path_type = ?session.path_type,
            "session started"
        );
        Ok(SessionView::new(&session, &questions, &prompts, now))
    }

    pub async fn get(&self, caller: &Caller, session_id: Uuid) -> Result<SessionView> {
        let session = fetch(&self.pool, session_id).await?;
        ensure_can_read(caller, &session)?;
        let now = Utc::now();
        let mut conn = self.pool.acquire().await?;
        let questions = pool_service::load_mcqs(&mut conn, &session.mcq_question_ids).await?;
        let prompts = pool_service::load_prompts(&mut conn, &session.coding_prompt_ids).await?;
        Ok(SessionView::new(&session, &questions, &prompts, now))
    }

    pub async fn list(
        &self,
        caller: &Caller,
        freelancer_id: Option<Uuid>,
    ) -> Result<Vec<SessionSummary>> {
        let target = match (caller.role, freelancer_id) {
            (Role::Freelancer, None) => caller.user_id,
            (Role::Freelancer, Some(id)) if id == caller.user_id => id,
            (_, Some(id)) if caller.is_staff() => id,
            (_, None) if caller.is_staff() => {
                return Err(Error::BadRequest("freelancer_id is required".to_string()))
            }
            _ => return Err(Error::NotAuthorized("cannot list these sessions".to_string())),
        };

        let sessions = sqlx::query_as::<_, SkillTestSession>(
            r#"SELECT * FROM skill_test_sessions WHERE freelancer_id = $1 ORDER BY started_at DESC"#,
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await?;
        let now = Utc::now();
        Ok(sessions.iter().map(|s| SessionSummary::new(s, now)).collect())
    }

    pub async fn submit_mcq(
        &self,
        caller: &Caller,
        session_id: Uuid,
        answers: Vec<McqAnswer>,
    ) -> Result<SessionView> {
        let now = Utc::now();
        let (mut tx, mut session) = self.lock_for_owner(caller, session_id, now).await?;
        let questions = pool_service::load_mcqs(&mut tx, &session.mcq_question_ids).await?;
        let score = session.record_mcq(&answers, &questions, now)?;
        let session = self
            .finish(
                tx,
                caller,
                session,
                "session.mcq_submitted",
                json!({ "answered": answers.len(), "mcq_score": score }),
                now,
            )
            .await?;
        self.view(&session, now).await
    }

    pub async fn submit_coding_run(
        &self,
        caller: &Caller,
        session_id: Uuid,
        run: CodingRunRequest,
    ) -> Result<SessionView> {
        let now = Utc::now();
        let (tx, mut session) = self.lock_for_owner(caller, session_id, now).await?;
        session.record_coding_run(run.prompt_id, run.run_result(), now)?;
        let session = self
            .finish(
                tx,
                caller,
                session,
                "session.coding_run",
                json!({ "prompt_id": run.prompt_id, "passed": run.passed, "total": run.total }),
                now,
            )
            .await?;
        self.view(&session, now).await
    }

    pub async fn complete(&self, caller: &Caller, session_id: Uuid) -> Result<SessionView> {
        let now = Utc::now();
        let (tx, mut session) = self.lock_for_owner(caller, session_id, now).await?;
        session.complete_coding(now)?;
        let runs = session.coding_submissions.0.len();
        let session = self
            .finish(
                tx,
                caller,
                session,
                "session.completed",
                json!({ "coding_runs": runs }),
                now,
            )
            .await?;
        self.view(&session, now).await
    }

    pub async fn attach_portfolio(
        &self,
        caller: &Caller,
        session_id: Uuid,
        portfolio_url: &str,
    ) -> Result<SessionView> {
        let url = parse_portfolio_url(portfolio_url)?;
        let now = Utc::now();
        let (tx, mut session) = self.lock_for_owner(caller, session_id, now).await?;
        session.attach_portfolio(url.clone(), now)?;
        let session = self
            .finish(
                tx,
                caller,
                session,
                "session.portfolio_attached",
                json!({ "portfolio_url": url }),
                now,
            )
            .await?;
        self.view(&session, now).await
    }

    pub async fn review_portfolio(
        &self,
        caller: &Caller,
        session_id: Uuid,
        score: i32,
        notes: Option<String>,
    ) -> Result<SessionView> {
        caller.require_staff()?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut session = lock(&mut tx, session_id).await?;
        if session.settle_expiry(now) {
            return Err(commit_expiry(tx, &session).await?);
        }
        session.record_portfolio_review(score, now)?;
        let session = self
            .finish(
                tx,
                caller,
                session,
                "session.portfolio_reviewed",
                json!({ "portfolio_score": score, "notes": notes }),
                now,
            )
            .await?;
        self.view(&session, now).await
    }

    async fn lock_for_owner(
        &self,
        caller: &Caller,
        session_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(Transaction<'static, Postgres>, SkillTestSession)> {
        let mut tx = self.pool.begin().await?;
        let mut session = lock(&mut tx, session_id).await?;
        if session.freelancer_id != caller.user_id {
            return Err(if caller.is_staff() {
                Error::NotAuthorized("only the freelancer may submit to this session".to_string())
            } else {
                not_found(session_id)
            });
        }
        if session.settle_expiry(now) {
            return Err(commit_expiry(tx, &session).await?);
        }
        Ok((tx, session))
    }

    async fn finish(
        &self,
        mut tx: Transaction<'static, Postgres>,
        caller: &Caller,
        session: SkillTestSession,
        action: &str,
        changes: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<SkillTestSession> {
        let just_completed =
            session.status == SessionStatus::Completed && session.completed_at == Some(now);
        let saved = persist(&mut tx, &session).await?;
        if just_completed {
            self.scoring.apply_completion(&mut tx, &saved, now).await?;
        }
        AuditService::record(&mut tx, Some(caller.user_id), action, ENTITY, saved.id, Some(changes))
            .await?;
        tx.commit().await?;
        Ok(saved)
    }

    async fn view(&self, session: &SkillTestSession, now: DateTime<Utc>) -> Result<SessionView> {
        let mut conn = self.pool.acquire().await?;
        let questions = pool_service::load_mcqs(&mut conn, &session.mcq_question_ids).await?;
        let prompts = pool_service::load_prompts(&mut conn, &session.coding_prompt_ids).await?;
        Ok(SessionView::new(session, &questions, &prompts, now))
    }
}

async fn commit_expiry(
    mut tx: Transaction<'static, Postgres>,
    session: &SkillTestSession,
) -> Result<Error> {
    persist(&mut tx, session).await?;
    tx.commit().await?;
    tracing::warn!(session_id = %session.id, "submission after session deadline");
    Ok(Error::InvalidSessionState(format!(
        "session {} is expired",
        session.id
    )))
}

fn not_found(session_id: Uuid) -> Error {
    Error::UnknownReference(format!("session {} not found", session_id))
}

fn ensure_can_read(caller: &Caller, session: &SkillTestSession) -> Result<()> {
    if session.freelancer_id == caller.user_id || caller.is_staff() {
        Ok(())
    } else {
        Err(not_found(session.id))
    }
}

pub fn check_path(
    category: &Category,
    path: PathType,
    language: Option<&str>,
) -> Result<Option<String>> {
    if !category.is_active {
        return Err(Error::UnsupportedConfiguration(format!(
            "category {} is not active",
            category.name
        )));
    }
    match path {
        PathType::McqOnly => Ok(None),
        PathType::PortfolioMcq if category.supports_portfolio => Ok(None),
        PathType::PortfolioMcq => Err(Error::UnsupportedConfiguration(format!(
            "category {} has no portfolio review",
            category.name
        ))),
        PathType::CodingMcq if !category.supports_coding => Err(Error::UnsupportedConfiguration(
            format!("category {} has no coding assessment", category.name),
        )),
        PathType::CodingMcq => {
            let language = language
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| {
                    Error::UnsupportedConfiguration("coding sessions need a language".to_string())
                })?;
            if !category.supports_language(language) {
                return Err(Error::UnsupportedConfiguration(format!(
                    "{} is not offered for {}",
                    language, category.name
                )));
            }
            Ok(Some(normalize_language(language)))
        }
    }
}

pub fn parse_portfolio_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| Error::BadRequest(format!("invalid portfolio url: {}", e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed.to_string()),
        _ => Err(Error::BadRequest(
            "portfolio url must be an http(s) link".to_string(),
        )),
    }
}

fn clean_skills(skills: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if !out.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
            out.push(skill.to_string());
        }
    }
    out
}

pub async fn load_category(pool: &PgPool, category_id: Uuid) -> Result<Category> {
    sqlx::query_as::<_, Category>(r#"SELECT * FROM categories WHERE id = $1"#)
        .bind(category_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::UnknownReference(format!("category {} not found", category_id)))
}

async fn fetch(pool: &PgPool, session_id: Uuid) -> Result<SkillTestSession> {
    sqlx::query_as::<_, SkillTestSession>(r#"SELECT * FROM skill_test_sessions WHERE id = $1"#)
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found(session_id))
}

async fn lock(conn: &mut PgConnection, session_id: Uuid) -> Result<SkillTestSession> {
    sqlx::query_as::<_, SkillTestSession>(
        r#"SELECT * FROM skill_test_sessions WHERE id = $1 FOR UPDATE"#,
    )
    .bind(session_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| not_found(session_id))
}

async fn insert(conn: &mut PgConnection, s: &SkillTestSession) -> Result<SkillTestSession> {
    let row = sqlx::query_as::<_, SkillTestSession>(
        r#"
        INSERT INTO skill_test_sessions (
            id, freelancer_id, vetting_result_id, status, path_type, experience_level,
            category_id, selected_skills, selected_language, mcq_question_ids, coding_prompt_ids,
            coding_submissions, version, started_at, expires_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13, $14, $13, $13)
        RETURNING *
        "#,
    )
    .bind(s.id)
    .bind(s.freelancer_id)
    .bind(s.vetting_result_id)
    .bind(s.status)
    .bind(s.path_type)
    .bind(s.experience_level)
    .bind(s.category_id)
    .bind(&s.selected_skills)
    .bind(&s.selected_language)
    .bind(&s.mcq_question_ids)
    .bind(&s.coding_prompt_ids)
    .bind(&s.coding_submissions)
    .bind(s.started_at)
    .bind(s.expires_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Version-checked write of every mutable column. The row is already locked,
/// so a version mismatch means the caller skipped the lock.
async fn persist(conn: &mut PgConnection, s: &SkillTestSession) -> Result<SkillTestSession> {
    sqlx::query_as::<_, SkillTestSession>(
        r#"
        UPDATE skill_test_sessions
        SET status = $3, mcq_score = $4, portfolio_score = $5, portfolio_url = $6,
            coding_submissions = $7, completed_at = $8, updated_at = $9,
            version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING *
        "#,
    )
    .bind(s.id)
    .bind(s.version)
    .bind(s.status)
    .bind(s.mcq_score)
    .bind(s.portfolio_score)
    .bind(&s.portfolio_url)
    .bind(&s.coding_submissions)
    .bind(s.completed_at)
    .bind(s.updated_at)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
        Error::InvalidSessionState(format!("session {} was modified concurrently", s.id))
    })
}
