use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::dto::match_dto::{ClientMatchView, FreelancerMatchView, ProjectMatches, StaffMatchView};
use crate::error::{Error, Result};
use crate::models::domain_event::MATCH_CREATED;
use crate::models::freelancer::Freelancer;
use crate::models::match_record::{Match, MatchStatus, ScoringBreakdown};
use crate::models::project::Project;
use crate::models::skill_test_session::SkillTestSession;
use crate::models::user::Role;
use crate::models::vetting_result::VettingStatus;
use crate::services::audit_service::AuditService;
use crate::services::event_service::EventService;
use crate::services::identity_service::Caller;

pub const VETTING_WEIGHT: f64 = 0.5;
pub const SKILL_WEIGHT: f64 = 0.3;
pub const EXPERIENCE_WEIGHT: f64 = 0.1;
pub const CATEGORY_WEIGHT: f64 = 0.1;

const FREELANCER_SELECT: &str = r#"
    SELECT f.user_id, f.first_name, f.last_name, u.email, f.category_id, f.skills,
           f.experience_level, (f.is_active AND u.is_active) AS is_active, u.created_at
    FROM freelancers f
    JOIN users u ON u.id = f.user_id
"#;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VettingSnapshot {
    pub status: Option<VettingStatus>,
    pub overall_score: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
    pub latest_completed: Option<(i32, DateTime<Utc>)>,
}

impl VettingSnapshot {
    pub fn resolve_score(&self) -> Option<i32> {
        let latest = self.latest_completed;
        if let Some(overall) = self.overall_score {
            let stale = match (latest, self.updated_at) {
                (Some((_, completed_at)), Some(updated_at)) => updated_at < completed_at,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !stale {
                return Some(overall);
            }
        }
        latest.map(|(score, _)| score)
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub freelancer: Freelancer,
    pub vetting: VettingSnapshot,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub freelancer_id: Uuid,
    pub breakdown: ScoringBreakdown,
    pub rank: i32,
}

fn normalized(skills: &[String]) -> HashSet<String> {
    skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn skill_overlap(required: &[String], skills: &[String]) -> usize {
    let have = normalized(skills);
    normalized(required).intersection(&have).count()
}

pub fn is_eligible(project: &Project, candidate: &Candidate) -> bool {
    let f = &candidate.freelancer;
    f.is_active
        && candidate.vetting.status != Some(VettingStatus::Rejected)
        && (f.category_id == Some(project.category_id)
            || skill_overlap(&project.required_skills, &f.skills) > 0)
}

pub fn score_breakdown(project: &Project, freelancer: &Freelancer, vetting_score: i32) -> ScoringBreakdown {
    let required = normalized(&project.required_skills);
    let skill_score = if required.is_empty() {
        100
    } else {
        let overlap = skill_overlap(&project.required_skills, &freelancer.skills);
        (100.0 * overlap as f64 / required.len() as f64).round() as i32
    };
    let experience_score = match project.min_experience_level {
        Some(min) if freelancer.experience_level < min => {
            let gap = min.ordinal() - freelancer.experience_level.ordinal();
            (100 - 25 * gap).max(0)
        }
        _ => 100,
    };
    let category_score = if freelancer.category_id == Some(project.category_id) {
        100
    } else {
        0
    };
    let total = VETTING_WEIGHT * f64::from(vetting_score)
        + SKILL_WEIGHT * f64::from(skill_score)
        + EXPERIENCE_WEIGHT * f64::from(experience_score)
        + CATEGORY_WEIGHT * f64::from(category_score);

    ScoringBreakdown {
        vetting_score,
        skill_score,
        experience_score,
        category_score,
        total_score: total.round() as i32,
    }
}

/// Scores eligible candidates and orders them: total desc, then oldest
/// account, then id. Ranks start at 1.
pub fn rank_candidates(project: &Project, candidates: &[Candidate]) -> Vec<RankedCandidate> {
    let mut scored: Vec<(&Freelancer, ScoringBreakdown)> = candidates
        .iter()
        .filter(|c| is_eligible(project, c))
        .filter_map(|c| {
            let vetting_score = c.vetting.resolve_score()?;
            Some((&c.freelancer, score_breakdown(project, &c.freelancer, vetting_score)))
        })
        .collect();

    scored.sort_by(|(fa, a), (fb, b)| {
        b.total_score
            .cmp(&a.total_score)
            .then(fa.created_at.cmp(&fb.created_at))
            .then(fa.user_id.cmp(&fb.user_id))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (f, breakdown))| RankedCandidate {
            freelancer_id: f.user_id,
            breakdown,
            rank: i as i32 + 1,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchAudience {
    Client,
    Freelancer,
    Staff,
}

pub fn audience(caller: &Caller, project: &Project) -> Result<MatchAudience> {
    if caller.is_staff() {
        return Ok(MatchAudience::Staff);
    }
    match caller.role {
        Role::Client if project.client_id == caller.user_id => Ok(MatchAudience::Client),
        Role::Freelancer => Ok(MatchAudience::Freelancer),
        _ => Err(Error::NotAuthorized(
            "only the project owner can read its matches".to_string(),
        )),
    }
}

fn can_compute(caller: &Caller, project: &Project) -> Result<()> {
    if caller.is_staff() || (caller.role == Role::Client && project.client_id == caller.user_id) {
        Ok(())
    } else {
        Err(Error::NotAuthorized(
            "only the project owner can compute matches".to_string(),
        ))
    }
}

/// Admins may set any status; the matched freelancer may only answer a pending match.
pub fn check_status_change(caller: &Caller, record: &Match, next: MatchStatus) -> Result<()> {
    if caller.role == Role::Admin {
        return Ok(());
    }
    if caller.role != Role::Freelancer {
        return Err(Error::NotAuthorized(
            "match status is set by the freelancer or an admin".to_string(),
        ));
    }
    if record.freelancer_id != caller.user_id {
        return Err(Error::UnknownReference(format!("match {} not found", record.id)));
    }
    if record.status != MatchStatus::Pending {
        return Err(Error::BadRequest(format!(
            "match is already {:?}",
            record.status
        ).to_lowercase()));
    }
    match next {
        MatchStatus::Accepted | MatchStatus::Rejected => Ok(()),
        other => Err(Error::BadRequest(format!(
            "freelancers cannot set status {:?}",
            other
        ).to_lowercase())),
    }
}

#[derive(Clone)]
pub struct MatchingService {
    pool: PgPool,
}

impl MatchingService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn project(&self, project_id: Uuid) -> Result<Project> {
        sqlx::query_as::<_, Project>(r#"SELECT * FROM projects WHERE id = $1"#)
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::UnknownReference(format!("project {} not found", project_id)))
    }

    pub async fn compute_matches(&self, caller: &Caller, project_id: Uuid) -> Result<Vec<Match>> {
        let project = self.project(project_id).await?;
        can_compute(caller, &project)?;

        let required: Vec<String> = normalized(&project.required_skills).into_iter().collect();
        let freelancers = sqlx::query_as::<_, Freelancer>(&format!(
            r#"{FREELANCER_SELECT}
               WHERE f.is_active AND u.is_active
                 AND (f.category_id = $1
                      OR EXISTS (SELECT 1 FROM unnest(f.skills) AS s(skill) WHERE lower(trim(s.skill)) = ANY($2)))"#
        ))
        .bind(project.category_id)
        .bind(&required)
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(freelancers.len());
        for freelancer in freelancers {
            match self.snapshot(freelancer.user_id).await {
                Ok(vetting) => candidates.push(Candidate { freelancer, vetting }),
                Err(e) => tracing::warn!(
                    project_id = %project.id,
                    freelancer_id = %freelancer.user_id,
                    error = %e,
                    "skipping match candidate"
                ),
            }
        }

        let ranked = rank_candidates(&project, &candidates);
        let eligible: Vec<Uuid> = ranked.iter().map(|r| r.freelancer_id).collect();

        let mut tx = self.pool.begin().await?;
        let mut matches = Vec::with_capacity(ranked.len());
        let mut created = 0usize;
        for candidate in &ranked {
            let row = sqlx::query(
                r#"
                INSERT INTO matches (project_id, freelancer_id, status, scoring_breakdown, rank)
                VALUES ($1, $2, 'pending', $3, $4)
                ON CONFLICT (project_id, freelancer_id) DO UPDATE
                SET scoring_breakdown = EXCLUDED.scoring_breakdown,
                    rank = EXCLUDED.rank,
                    status = CASE WHEN matches.status = 'expired' THEN 'pending'::match_status ELSE matches.status END,
                    updated_at = NOW()
                RETURNING *, (xmax = 0) AS inserted
                "#,
            )
            .bind(project.id)
            .bind(candidate.freelancer_id)
            .bind(Json(candidate.breakdown))
            .bind(candidate.rank)
            .fetch_one(&mut *tx)
            .await?;
            let record = Match::from_row(&row)?;
            let inserted: bool = row.try_get("inserted")?;
            if inserted {
                created += 1;
                EventService::enqueue(
                    &mut tx,
                    MATCH_CREATED,
                    &json!({
                        "event": MATCH_CREATED,
                        "match_id": record.id,
                        "project_id": record.project_id,
                        "freelancer_id": record.freelancer_id,
                        "total_score": record.scoring_breakdown.total_score,
                        "rank": record.rank,
                    }),
                )
                .await?;
            }
            matches.push(record);
        }

        let expired = sqlx::query(
            r#"UPDATE matches SET status = 'expired', updated_at = NOW()
               WHERE project_id = $1 AND status = 'pending' AND NOT (freelancer_id = ANY($2))"#,
        )
        .bind(project.id)
        .bind(&eligible)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        AuditService::record(
            &mut tx,
            Some(caller.user_id),
            "matches.computed",
            "project",
            project.id,
            Some(json!({ "ranked": matches.len(), "created": created, "expired": expired })),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            project_id = %project.id,
            ranked = matches.len(),
            created,
            expired,
            "matches computed"
        );
        Ok(matches)
    }

    async fn snapshot(&self, freelancer_id: Uuid) -> Result<VettingSnapshot> {
        let vetting = sqlx::query(
            r#"SELECT status, overall_score, updated_at FROM vetting_results WHERE freelancer_id = $1"#,
        )
        .bind(freelancer_id)
        .fetch_optional(&self.pool)
        .await?;

        let latest = sqlx::query_as::<_, SkillTestSession>(
            r#"SELECT * FROM skill_test_sessions
               WHERE freelancer_id = $1 AND status = 'completed'
               ORDER BY completed_at DESC NULLS LAST
               LIMIT 1"#,
        )
        .bind(freelancer_id)
        .fetch_optional(&self.pool)
        .await?;

        let mut snapshot = VettingSnapshot {
            latest_completed: latest.and_then(|s| {
                let score = s.effective_score()?;
                Some((score, s.completed_at.unwrap_or(s.updated_at)))
            }),
            ..VettingSnapshot::default()
        };
        if let Some(row) = vetting {
            snapshot.status = Some(row.try_get("status")?);
            snapshot.overall_score = row.try_get("overall_score")?;
            snapshot.updated_at = Some(row.try_get("updated_at")?);
        }
        Ok(snapshot)
    }

    async fn freelancers(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Freelancer>> {
        let rows = sqlx::query_as::<_, Freelancer>(&format!(
            "{FREELANCER_SELECT} WHERE f.user_id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|f| (f.user_id, f)).collect())
    }

    pub async fn list_project_matches(
        &self,
        caller: &Caller,
        project_id: Uuid,
    ) -> Result<ProjectMatches> {
        let project = self.project(project_id).await?;
        match audience(caller, &project)? {
            MatchAudience::Freelancer => {
                let views = self.freelancer_views(caller.user_id, Some(project.id)).await?;
                Ok(ProjectMatches::Freelancer(views))
            }
            MatchAudience::Client => {
                let records = self.project_records(project.id, false).await?;
                let ids: Vec<Uuid> = records.iter().map(|m| m.freelancer_id).collect();
                let profiles = self.freelancers(&ids).await?;
                Ok(ProjectMatches::Client(
                    records
                        .iter()
                        .filter_map(|m| profiles.get(&m.freelancer_id).map(|f| ClientMatchView::new(m, f)))
                        .collect(),
                ))
            }
            MatchAudience::Staff => {
                let records = self.project_records(project.id, true).await?;
                let ids: Vec<Uuid> = records.iter().map(|m| m.freelancer_id).collect();
                let mut profiles = self.freelancers(&ids).await?;
                Ok(ProjectMatches::Staff(
                    records
                        .into_iter()
                        .filter_map(|record| {
                            let freelancer = profiles.remove(&record.freelancer_id)?;
                            Some(StaffMatchView { record, freelancer })
                        })
                        .collect(),
                ))
            }
        }
    }

    async fn project_records(&self, project_id: Uuid, include_expired: bool) -> Result<Vec<Match>> {
        let rows = sqlx::query_as::<_, Match>(
            r#"SELECT * FROM matches
               WHERE project_id = $1 AND ($2 OR status <> 'expired')
               ORDER BY rank ASC, created_at ASC"#,
        )
        .bind(project_id)
        .bind(include_expired)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn my_matches(&self, caller: &Caller) -> Result<Vec<FreelancerMatchView>> {
        caller.require_role(Role::Freelancer)?;
        self.freelancer_views(caller.user_id, None).await
    }

    async fn freelancer_views(
        &self,
        freelancer_id: Uuid,
        project_id: Option<Uuid>,
    ) -> Result<Vec<FreelancerMatchView>> {
        let rows = sqlx::query_as::<_, FreelancerMatchView>(
            r#"SELECT m.id AS match_id, m.project_id, p.title AS project_title, m.status,
                      m.rank, m.scoring_breakdown, m.created_at
               FROM matches m
               JOIN projects p ON p.id = m.project_id
               WHERE m.freelancer_id = $1 AND ($2::uuid IS NULL OR m.project_id = $2)
               ORDER BY m.created_at DESC"#,
        )
        .bind(freelancer_id)
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_status(
        &self,
        caller: &Caller,
        match_id: Uuid,
        status: MatchStatus,
    ) -> Result<Match> {
        let mut tx = self.pool.begin().await?;
        let record = sqlx::query_as::<_, Match>(r#"SELECT * FROM matches WHERE id = $1 FOR UPDATE"#)
            .bind(match_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::UnknownReference(format!("match {} not found", match_id)))?;
        check_status_change(caller, &record, status)?;

        let updated = sqlx::query_as::<_, Match>(
            r#"UPDATE matches SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *"#,
        )
        .bind(match_id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;
        AuditService::record(
            &mut tx,
            Some(caller.user_id),
            "match.status_changed",
            "match",
            match_id,
            Some(json!({ "from": record.status, "to": status })),
        )
        .await?;
        tx.commit().await?;
        Ok(updated)
    }
}
