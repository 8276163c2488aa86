use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Result;
use crate::models::domain_event::VETTING_COMPLETED;
use crate::models::skill_test_session::{CodingSubmission, PathType, SkillTestSession};
use crate::models::vetting_result::{SkillAssessmentSummary, VettingResult, VettingStatus};
use crate::services::complexity_service::resolve_complexity;
use crate::services::event_service::EventService;

pub const FAILING_SCORE_THRESHOLD: i32 = 60;
pub const APPROVAL_THRESHOLD: i32 = 60;

pub fn percentage(part: u32, whole: u32) -> i32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * f64::from(part) / f64::from(whole)).round() as i32
}

pub fn coding_score(submissions: &[CodingSubmission]) -> i32 {
    let (passed, total) = submissions
        .iter()
        .filter(|s| s.run_result.total > 0)
        .fold((0u32, 0u32), |(p, t), s| {
            (p + s.run_result.passed, t + s.run_result.total)
        });
    percentage(passed, total)
}

pub fn effective_score(
    path: PathType,
    mcq_score: Option<i32>,
    portfolio_score: Option<i32>,
    submissions: &[CodingSubmission],
) -> Option<i32> {
    let mcq = mcq_score?;
    match path {
        PathType::McqOnly => Some(mcq),
        PathType::PortfolioMcq => {
            let portfolio = portfolio_score?;
            Some((f64::from(portfolio) * 0.3 + f64::from(mcq) * 0.7).round() as i32)
        }
        PathType::CodingMcq => {
            let coding = coding_score(submissions);
            Some((f64::from(coding + mcq) / 2.0).round() as i32)
        }
    }
}

pub fn count_failed_sessions(sessions: &[SkillTestSession], now: DateTime<Utc>) -> usize {
    sessions
        .iter()
        .filter_map(|s| s.contributing_score(now))
        .filter(|score| *score < FAILING_SCORE_THRESHOLD)
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedScore {
    pub category_id: Uuid,
    pub effective_score: i32,
    pub completed_at: DateTime<Utc>,
}

impl CompletedScore {
    pub fn from_sessions(sessions: &[SkillTestSession], now: DateTime<Utc>) -> Vec<Self> {
        sessions
            .iter()
            .filter_map(|s| {
                let score = s.contributing_score(now)?;
                Some(CompletedScore {
                    category_id: s.category_id,
                    effective_score: score,
                    completed_at: s.completed_at.unwrap_or(s.updated_at),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    #[default]
    LatestPerCategory,
    RecencyWeighted,
}

impl std::str::FromStr for AggregationPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "latest_per_category" => Ok(AggregationPolicy::LatestPerCategory),
            "recency_weighted" => Ok(AggregationPolicy::RecencyWeighted),
            other => Err(format!("unknown aggregation policy '{}'", other)),
        }
    }
}

impl AggregationPolicy {
    pub fn aggregate(self, scores: &[CompletedScore]) -> Option<i32> {
        if scores.is_empty() {
            return None;
        }
        let mut ordered: Vec<&CompletedScore> = scores.iter().collect();
        ordered.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

        match self {
            AggregationPolicy::LatestPerCategory => {
                let mut latest: HashMap<Uuid, i32> = HashMap::new();
                for score in ordered {
                    latest.entry(score.category_id).or_insert(score.effective_score);
                }
                let sum: f64 = latest.values().map(|v| f64::from(*v)).sum();
                Some((sum / latest.len() as f64).round() as i32)
            }
            AggregationPolicy::RecencyWeighted => {
                let (weighted, weights) = ordered.iter().enumerate().fold(
                    (0.0f64, 0.0f64),
                    |(acc, total), (k, score)| {
                        let w = 0.5f64.powi(k as i32);
                        (acc + w * f64::from(score.effective_score), total + w)
                    },
                );
                Some((weighted / weights).round() as i32)
            }
        }
    }
}

pub fn summarize(session: &SkillTestSession, now: DateTime<Utc>) -> Option<SkillAssessmentSummary> {
    let effective = session.contributing_score(now)?;
    let coding_score = match session.path_type {
        PathType::CodingMcq => Some(session.coding_score()),
        _ => None,
    };
    Some(SkillAssessmentSummary {
        session_id: session.id,
        category_id: session.category_id,
        path_type: session.path_type,
        experience_level: session.experience_level,
        mcq_score: session.mcq_score,
        coding_score,
        portfolio_score: session.portfolio_score,
        effective_score: effective,
        passed: effective >= resolve_complexity(session.experience_level).passing_score,
        completed_at: session.completed_at.unwrap_or(now),
    })
}

#[derive(Clone)]
pub struct ScoringService {
    pool: PgPool,
    policy: AggregationPolicy,
}

impl ScoringService {
    pub fn new(pool: PgPool, policy: AggregationPolicy) -> Self {
        Self { pool, policy }
    }

    /// Folds a just-completed session into its vetting record. Runs on the
    /// caller's connection so it commits together with the session update.
    pub async fn apply_completion(
        &self,
        conn: &mut PgConnection,
        session: &SkillTestSession,
        now: DateTime<Utc>,
    ) -> Result<Option<VettingResult>> {
        let Some(summary) = summarize(session, now) else {
            tracing::warn!(session_id = %session.id, "completed session has no effective score");
            return Ok(None);
        };

        sqlx::query(
            r#"UPDATE vetting_results
               SET skill_assessments = skill_assessments || $2, updated_at = $3
               WHERE id = $1"#,
        )
        .bind(session.vetting_result_id)
        .bind(Json(vec![summary.clone()]))
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let vetting = self
            .recompute_overall(&mut *conn, session.freelancer_id, now)
            .await?;

        EventService::enqueue(
            &mut *conn,
            VETTING_COMPLETED,
            &json!({
                "event": VETTING_COMPLETED,
                "freelancer_id": session.freelancer_id,
                "session_id": session.id,
                "effective_score": summary.effective_score,
                "overall_score": vetting.overall_score,
                "status": vetting.status,
            }),
        )
        .await?;

        tracing::info!(
            session_id = %session.id,
            freelancer_id = %session.freelancer_id,
            effective_score = summary.effective_score,
            overall_score = ?vetting.overall_score,
            "vetting updated from completed session"
        );
        Ok(Some(vetting))
    }

    pub async fn recompute_overall(
        &self,
        conn: &mut PgConnection,
        freelancer_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<VettingResult> {
        let completed = completed_sessions(&mut *conn, freelancer_id).await?;
        let scores = CompletedScore::from_sessions(&completed, now);
        let overall = self.policy.aggregate(&scores);
        let status = match overall {
            Some(score) if score >= APPROVAL_THRESHOLD => VettingStatus::Approved,
            Some(_) => VettingStatus::Rejected,
            None => VettingStatus::InProgress,
        };

        let vetting = sqlx::query_as::<_, VettingResult>(
            r#"UPDATE vetting_results
               SET overall_score = $2,
                   status = $3,
                   current_step = CASE WHEN $2::int IS NULL THEN current_step ELSE 'completed' END,
                   steps_completed = CASE
                       WHEN $2::int IS NULL OR 'test' = ANY(steps_completed) THEN steps_completed
                       ELSE array_append(steps_completed, 'test')
                   END,
                   updated_at = $4
               WHERE freelancer_id = $1
               RETURNING *"#,
        )
        .bind(freelancer_id)
        .bind(overall)
        .bind(status)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        Ok(vetting)
    }

    pub async fn count_failed_skill_test_sessions(&self, freelancer_id: Uuid) -> Result<usize> {
        let mut conn = self.pool.acquire().await?;
        let completed = completed_sessions(&mut conn, freelancer_id).await?;
        Ok(count_failed_sessions(&completed, Utc::now()))
    }
}

pub async fn completed_sessions(
    conn: &mut PgConnection,
    freelancer_id: Uuid,
) -> Result<Vec<SkillTestSession>> {
    let rows = sqlx::query_as::<_, SkillTestSession>(
        r#"SELECT * FROM skill_test_sessions
           WHERE freelancer_id = $1 AND status = 'completed'
           ORDER BY completed_at DESC"#,
    )
    .bind(freelancer_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::experience::ExperienceLevel;
    use crate::models::skill_test_session::{RunResult, SessionPlan, SessionStatus};
    use chrono::Duration;

    fn run(passed: u32, total: u32) -> CodingSubmission {
        CodingSubmission {
            prompt_id: Uuid::nil(),
            run_result: RunResult { passed, total },
            submitted_at: Utc::now(),
        }
    }

    fn completed(path: PathType, mcq: i32, category: Uuid, at: DateTime<Utc>) -> SkillTestSession {
        let mut s = SkillTestSession::open(
            SessionPlan {
                freelancer_id: Uuid::nil(),
                vetting_result_id: Uuid::nil(),
                path_type: path,
                experience_level: ExperienceLevel::Mid,
                category_id: category,
                selected_skills: vec![],
                selected_language: None,
                mcq_question_ids: vec![],
                coding_prompt_ids: vec![],
            },
            at,
        );
        s.mcq_score = Some(mcq);
        s.status = SessionStatus::Completed;
        s.completed_at = Some(at);
        s
    }

    #[test]
    fn mcq_only_effective_equals_mcq() {
        for mcq in [0, 37, 60, 100] {
            assert_eq!(effective_score(PathType::McqOnly, Some(mcq), None, &[]), Some(mcq));
        }
    }

    #[test]
    fn coding_path_averages_pass_ratio_with_mcq() {
        let subs = [run(3, 5), run(4, 5)];
        assert_eq!(coding_score(&subs), 70);
        assert_eq!(effective_score(PathType::CodingMcq, Some(80), None, &subs), Some(75));
    }

    #[test]
    fn coding_ignores_empty_runs_and_defaults_to_zero() {
        assert_eq!(coding_score(&[]), 0);
        assert_eq!(coding_score(&[run(0, 0)]), 0);
        assert_eq!(coding_score(&[run(0, 0), run(1, 2)]), 50);
        assert_eq!(effective_score(PathType::CodingMcq, Some(90), None, &[]), Some(45));
    }

    #[test]
    fn portfolio_path_weights_mcq_seventy_percent() {
        assert_eq!(
            effective_score(PathType::PortfolioMcq, Some(80), Some(90), &[]),
            Some(83)
        );
        assert_eq!(effective_score(PathType::PortfolioMcq, Some(80), None, &[]), None);
    }

    #[test]
    fn missing_mcq_means_no_effective_score() {
        assert_eq!(effective_score(PathType::McqOnly, None, None, &[]), None);
        assert_eq!(effective_score(PathType::CodingMcq, None, None, &[run(5, 5)]), None);
    }

    #[test]
    fn failed_count_only_considers_completed_sessions() {
        let now = Utc::now();
        let cat = Uuid::new_v4();
        let mut sessions = vec![
            completed(PathType::McqOnly, 40, cat, now),
            completed(PathType::McqOnly, 59, cat, now),
            completed(PathType::McqOnly, 60, cat, now),
        ];
        let mut expired = completed(PathType::McqOnly, 10, cat, now);
        expired.status = SessionStatus::Expired;
        expired.completed_at = None;
        sessions.push(expired);
        let mut abandoned = completed(PathType::McqOnly, 5, cat, now);
        abandoned.status = SessionStatus::Abandoned;
        sessions.push(abandoned);

        assert_eq!(count_failed_sessions(&sessions, now), 2);
    }

    #[test]
    fn latest_per_category_takes_newest_in_each_category() {
        let now = Utc::now();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let scores = [
            CompletedScore { category_id: a, effective_score: 40, completed_at: now - Duration::days(2) },
            CompletedScore { category_id: a, effective_score: 90, completed_at: now },
            CompletedScore { category_id: b, effective_score: 71, completed_at: now - Duration::days(1) },
        ];
        assert_eq!(AggregationPolicy::LatestPerCategory.aggregate(&scores), Some(81));
    }

    #[test]
    fn recency_weighted_favours_recent_attempts() {
        let now = Utc::now();
        let cat = Uuid::new_v4();
        let scores = [
            CompletedScore { category_id: cat, effective_score: 30, completed_at: now - Duration::days(1) },
            CompletedScore { category_id: cat, effective_score: 90, completed_at: now },
        ];
        // (90 * 1 + 30 * 0.5) / 1.5
        assert_eq!(AggregationPolicy::RecencyWeighted.aggregate(&scores), Some(70));
        assert_eq!(AggregationPolicy::RecencyWeighted.aggregate(&[]), None);
    }

    #[test]
    fn policy_parses_from_config_strings() {
        assert_eq!(
            "recency_weighted".parse::<AggregationPolicy>(),
            Ok(AggregationPolicy::RecencyWeighted)
        );
        assert!("median".parse::<AggregationPolicy>().is_err());
    }

    #[test]
    fn summary_marks_pass_against_level_threshold() {
        let now = Utc::now();
        let s = completed(PathType::McqOnly, 64, Uuid::new_v4(), now);
        let summary = summarize(&s, now).unwrap();
        assert_eq!(summary.effective_score, 64);
        // mid requires 65
        assert!(!summary.passed);
    }
}
