use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::Result;
use crate::models::category::Category;
use crate::models::experience::ExperienceLevel;
use crate::models::question::{CodingPrompt, CodingPromptDraft, McqDraft, McqQuestion};
use crate::services::ai_service::{GenerationRequest, QuestionGenerator};
use crate::services::complexity_service::resolve_complexity;

#[derive(Clone)]
pub struct PoolService {
    pool: PgPool,
    generator: Arc<dyn QuestionGenerator>,
    mcq_min_size: usize,
    coding_min_size: usize,
}

impl PoolService {
    pub fn new(
        pool: PgPool,
        generator: Arc<dyn QuestionGenerator>,
        mcq_min_size: usize,
        coding_min_size: usize,
    ) -> Self {
        Self {
            pool,
            generator,
            mcq_min_size,
            coding_min_size,
        }
    }

    pub async fn ensure_mcq_pool(
        &self,
        category: &Category,
        level: ExperienceLevel,
    ) -> Result<Vec<Uuid>> {
        let existing = self.mcq_ids(category.id, level).await?;
        if existing.len() >= self.mcq_min_size {
            return Ok(existing);
        }

        let deficit = self.mcq_min_size - existing.len();
        let request = generation_request(category, level, None, deficit);
        match self.generator.generate_mcqs(&request).await {
            Ok(drafts) if !drafts.is_empty() => {
                let inserted = self.insert_mcqs(category.id, level, drafts).await?;
                tracing::info!(
                    category_id = %category.id,
                    level = level.as_str(),
                    inserted,
                    "MCQ pool topped up"
                );
            }
            Ok(_) => tracing::warn!(
                category_id = %category.id,
                level = level.as_str(),
                available = existing.len(),
                "generator returned no MCQs, using existing pool"
            ),
            Err(e) => tracing::warn!(
                category_id = %category.id,
                level = level.as_str(),
                available = existing.len(),
                error = %e,
                "MCQ generation failed, using existing pool"
            ),
        }

        self.mcq_ids(category.id, level).await
    }

    pub async fn ensure_coding_pool(
        &self,
        category: &Category,
        level: ExperienceLevel,
        language: &str,
    ) -> Result<Vec<Uuid>> {
        let language = normalize_language(language);
        let existing = self.prompt_ids(category.id, level, &language).await?;
        if existing.len() >= self.coding_min_size {
            return Ok(existing);
        }

        let deficit = self.coding_min_size - existing.len();
        let request = generation_request(category, level, Some(language.clone()), deficit);
        match self.generator.generate_coding_prompts(&request).await {
            Ok(drafts) if !drafts.is_empty() => {
                let inserted = self.insert_prompts(category.id, level, &language, drafts).await?;
                tracing::info!(
                    category_id = %category.id,
                    level = level.as_str(),
                    language = %language,
                    inserted,
                    "coding pool topped up"
                );
            }
            Ok(_) => tracing::warn!(
                category_id = %category.id,
                language = %language,
                available = existing.len(),
                "generator returned no coding prompts, using existing pool"
            ),
            Err(e) => tracing::warn!(
                category_id = %category.id,
                language = %language,
                available = existing.len(),
                error = %e,
                "coding prompt generation failed, using existing pool"
            ),
        }

        self.prompt_ids(category.id, level, &language).await
    }

    async fn mcq_ids(&self, category_id: Uuid, level: ExperienceLevel) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT id FROM mcq_questions
               WHERE category_id = $1 AND experience_level = $2
               ORDER BY rotation_index ASC"#,
        )
        .bind(category_id)
        .bind(level)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn prompt_ids(
        &self,
        category_id: Uuid,
        level: ExperienceLevel,
        language: &str,
    ) -> Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"SELECT id FROM coding_prompts
               WHERE category_id = $1 AND experience_level = $2 AND language = $3
               ORDER BY rotation_index ASC"#,
        )
        .bind(category_id)
        .bind(level)
        .bind(language)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn insert_mcqs(
        &self,
        category_id: Uuid,
        level: ExperienceLevel,
        drafts: Vec<McqDraft>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        lock_key(&mut *tx, &format!("mcq:{}:{}", category_id, level.as_str())).await?;

        let (count, max_index): (i64, Option<i32>) = sqlx::query_as(
            r#"SELECT COUNT(*), MAX(rotation_index) FROM mcq_questions
               WHERE category_id = $1 AND experience_level = $2"#,
        )
        .bind(category_id)
        .bind(level)
        .fetch_one(&mut *tx)
        .await?;

        // another writer may have filled the key while we were generating
        let room = self.mcq_min_size.saturating_sub(count as usize);
        let mut next = max_index.map(|i| i + 1).unwrap_or(0);
        let mut inserted = 0;
        for draft in drafts.into_iter().take(room) {
            sqlx::query(
                r#"INSERT INTO mcq_questions
                   (category_id, experience_level, rotation_index, question, options, correct_option_index, explanation)
                   VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
            )
            .bind(category_id)
            .bind(level)
            .bind(next)
            .bind(&draft.question)
            .bind(sqlx::types::Json(&draft.options))
            .bind(draft.correct_option_index)
            .bind(&draft.explanation)
            .execute(&mut *tx)
            .await?;
            next += 1;
            inserted += 1;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn insert_prompts(
        &self,
        category_id: Uuid,
        level: ExperienceLevel,
        language: &str,
        drafts: Vec<CodingPromptDraft>,
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        lock_key(
            &mut *tx,
            &format!("coding:{}:{}:{}", category_id, level.as_str(), language),
        )
        .await?;

        let (count, max_index): (i64, Option<i32>) = sqlx::query_as(
            r#"SELECT COUNT(*), MAX(rotation_index) FROM coding_prompts
               WHERE category_id = $1 AND experience_level = $2 AND language = $3"#,
        )
        .bind(category_id)
        .bind(level)
        .bind(language)
        .fetch_one(&mut *tx)
        .await?;

        let room = self.coding_min_size.saturating_sub(count as usize);
        let mut next = max_index.map(|i| i + 1).unwrap_or(0);
        let mut inserted = 0;
        for draft in drafts.into_iter().take(room) {
            sqlx::query(
                r#"INSERT INTO coding_prompts
                   (category_id, experience_level, language, rotation_index, title, description, starter_code, test_cases)
                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
            )
            .bind(category_id)
            .bind(level)
            .bind(language)
            .bind(next)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(&draft.starter_code)
            .bind(sqlx::types::Json(&draft.test_cases))
            .execute(&mut *tx)
            .await?;
            next += 1;
            inserted += 1;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

fn generation_request(
    category: &Category,
    level: ExperienceLevel,
    language: Option<String>,
    count: usize,
) -> GenerationRequest {
    let complexity = resolve_complexity(level);
    GenerationRequest {
        category_id: category.id,
        category_name: category.name.clone(),
        experience_level: level,
        difficulty: complexity.difficulty_tier,
        coding_tier: complexity.coding_tier,
        language,
        count,
    }
}

async fn lock_key(conn: &mut PgConnection, key: &str) -> Result<()> {
    sqlx::query(r#"SELECT pg_advisory_xact_lock(hashtext($1))"#)
        .bind(key)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

pub fn select_subset<R: Rng + ?Sized>(ids: &[Uuid], count: usize, rng: &mut R) -> Vec<Uuid> {
    let mut picked: Vec<Uuid> = ids
        .choose_multiple(rng, count.min(ids.len()))
        .copied()
        .collect();
    picked.shuffle(rng);
    picked
}

pub async fn load_mcqs(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<McqQuestion>> {
    let rows = sqlx::query_as::<_, McqQuestion>(r#"SELECT * FROM mcq_questions WHERE id = ANY($1)"#)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    Ok(in_order(ids, rows, |q| q.id))
}

pub async fn load_prompts(conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<CodingPrompt>> {
    let rows =
        sqlx::query_as::<_, CodingPrompt>(r#"SELECT * FROM coding_prompts WHERE id = ANY($1)"#)
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
    Ok(in_order(ids, rows, |p| p.id))
}

fn in_order<T>(ids: &[Uuid], rows: Vec<T>, key: impl Fn(&T) -> Uuid) -> Vec<T> {
    let mut by_id: HashMap<Uuid, T> = rows.into_iter().map(|r| (key(&r), r)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
