use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::experience::ExperienceLevel;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: String,
    pub category_id: Uuid,
    pub required_skills: Vec<String>,
    pub min_experience_level: Option<ExperienceLevel>,
    pub created_at: DateTime<Utc>,
}
