use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::experience::ExperienceLevel;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Freelancer {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub category_id: Option<Uuid>,
    pub skills: Vec<String>,
    pub experience_level: ExperienceLevel,
    pub is_active: bool,
    /// Account creation time, used to break ranking ties.
    pub created_at: DateTime<Utc>,
}

impl Freelancer {
    pub fn display_name(&self) -> String {
        let first = self.first_name.trim();
        match self.last_name.trim().chars().next() {
            Some(initial) => format!("{} {}.", first, initial.to_uppercase()),
            None => first.to_string(),
        }
    }
}
