use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub supports_coding: bool,
    pub supports_portfolio: bool,
    pub coding_languages: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn supports_language(&self, language: &str) -> bool {
        self.coding_languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language.trim()))
    }
}
