use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

pub const VETTING_COMPLETED: &str = "vetting.completed";
pub const MATCH_CREATED: &str = "match.created";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub http_status: Option<i32>,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
