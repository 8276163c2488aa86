use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::anti_cheat::{AntiCheatEvent, AntiCheatEventKind, AntiCheatSummary};

#[derive(Debug, Clone, Deserialize)]
pub struct RecordAntiCheatRequest {
    pub kind: AntiCheatEventKind,
    pub details: Option<JsonValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AntiCheatLog {
    pub session_id: Uuid,
    pub summary: AntiCheatSummary,
    pub events: Vec<AntiCheatEvent>,
}
