use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "anti_cheat_event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AntiCheatEventKind {
    TabSwitch,
    PasteBlocked,
    FullscreenExited,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AntiCheatEvent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: AntiCheatEventKind,
    pub details: Option<JsonValue>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AntiCheatSummary {
    pub tab_switches: usize,
    pub pastes_blocked: usize,
    pub fullscreen_exits: usize,
    pub total: usize,
}

impl AntiCheatSummary {
    pub fn from_events(events: &[AntiCheatEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            match event.kind {
                AntiCheatEventKind::TabSwitch => summary.tab_switches += 1,
                AntiCheatEventKind::PasteBlocked => summary.pastes_blocked += 1,
                AntiCheatEventKind::FullscreenExited => summary.fullscreen_exits += 1,
            }
            summary.total += 1;
        }
        summary
    }
}
