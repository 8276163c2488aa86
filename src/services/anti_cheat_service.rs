use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::anti_cheat_dto::AntiCheatLog;
use crate::error::{Error, Result};
use crate::models::anti_cheat::{AntiCheatEvent, AntiCheatEventKind, AntiCheatSummary};
use crate::services::identity_service::Caller;

/// Observational log of browser signals. Nothing here reads or writes scores
/// or session status.
#[derive(Clone)]
pub struct AntiCheatService {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct SessionWindow {
    freelancer_id: Uuid,
    status: crate::models::skill_test_session::SessionStatus,
    expires_at: chrono::DateTime<Utc>,
}

impl AntiCheatService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn window(&self, session_id: Uuid) -> Result<SessionWindow> {
        sqlx::query_as::<_, SessionWindow>(
            r#"SELECT freelancer_id, status, expires_at FROM skill_test_sessions WHERE id = $1"#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::UnknownReference(format!("session {} not found", session_id)))
    }

    pub async fn record(
        &self,
        caller: &Caller,
        session_id: Uuid,
        kind: AntiCheatEventKind,
        details: Option<JsonValue>,
    ) -> Result<AntiCheatEvent> {
        let window = self.window(session_id).await?;
        if window.freelancer_id != caller.user_id {
            return Err(Error::UnknownReference(format!("session {} not found", session_id)));
        }
        let now = Utc::now();
        if window.status.is_terminal() || now >= window.expires_at {
            return Err(Error::InvalidSessionState(format!(
                "session {} is no longer active",
                session_id
            )));
        }

        let event = sqlx::query_as::<_, AntiCheatEvent>(
            r#"INSERT INTO anti_cheat_events (session_id, kind, details, occurred_at)
               VALUES ($1, $2, $3, $4)
               RETURNING *"#,
        )
        .bind(session_id)
        .bind(kind)
        .bind(details)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(session_id = %session_id, kind = ?kind, "anti-cheat event recorded");
        Ok(event)
    }

    pub async fn list(&self, caller: &Caller, session_id: Uuid) -> Result<AntiCheatLog> {
        let window = self.window(session_id).await?;
        if window.freelancer_id != caller.user_id && !caller.is_staff() {
            return Err(Error::UnknownReference(format!("session {} not found", session_id)));
        }
        let events = sqlx::query_as::<_, AntiCheatEvent>(
            r#"SELECT * FROM anti_cheat_events WHERE session_id = $1 ORDER BY occurred_at ASC"#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(AntiCheatLog {
            session_id,
            summary: AntiCheatSummary::from_events(&events),
            events,
        })
    }
}
