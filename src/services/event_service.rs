use crate::error::{Error, Result};
use crate::models::domain_event::DomainEvent;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const STALE_CLAIM_SECS: f64 = 300.0;

#[derive(Clone)]
pub struct EventService {
    pool: PgPool,
    client: Client,
    target_url: Option<String>,
    secret: Option<String>,
}

impl EventService {
    pub fn new(pool: PgPool, client: Client, target_url: Option<String>, secret: Option<String>) -> Self {
        Self {
            pool,
            client,
            target_url,
            secret,
        }
    }

    /// Stores an event on the given connection, so it commits with the caller's transaction.
    pub async fn enqueue(
        conn: &mut PgConnection,
        event_type: &str,
        payload: &JsonValue,
    ) -> Result<Uuid> {
        let row = sqlx::query(
            r#"INSERT INTO domain_events (event_type, payload, status)
               VALUES ($1, $2, 'pending')
               RETURNING id"#,
        )
        .bind(event_type)
        .bind(payload)
        .fetch_one(&mut *conn)
        .await?;
        let id: Uuid = row.try_get("id")?;
        tracing::debug!(event_id = %id, event_type, "domain event stored");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<DomainEvent> {
        let event = sqlx::query_as::<_, DomainEvent>(r#"SELECT * FROM domain_events WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(event)
    }

    pub async fn deliver_once(&self, event_id: Uuid) -> Result<()> {
        let Some(target_url) = self.target_url.as_deref() else {
            return Ok(());
        };
        let event = self.get(event_id).await?;
        let body = serde_json::to_vec(&event.payload)?;

        let mut request = self
            .client
            .post(target_url)
            .header("Content-Type", "application/json")
            .header("X-Event-Type", event.event_type.as_str())
            .header("X-Event-Id", event.id.to_string());
        if let Some(secret) = self.secret.as_deref() {
            request = request.header("X-Event-Signature", sign_payload(secret, &body)?);
        }

        match request.body(body).send().await {
            Ok(resp) => {
                let status = resp.status().as_u16() as i32;
                let text = resp.text().await.unwrap_or_default();
                sqlx::query(
                    r#"UPDATE domain_events
                       SET http_status = $1, response_body = $2,
                           status = CASE WHEN $1 BETWEEN 200 AND 299 THEN 'delivered' ELSE 'failed' END,
                           attempts = attempts + 1, updated_at = NOW()
                       WHERE id = $3"#,
                )
                .bind(status)
                .bind(text)
                .bind(event.id)
                .execute(&self.pool)
                .await?;
            }
            Err(err) => {
                sqlx::query(
                    r#"UPDATE domain_events
                       SET response_body = $1, status = 'failed', attempts = attempts + 1, updated_at = NOW()
                       WHERE id = $2"#,
                )
                .bind(err.to_string())
                .bind(event.id)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn run_once(&self) -> Result<bool> {
        if self.target_url.is_none() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;
        // a claim older than STALE_CLAIM_SECS belongs to a worker that died mid-delivery
        let row_opt = sqlx::query(
            r#"SELECT id FROM domain_events
               WHERE attempts < max_attempts
                 AND ((status IN ('pending', 'failed')
                       AND (next_retry_at IS NULL OR next_retry_at <= NOW()))
                      OR (status = 'delivering'
                          AND updated_at < NOW() - make_interval(secs => $1)))
               ORDER BY created_at ASC
               FOR UPDATE SKIP LOCKED
               LIMIT 1"#,
        )
        .bind(STALE_CLAIM_SECS)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row_opt else {
            tx.commit().await?;
            return Ok(false);
        };
        let id: Uuid = row.try_get("id")?;
        // claim it so other workers skip it while delivery runs
        sqlx::query(r#"UPDATE domain_events SET status = 'delivering', updated_at = NOW() WHERE id = $1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        if let Err(e) = self.deliver_once(id).await {
            tracing::error!(event_id = %id, error = ?e, "event delivery failed");
        }

        let row = sqlx::query(r#"SELECT attempts, max_attempts, status FROM domain_events WHERE id = $1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        let attempts: i32 = row.try_get("attempts")?;
        let max_attempts: i32 = row.try_get("max_attempts")?;
        let status: String = row.try_get("status")?;

        if status == "failed" && attempts < max_attempts {
            sqlx::query(
                r#"UPDATE domain_events
                   SET next_retry_at = NOW() + make_interval(secs => LEAST(3600, 30 * power(2::float, GREATEST(0, attempts - 1))::int))
                   WHERE id = $1"#,
            )
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else if status == "delivering" {
            sqlx::query(r#"UPDATE domain_events SET status = 'failed' WHERE id = $1"#)
                .bind(id)
                .execute(&self.pool)
                .await?;
        }

        Ok(true)
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Internal(format!("Invalid event signing key: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}
