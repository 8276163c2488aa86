mod common;

use common::database;
use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use vetting_backend::services::event_service::EventService;

async fn insert_claimed(pool: &PgPool, claimed_minutes_ago: i32) -> Uuid {
    sqlx::query_scalar(
        r#"INSERT INTO domain_events (event_type, payload, status, created_at, updated_at)
           VALUES ('vetting.completed', $1, 'delivering',
                   NOW() - INTERVAL '3650 days',
                   NOW() - make_interval(mins => $2))
           RETURNING id"#,
    )
    .bind(json!({ "event": "vetting.completed", "freelancer_id": Uuid::new_v4() }))
    .bind(claimed_minutes_ago)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn status_and_attempts(pool: &PgPool, id: Uuid) -> (String, i32) {
    sqlx::query_as(r#"SELECT status, attempts FROM domain_events WHERE id = $1"#)
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn abandoned_delivery_claims_are_picked_up_again() {
    let Some((pool, _)) = database().await else { return };
    let stale = insert_claimed(&pool, 30).await;
    let fresh = insert_claimed(&pool, 0).await;

    let idle = EventService::new(pool.clone(), Client::new(), None, None);
    assert!(!idle.run_once().await.unwrap());
    assert_eq!(status_and_attempts(&pool, stale).await, ("delivering".to_string(), 0));

    // nothing listens on the discard port, so every delivery fails fast
    let events = EventService::new(
        pool.clone(),
        Client::new(),
        Some("http://127.0.0.1:9/hooks".to_string()),
        Some("whsec_test".to_string()),
    );

    let mut rounds = 0;
    while status_and_attempts(&pool, stale).await.0 == "delivering" {
        assert!(events.run_once().await.unwrap(), "stale claim was never reclaimed");
        rounds += 1;
        assert!(rounds < 100);
    }

    let (status, attempts) = status_and_attempts(&pool, stale).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 1);
    let next_retry: Option<chrono::DateTime<chrono::Utc>> =
        sqlx::query_scalar(r#"SELECT next_retry_at FROM domain_events WHERE id = $1"#)
            .bind(stale)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert!(next_retry.is_some());

    // an in-flight claim belongs to a live worker
    assert_eq!(status_and_attempts(&pool, fresh).await, ("delivering".to_string(), 0));

    sqlx::query(r#"DELETE FROM domain_events WHERE id = ANY($1)"#)
        .bind(vec![stale, fresh])
        .execute(&pool)
        .await
        .unwrap();
}
