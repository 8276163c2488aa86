mod common;

use axum::http::StatusCode;
use common::{
    bearer, database, db_app, generator_with_mcqs, generator_with_mcqs_and_prompts, mcq_answers,
    seed_category, seed_freelancer, seed_user, send, start_session,
};
use serde_json::json;
use sqlx::PgPool;
use tokio::task::JoinSet;
use uuid::Uuid;
use vetting_backend::models::user::Role;

async fn push_past_deadline(pool: &PgPool, session_id: &str) {
    sqlx::query(
        r#"UPDATE skill_test_sessions
           SET started_at = NOW() - INTERVAL '31 minutes', expires_at = NOW() - INTERVAL '1 minute'
           WHERE id = $1"#,
    )
    .bind(Uuid::parse_str(session_id).unwrap())
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn coding_path_averages_mcq_and_pass_ratio() {
    let Some((pool, url)) = database().await else { return };
    let app = db_app(&pool, &url, generator_with_mcqs_and_prompts());

    let category_id = seed_category(&pool).await;
    let freelancer_id = seed_freelancer(&pool, category_id).await;
    let freelancer = bearer(freelancer_id, Role::Freelancer);

    let session = start_session(
        &app,
        &freelancer,
        category_id,
        json!({ "path_type": "coding_mcq", "language": "Rust" }),
    )
    .await;
    assert_eq!(session["selected_language"], "rust");
    assert_eq!(session["mcq_questions"].as_array().map(Vec::len), Some(5));
    let prompts = session["coding_prompts"].as_array().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(!session.to_string().contains("cba"));
    let prompt_id = prompts[0]["id"].clone();

    let session_id = session["id"].as_str().unwrap();
    let base = format!("/api/sessions/{}", session_id);

    // one wrong answer out of five
    let (status, after_mcq) = send(
        &app,
        "POST",
        &format!("{}/mcq", base),
        Some(freelancer.as_str()),
        Some(mcq_answers(&session, 1)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", after_mcq);
    assert_eq!(after_mcq["status"], "coding");
    assert_eq!(after_mcq["mcq_score"], 80);

    let runs = format!("{}/coding-runs", base);
    let (status, body) = send(
        &app,
        "POST",
        &runs,
        Some(freelancer.as_str()),
        Some(json!({ "prompt_id": Uuid::new_v4(), "passed": 1, "total": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "unknown_reference");

    for (passed, total) in [(3, 5), (4, 5)] {
        let (status, body) = send(
            &app,
            "POST",
            &runs,
            Some(freelancer.as_str()),
            Some(json!({ "prompt_id": prompt_id, "passed": passed, "total": total })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (status, done) = send(&app, "POST", &format!("{}/complete", base), Some(freelancer.as_str()), None).await;
    assert_eq!(status, StatusCode::OK, "{}", done);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["coding_score"], 70);
    assert_eq!(done["effective_score"], 75);
    assert_eq!(done["coding_submissions"].as_array().map(Vec::len), Some(2));

    let (status, vetting) = send(&app, "GET", "/api/vetting/me", Some(freelancer.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(vetting["overall_score"], 75);
    assert_eq!(vetting["status"], "approved");
    let assessments = vetting["skill_assessments"].as_array().unwrap();
    assert_eq!(assessments.len(), 1);
    assert_eq!(assessments[0]["coding_score"], 70);
    assert_eq!(assessments[0]["mcq_score"], 80);
    assert_eq!(assessments[0]["effective_score"], 75);

    // completing twice is a state error, not a second fold
    let (status, _) = send(&app, "POST", &format!("{}/complete", base), Some(freelancer.as_str()), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn portfolio_path_is_scored_by_staff_review() {
    let Some((pool, url)) = database().await else { return };
    let app = db_app(&pool, &url, generator_with_mcqs());

    let category_id = seed_category(&pool).await;
    let freelancer_id = seed_freelancer(&pool, category_id).await;
    let freelancer = bearer(freelancer_id, Role::Freelancer);
    let moderator = bearer(seed_user(&pool, Role::Moderator).await, Role::Moderator);

    let session = start_session(&app, &freelancer, category_id, json!({ "path_type": "portfolio_mcq" })).await;
    let base = format!("/api/sessions/{}", session["id"].as_str().unwrap());

    let (status, after_mcq) = send(
        &app,
        "POST",
        &format!("{}/mcq", base),
        Some(freelancer.as_str()),
        Some(mcq_answers(&session, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", after_mcq);
    assert_eq!(after_mcq["status"], "portfolio_review");
    assert!(after_mcq["effective_score"].is_null());

    let (status, linked) = send(
        &app,
        "POST",
        &format!("{}/portfolio", base),
        Some(freelancer.as_str()),
        Some(json!({ "portfolio_url": "https://github.com/jane-doe" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", linked);
    assert_eq!(linked["portfolio_url"], "https://github.com/jane-doe");

    let review = format!("{}/portfolio-review", base);
    let (status, body) = send(
        &app,
        "POST",
        &review,
        Some(freelancer.as_str()),
        Some(json!({ "portfolio_score": 100 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not_authorized");

    let (status, reviewed) = send(
        &app,
        "POST",
        &review,
        Some(moderator.as_str()),
        Some(json!({ "portfolio_score": 70, "notes": "solid repos" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", reviewed);
    assert_eq!(reviewed["status"], "completed");
    assert_eq!(reviewed["portfolio_score"], 70);
    // 0.3 * 70 + 0.7 * 100
    assert_eq!(reviewed["effective_score"], 91);

    let (_, vetting) = send(&app, "GET", "/api/vetting/me", Some(freelancer.as_str()), None).await;
    assert_eq!(vetting["overall_score"], 91);
    assert_eq!(vetting["skill_assessments"][0]["portfolio_score"], 70);

    // a second attempt that runs out of time before review
    let late = start_session(&app, &freelancer, category_id, json!({ "path_type": "portfolio_mcq" })).await;
    let late_id = late["id"].as_str().unwrap();
    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/sessions/{}/mcq", late_id),
        Some(freelancer.as_str()),
        Some(mcq_answers(&late, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    push_past_deadline(&pool, late_id).await;

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/sessions/{}/portfolio-review", late_id),
        Some(moderator.as_str()),
        Some(json!({ "portfolio_score": 90 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_session_state");

    let (_, vetting) = send(&app, "GET", "/api/vetting/me", Some(freelancer.as_str()), None).await;
    assert_eq!(vetting["overall_score"], 91);
}

#[tokio::test]
async fn concurrent_coding_runs_are_all_kept() {
    const RUNS: usize = 8;

    let Some((pool, url)) = database().await else { return };
    let app = db_app(&pool, &url, generator_with_mcqs_and_prompts());

    let category_id = seed_category(&pool).await;
    let freelancer_id = seed_freelancer(&pool, category_id).await;
    let freelancer = bearer(freelancer_id, Role::Freelancer);

    let session = start_session(
        &app,
        &freelancer,
        category_id,
        json!({ "path_type": "coding_mcq", "language": "rust" }),
    )
    .await;
    let session_id = Uuid::parse_str(session["id"].as_str().unwrap()).unwrap();
    let prompt_id = session["coding_prompts"][0]["id"].clone();

    let (status, _) = send(
        &app,
        "POST",
        &format!("/api/sessions/{}/mcq", session_id),
        Some(freelancer.as_str()),
        Some(mcq_answers(&session, 0)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut tasks = JoinSet::new();
    for i in 0..RUNS {
        let app = app.clone();
        let auth = freelancer.clone();
        let body = json!({ "prompt_id": prompt_id, "passed": i, "total": RUNS });
        let uri = format!("/api/sessions/{}/coding-runs", session_id);
        tasks.spawn(async move { send(&app, "POST", &uri, Some(auth.as_str()), Some(body)).await });
    }
    while let Some(joined) = tasks.join_next().await {
        let (status, body) = joined.unwrap();
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    let (version, runs): (i32, i64) = sqlx::query_as(
        r#"SELECT version, jsonb_array_length(coding_submissions)::bigint
           FROM skill_test_sessions WHERE id = $1"#,
    )
    .bind(session_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(runs, RUNS as i64);
    // one write for the MCQ stage, one per run
    assert_eq!(version, RUNS as i32 + 1);

    let passed: Vec<i64> = sqlx::query_scalar(
        r#"SELECT (run->'run_result'->>'passed')::bigint
           FROM skill_test_sessions, jsonb_array_elements(coding_submissions) AS run
           WHERE id = $1
           ORDER BY 1"#,
    )
    .bind(session_id)
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(passed, (0..RUNS as i64).collect::<Vec<_>>());
}
