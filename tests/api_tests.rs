//! API integration tests

use axum::body::Body;
use axum::Router;
use guard_staging::staging::actor::{ROLE_HEADER, USER_HEADER};
use guard_staging::staging::StagingSettings;
use guard_staging::store::Store;
use guard_staging::{api, AppState};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

const BASE: &str = "/api/v1/staging";

async fn setup_app() -> Router {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Store::new(pool.clone())
        .run_migrations()
        .await
        .expect("Failed to run migrations");

    api::router(AppState::new(pool, StagingSettings::default()))
}

fn request(
    method: &str,
    uri: &str,
    user: Option<(&str, &str)>,
    body: Option<Value>,
) -> hyper::Request<Body> {
    let mut builder = hyper::Request::builder().method(method).uri(uri);
    if let Some((user, role)) = user {
        builder = builder.header(USER_HEADER, user).header(ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: hyper::Request<Body>) -> (hyper::StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

const ADMIN: Option<(&str, &str)> = Some(("root", "system_admin"));
const ALICE: Option<(&str, &str)> = Some(("alice", "annotator"));
const AUDITOR: Option<(&str, &str)> = Some(("eve", "auditor"));

async fn seed(app: &Router, kind: &str, count: u32) {
    let (status, body) = send(
        app,
        request(
            "POST",
            &format!("{}/proposals/{}/import-mock?count={}", BASE, kind, count),
            ADMIN,
            None,
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CREATED);
    assert_eq!(body["created_count"], count);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup_app().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body, Value::String("ok".into()));
}

#[tokio::test]
async fn test_missing_identity_is_unauthenticated() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request("GET", &format!("{}/overview?task_type=keywords", BASE), None, None),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn test_annotator_cannot_import_or_sync() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request("POST", &format!("{}/proposals/keywords/import-mock", BASE), ALICE, None),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _) = send(
        &app,
        request("POST", &format!("{}/proposals/rules/sync-all", BASE), ALICE, None),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_claim_review_sync_flow() {
    let app = setup_app().await;
    seed(&app, "keywords", 5).await;

    let (status, claim) = send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "keywords", "batch_size": 2})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(claim["claimed_count"], 2);
    assert_eq!(claim["timeout_minutes"], 30);
    let id = claim["claimed_ids"][0].as_str().unwrap().to_string();
    let other = claim["claimed_ids"][1].as_str().unwrap().to_string();

    let (status, reviewed) = send(
        &app,
        request(
            "PATCH",
            &format!("{}/proposals/keywords/{}", BASE, id),
            ALICE,
            Some(json!({"status": "REVIEWED", "final_tag": "X", "final_risk": "Low"})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(reviewed["status"], "REVIEWED");
    assert_eq!(reviewed["final_tag"], "X");
    assert_eq!(reviewed["is_modified"], true);
    assert_eq!(reviewed["annotator"], "alice");

    let (status, body) = send(
        &app,
        request(
            "PATCH",
            &format!("{}/proposals/keywords/{}", BASE, id),
            ALICE,
            Some(json!({"status": "IGNORED"})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "invalid_state");

    let (status, synced) = send(
        &app,
        request(
            "POST",
            &format!("{}/proposals/keywords/sync", BASE),
            ADMIN,
            Some(json!({"ids": [id, other]})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(synced["synced_count"], 1);
    assert_eq!(synced["skipped_count"], 1);

    let (status, overview) = send(
        &app,
        request("GET", &format!("{}/overview?task_type=keyword", BASE), ALICE, None),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(overview["pending_count"], 3);
    assert_eq!(overview["claimed_count"], 1);
    assert_eq!(overview["synced_count"], 1);
    assert_eq!(overview["total_count"], 5);
}

#[tokio::test]
async fn test_claim_rejects_zero_batch() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "rules", "batch_size": 0})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_listing_visibility() {
    let app = setup_app().await;
    seed(&app, "rules", 4).await;

    send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "rules", "batch_size": 1})),
        ),
    )
    .await;

    let (_, mine) = send(
        &app,
        request("GET", &format!("{}/proposals/rules", BASE), ALICE, None),
    )
    .await;
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["claimed_by"], "alice");
    assert_eq!(mine[0]["kind"], "rule");

    let (_, all) = send(
        &app,
        request("GET", &format!("{}/proposals/rules", BASE), AUDITOR, None),
    )
    .await;
    assert_eq!(all.as_array().unwrap().len(), 4);

    let (_, pending) = send(
        &app,
        request(
            "GET",
            &format!("{}/proposals/rules?status=PENDING&limit=2", BASE),
            AUDITOR,
            None,
        ),
    )
    .await;
    assert_eq!(pending.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_delete_and_get_not_found() {
    let app = setup_app().await;
    seed(&app, "keywords", 1).await;

    let (_, claim) = send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "keywords"})),
        ),
    )
    .await;
    let id = claim["claimed_ids"][0].as_str().unwrap().to_string();
    let uri = format!("{}/proposals/keywords/{}", BASE, id);

    let (status, _) = send(&app, request("DELETE", &uri, ALICE, None)).await;
    assert_eq!(status, hyper::StatusCode::CONFLICT);

    send(
        &app,
        request("PATCH", &uri, ALICE, Some(json!({"status": "IGNORED"}))),
    )
    .await;
    let (status, _) = send(&app, request("DELETE", &uri, ALICE, None)).await;
    assert_eq!(status, hyper::StatusCode::NO_CONTENT);

    let (status, body) = send(&app, request("GET", &uri, ALICE, None)).await;
    assert_eq!(status, hyper::StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_batch_review_and_stats() {
    let app = setup_app().await;
    seed(&app, "keywords", 3).await;

    let (_, claim) = send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "keywords", "batch_size": 3})),
        ),
    )
    .await;
    let ids: Vec<Value> = claim["claimed_ids"].as_array().unwrap().clone();

    let (status, outcome) = send(
        &app,
        request(
            "POST",
            &format!("{}/proposals/keywords/batch-review", BASE),
            ALICE,
            Some(json!({"items": [
                {"id": ids[0], "status": "REVIEWED"},
                {"id": ids[1], "status": "IGNORED"},
                {"id": uuid::Uuid::new_v4(), "status": "REVIEWED"},
            ]})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(outcome["success_count"], 2);
    assert_eq!(outcome["failed_count"], 1);

    let (_, mine) = send(
        &app,
        request("GET", &format!("{}/my-tasks/stats?task_type=keywords", BASE), ALICE, None),
    )
    .await;
    assert_eq!(mine["claimed_count"], 1);
    assert_eq!(mine["reviewed_count"], 1);
    assert_eq!(mine["ignored_count"], 1);

    let (_, annotators) = send(
        &app,
        request(
            "GET",
            &format!("{}/stats/annotators?task_type=keywords", BASE),
            AUDITOR,
            None,
        ),
    )
    .await;
    assert_eq!(annotators[0]["annotator"], "alice");
    assert_eq!(annotators[0]["total_count"], 2);
}

#[tokio::test]
async fn test_release_expired_endpoint() {
    let app = setup_app().await;
    let (status, body) = send(
        &app,
        request("POST", &format!("{}/release-expired", BASE), AUDITOR, None),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(body, json!({"released_keywords": 0, "released_rules": 0}));
}

#[tokio::test]
async fn test_rule_review_corrects_condition() {
    let app = setup_app().await;
    seed(&app, "rules", 1).await;

    let (_, claim) = send(
        &app,
        request(
            "POST",
            &format!("{}/claim", BASE),
            ALICE,
            Some(json!({"task_type": "rules"})),
        ),
    )
    .await;
    let id = claim["claimed_ids"][0].as_str().unwrap().to_string();

    let (status, reviewed) = send(
        &app,
        request(
            "PATCH",
            &format!("{}/proposals/rules/{}", BASE, id),
            ALICE,
            Some(json!({"status": "REVIEWED", "final_strategy": "PASS", "extra_condition": "safe"})),
        ),
    )
    .await;
    assert_eq!(status, hyper::StatusCode::OK);
    assert_eq!(reviewed["final_strategy"], "PASS");
    assert_eq!(reviewed["final_extra_condition"], "safe");
}
