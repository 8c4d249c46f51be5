use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use boxdesk::api::{build_router, metrics, AppState, NO_RESERVATIONS};
use boxdesk::db::Database;
use boxdesk::interfaces::assistant::AssistantBackend;
use boxdesk::providers::openai::OpenAiAssistantClient;
use boxdesk::tools::absences::NO_UPCOMING_ABSENCES;
use boxdesk::tools::booking::NO_UPCOMING_RESERVATIONS;

async fn app(server: &MockServer) -> (TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("api.db").to_str().unwrap())
        .await
        .unwrap();
    let backend: Arc<dyn AssistantBackend> = Arc::new(
        OpenAiAssistantClient::new("sk-test", Some(server.base_url()), None).unwrap(),
    );
    let state = AppState::new(db, backend, "asst_1").await;
    (dir, build_router(state))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn root_and_health() {
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "boxdesk API online" }));

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "database": "ok" }));
}

#[tokio::test]
async fn empty_lists_keep_their_shapes() {
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    let (_, body) = call(&app, "GET", "/reservations", None).await;
    assert_eq!(body, json!([{ "message": NO_RESERVATIONS }]));
    let (_, body) = call(&app, "GET", "/list_reservations", None).await;
    assert_eq!(body, json!([{ "message": NO_UPCOMING_RESERVATIONS }]));
    let (_, body) = call(&app, "GET", "/list_absences", None).await;
    assert_eq!(body, json!([{ "message": NO_UPCOMING_ABSENCES }]));
    let (status, body) = call(&app, "GET", "/absences", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn booking_and_updating_reservations() {
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/book_box",
        Some(json!({ "date": "2099-01-05", "hour": "9:15" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("done"));

    let (_, body) = call(&app, "GET", "/reservations", None).await;
    assert_eq!(
        body,
        json!([{ "id": 1, "date": "2099-01-05", "hour": "09:15", "reserved_by": "Agent" }])
    );
    let (_, body) = call(&app, "GET", "/list_reservations", None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app,
        "PUT",
        "/update_reservation?res_id=1&hour=11:00&reserved_by=Ana",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Reservation updated" }));
    let (_, body) = call(&app, "GET", "/reservations", None).await;
    assert_eq!(body[0]["hour"], "11:00");
    assert_eq!(body[0]["reserved_by"], "Ana");

    let (status, body) = call(&app, "PUT", "/update_reservation?res_id=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("no update"));

    let (status, _) = call(&app, "PUT", "/update_reservation?res_id=9&hour=10:00", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_booking_input_is_a_client_error() {
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/book_box",
        Some(json!({ "date": "05/01/2099", "hour": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("YYYY-MM-DD"));

    let (status, _) = call(
        &app,
        "POST",
        "/book_box",
        Some(json!({ "date": "2099-01-05", "hour": "noon" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "POST", "/book_box", Some(json!({ "date": "2099-01-05" }))).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn absences_round_through_the_api() {
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/report_absence",
        Some(json!({ "name": "Zoe", "date": "2099-03-02" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("done"));

    let (_, body) = call(&app, "GET", "/absences", None).await;
    assert_eq!(body, json!([{ "id": 1, "name": "Zoe", "date": "2099-03-02" }]));
    let (_, body) = call(&app, "GET", "/list_absences", None).await;
    assert_eq!(body[0]["name"], "Zoe");

    let (status, body) = call(&app, "PUT", "/update_absence?abs_id=1&date=2099-03-09", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Absence updated" }));

    let (status, _) = call(&app, "PUT", "/update_absence?abs_id=5&name=x", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "PUT", "/update_absence?abs_id=1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ask_agent_answers_through_the_assistant() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/threads");
            then.status(200).json_body(json!({ "id": "thread_api" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/threads/thread_api/runs");
            then.status(200).json_body(json!({ "data": [] }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/threads/thread_api/messages");
            then.status(200).json_body(json!({ "id": "m1" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/threads/thread_api/runs");
            then.status(200).json_body(json!({ "id": "run", "status": "completed" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/threads/thread_api/messages");
            then.status(200).json_body(json!({
                "data": [{
                    "id": "m2",
                    "role": "assistant",
                    "content": [{ "type": "text", "text": { "value": "Hi there" } }]
                }]
            }));
        })
        .await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/ask_agent",
        Some(json!({ "message": "hello", "user_id": "u1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "response": "Hi there", "thread_id": "thread_api", "turn_id": "m2" })
    );

    let (status, _) = call(
        &app,
        "POST",
        "/ask_agent",
        Some(json!({ "message": "hello", "user_id": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assistant_outage_is_a_bad_gateway() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/threads");
            then.status(401).json_body(json!({ "error": { "message": "bad key" } }));
        })
        .await;
    let (_dir, app) = app(&server).await;

    let (status, body) = call(
        &app,
        "POST",
        "/ask_agent",
        Some(json!({ "message": "hello", "user_id": "u1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["detail"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn metrics_count_requests_by_status_class() {
    metrics::init_metrics();
    let server = MockServer::start_async().await;
    let (_dir, app) = app(&server).await;

    call(&app, "GET", "/health", None).await;
    call(&app, "PUT", "/update_absence?abs_id=77&name=x", None).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(metrics::HTTP_REQUESTS_TOTAL));
    assert!(text.contains("handler=\"/health\""));
    assert!(text.contains("status=\"4xx\""));
}
