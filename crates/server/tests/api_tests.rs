//! HTTP API tests over the full router.

mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{harness, harness_with_config, spawn_introspection_stub};
use depot_server::create_router;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

fn json_request(method: &str, path: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn empty_catalog_list_resolves_to_client_version() {
    let h = harness().await;
    let app = create_router(h.state.clone());

    let (status, body) = send(&app, get("/api/v1/updates/list/0.0.0/0/0/0")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], "0.0.0");
    assert_eq!(body["files"], json!([]));
}

#[tokio::test]
async fn list_route_validates_parameters() {
    let h = harness().await;
    let app = create_router(h.state.clone());

    // Reserved OS index.
    let (status, body) = send(&app, get("/api/v1/updates/list/0.0.0/5/0/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    // Texture out of range.
    let (status, _) = send(&app, get("/api/v1/updates/list/0.0.0/0/9/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Malformed version.
    let (status, _) = send(&app, get("/api/v1/updates/list/1.0/0/0/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, get("/api/v1/updates/list/123.0.0/0/0/0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn servers_list_is_public() {
    let h = harness().await;
    h.state
        .catalog
        .insert_server("https://cdn-1.example.com", time::OffsetDateTime::now_utc())
        .await
        .unwrap();
    let app = create_router(h.state.clone());

    let (status, body) = send(&app, get("/api/v1/updates/servers/list")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["servers"], json!(["https://cdn-1.example.com"]));
}

#[tokio::test]
async fn manager_routes_require_authentication() {
    let h = harness().await;
    let app = create_router(h.state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/updates/manager/version/create",
            json!({"type": 0, "description": "v1"}),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(&app, get("/api/v1/updates/manager/version/list")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn viewer_token_cannot_write() {
    let auth = spawn_introspection_stub(true, "update:view").await;
    let h = harness_with_config(|config| config.auth = Some(auth.clone())).await;
    let app = create_router(h.state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/updates/manager/version/create",
            json!({"type": 0, "description": "v1"}),
            Some("viewer-token"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    // But reads work.
    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/api/v1/updates/manager/version/list?page=0&size=10")
            .header(header::AUTHORIZATION, "Bearer viewer-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn inactive_token_is_unauthorized() {
    let auth = spawn_introspection_stub(false, "update:edit").await;
    let h = harness_with_config(|config| config.auth = Some(auth.clone())).await;
    let app = create_router(h.state.clone());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/updates/manager/version/create",
            json!({"type": 0, "description": "v1"}),
            Some("expired-token"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_fetch_and_sequential_bumps() {
    let auth = spawn_introspection_stub(true, "update:edit update:view").await;
    let h = harness_with_config(|config| config.auth = Some(auth.clone())).await;
    let app = create_router(h.state.clone());

    // Fresh create in an empty catalog: 1.0.0 in PENDING with no files.
    let (status, created) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/updates/manager/version/create",
            json!({"type": 0, "description": "v1"}),
            Some("editor-token"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["version"], "1.0.0");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = send(
        &app,
        Request::builder()
            .uri(format!("/api/v1/updates/manager/version/fetch/{id}"))
            .header(header::AUTHORIZATION, "Bearer editor-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["version"], "1.0.0");
    assert_eq!(fetched["state"], "pending");
    assert_eq!(fetched["filesCount"], 0);

    // Sequential revision bumps.
    for expected in ["1.0.1", "1.0.2"] {
        let (status, body) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/updates/manager/version/create",
                json!({"type": 2, "description": "bump"}),
                Some("editor-token"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["version"], expected);
    }

    // Edit round-trips.
    let (status, edited) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/updates/manager/version/edit",
            json!({"id": id, "description": "first release"}),
            Some("editor-token"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["success"], true);
}

#[tokio::test]
async fn create_version_validates_body() {
    let auth = spawn_introspection_stub(true, "update:edit").await;
    let h = harness_with_config(|config| config.auth = Some(auth.clone())).await;
    let app = create_router(h.state.clone());

    for body in [
        json!({"type": 3, "description": "v"}),
        json!({"type": 0, "description": ""}),
        json!({"type": 0, "description": "x".repeat(257)}),
    ] {
        let (status, response) = send(
            &app,
            json_request(
                "POST",
                "/api/v1/updates/manager/version/create",
                body,
                Some("editor-token"),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {response}");
    }
}

#[tokio::test]
async fn list_versions_validates_page_size() {
    let auth = spawn_introspection_stub(true, "update:view").await;
    let h = harness_with_config(|config| config.auth = Some(auth.clone())).await;
    let app = create_router(h.state.clone());

    for size in [3, 51] {
        let (status, _) = send(
            &app,
            Request::builder()
                .uri(format!("/api/v1/updates/manager/version/list?page=0&size={size}"))
                .header(header::AUTHORIZATION, "Bearer viewer-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
