// Device routes against a wiremock upstream: listing, variant checks,
// and the action error classification.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vivint_gateway::kv::vivint_refresh_key;
use vivint_gateway::{app, AppState, SessionStore, Settings};

fn fresh_id_token() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({ "exp": exp })).unwrap());
    format!("{header}.{payload}.sig")
}

/// Mock the whole read path and mint an access token directly.
async fn authed_setup(server: &MockServer) -> (AppState, Router, String) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "upstream-access",
            "refresh_token": "upstream-rt",
            "id_token": fresh_id_token(),
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/authuser"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "u": [{
                "_id": "abc", "n": "Jane", "mbc": "chan",
                "system": [{ "panid": 123, "sn": "Home", "ad": true }]
            }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/systems/123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "system": {
                "panid": 123,
                "par": [{
                    "panid": 123, "parid": 1, "s": 0,
                    "d": [
                        { "_id": 7, "panid": 123, "t": "door_lock_device", "n": "Front", "s": true, "ol": true },
                        { "_id": 11, "panid": 123, "t": "multilevel_switch_device", "n": "Dimmer", "s": true, "val": 40 },
                        { "_id": 42, "panid": 123, "t": "camera_device", "n": "Porch",
                          "act": "vivint_dbc350_camera_device", "ol": true }
                    ]
                }],
                "u": []
            }
        })))
        .mount(server)
        .await;

    let settings = Settings {
        server_secret: "test-secret".into(),
        upstream_api_url: Some(format!("{}/api", server.uri())),
        upstream_auth_url: Some(server.uri()),
        ..Settings::default()
    };
    let state = AppState::new(settings, SessionStore::memory());

    state
        .kv
        .set(&vivint_refresh_key("jane"), "upstream-rt", None)
        .await
        .unwrap();
    let access = state.tokens.issue_access("jane", "upstream-rt").unwrap();

    let router = app(state.clone());
    (state, router, access)
}

async fn request(
    router: &Router,
    method_: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method_)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
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
async fn list_devices_returns_all_variants() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    let (status, body) = request(&router, "GET", "/systems/123/devices", &access, None).await;
    assert_eq!(status, StatusCode::OK);
    let devices = body.as_array().unwrap();
    assert_eq!(devices.len(), 3);

    let lock = devices.iter().find(|d| d["id"] == 7).unwrap();
    assert_eq!(lock["is_locked"], json!(true));
    let dimmer = devices.iter().find(|d| d["id"] == 11).unwrap();
    assert_eq!(dimmer["level"], 40);
    let camera = devices.iter().find(|d| d["id"] == 42).unwrap();
    assert_eq!(camera["manufacturer"], "Vivint");
}

#[tokio::test]
async fn device_details_and_not_found() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    let (status, body) =
        request(&router, "GET", "/systems/123/devices/7", &access, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device_type"], "door_lock_device");

    let (status, _) =
        request(&router, "GET", "/systems/123/devices/555", &access, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(&router, "GET", "/systems/999/devices", &access, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn action_on_wrong_variant_is_a_bad_request() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    // Locking a camera makes no sense.
    let (status, body) = request(
        &router,
        "POST",
        "/systems/123/devices/42/lock",
        &access,
        Some(json!({ "locked": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("not a door lock"));
}

#[tokio::test]
async fn upstream_business_error_maps_to_400() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/locks/7"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "lock is jammed" })),
        )
        .mount(&server)
        .await;

    let (status, body) = request(
        &router,
        "POST",
        "/systems/123/devices/7/lock",
        &access,
        Some(json!({ "locked": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "lock is jammed");
}

#[tokio::test]
async fn upstream_transport_error_maps_to_502() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/locks/7"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (status, _) = request(
        &router,
        "POST",
        "/systems/123/devices/7/lock",
        &access,
        Some(json!({ "locked": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn successful_lock_action_returns_the_device() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/locks/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let (status, body) = request(
        &router,
        "POST",
        "/systems/123/devices/7/lock",
        &access,
        Some(json!({ "locked": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 7);
}

#[tokio::test]
async fn switch_level_requires_a_multilevel_switch() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    // The door lock is not a dimmer.
    let (status, _) = request(
        &router,
        "POST",
        "/systems/123/devices/7/switch/level",
        &access,
        Some(json!({ "level": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    Mock::given(method("PUT"))
        .and(path("/api/123/1/switches/11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;
    let (status, _) = request(
        &router,
        "POST",
        "/systems/123/devices/11/switch/level",
        &access,
        Some(json!({ "level": 50 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn panel_arm_and_disarm_flow() {
    let server = MockServer::start().await;
    let (_state, router, access) = authed_setup(&server).await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/armedstates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let (status, body) = request(
        &router,
        "POST",
        "/systems/123/panel/arm-away",
        &access,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 123);

    // Disarm requires a PIN.
    let (status, _) = request(
        &router,
        "POST",
        "/systems/123/panel/disarm",
        &access,
        Some(json!({ "pin": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &router,
        "POST",
        "/systems/123/panel/disarm",
        &access,
        Some(json!({ "pin": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
