// Integration tests for `SkyClient` transport mechanics using wiremock.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{bearer_token, body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vivint_api::{ApiEndpoints, Error, SkyClient, SkyConfig};

// ── Helpers ─────────────────────────────────────────────────────────

/// Unsigned JWT with an expiry far in the future.
fn fresh_id_token() -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let exp = chrono::Utc::now().timestamp() + 3600;
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&json!({ "exp": exp, "sub": "user" })).unwrap(),
    );
    format!("{header}.{payload}.sig")
}

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "id_token": fresh_id_token(),
        "token_type": "Bearer"
    })
}

async fn mock_refresh_grant(server: &MockServer, access: &str, refresh: &str) {
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh)))
        .mount(server)
        .await;
}

fn client_for(server: &MockServer, refresh_token: Option<&str>) -> SkyClient {
    SkyClient::new(SkyConfig {
        username: "jane@example.com".into(),
        password: Some(SecretString::from("hunter2".to_owned())),
        refresh_token: refresh_token.map(str::to_owned),
        endpoints: ApiEndpoints {
            api_base: format!("{}/api", server.uri()),
            auth_base: server.uri(),
            grpc: "https://grpc.invalid:50051".into(),
        },
        ..SkyConfig::default()
    })
    .unwrap()
}

// ── Bearer injection ────────────────────────────────────────────────

#[tokio::test]
async fn api_host_calls_carry_bearer_auth_host_calls_do_not() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    // The authuser endpoint only matches when the bearer is present.
    Mock::given(method("GET"))
        .and(path("/api/authuser"))
        .and(bearer_token("access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "u": [{ "_id": "abc", "mbc": "chan", "system": [] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed-refresh"));
    let authuser = client.connect().await.unwrap();
    assert_eq!(authuser.users[0].id, "abc");

    // The token grant itself must not have carried an Authorization
    // header; wiremock would have matched a stricter mock otherwise.
    let requests = server.received_requests().await.unwrap();
    let grant = requests
        .iter()
        .find(|r| r.url.path() == "/oauth2/token")
        .unwrap();
    assert!(!grant.headers.contains_key("authorization"));
}

// ── Status classification ───────────────────────────────────────────

#[tokio::test]
async fn non_json_200_wraps_body_as_message() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/api/systems/123/reboot-status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    client.refresh_session("seed").await.unwrap();
    let body = client
        .call(
            reqwest::Method::GET,
            "systems/123/reboot-status",
            None,
            &[],
            None,
        )
        .await
        .unwrap();
    assert_eq!(body, json!({ "message": "OK" }));
}

#[tokio::test]
async fn found_302_yields_location_without_following() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    Mock::given(method("GET"))
        .and(path("/api/123/1/42/camera-thumbnail"))
        .and(query_param("time", "1700000000000"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "https://cdn.example.com/thumb.jpg"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    client.refresh_session("seed").await.unwrap();
    let url = client
        .get_camera_thumbnail_url(123, 1, 42, 1_700_000_000_000)
        .await
        .unwrap();
    assert_eq!(url.as_deref(), Some("https://cdn.example.com/thumb.jpg"));
}

#[tokio::test]
async fn api_400_maps_to_api_error_with_message() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/armedstates"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "bad arm state" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    client.refresh_session("seed").await.unwrap();
    let err = client.set_alarm_state(123, 1, 99).await.unwrap_err();
    match err {
        Error::Api { message } => assert_eq!(message, "bad arm state"),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn auth_host_400_maps_to_authentication_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "token expired"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("stale"));
    let err = client.refresh_session("stale").await.unwrap_err();
    match err {
        Error::Authentication { message } => {
            assert_eq!(message, "invalid_grant: token expired");
        }
        other => panic!("expected Authentication error, got {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_500_propagates_as_transport_class_error() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    Mock::given(method("POST"))
        .and(path("/api/systems/123/reboot-panel"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream sad"))
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    client.refresh_session("seed").await.unwrap();
    let err = client.reboot_panel(123).await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

// ── MFA gate ────────────────────────────────────────────────────────

#[tokio::test]
async fn mfa_required_response_sets_gate_and_blocks_other_calls() {
    let server = MockServer::start().await;
    mock_refresh_grant(&server, "access-1", "refresh-1").await;

    Mock::given(method("PUT"))
        .and(path("/api/123/1/locks/7"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "mfa_required" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    client.refresh_session("seed").await.unwrap();

    let err = client.set_lock_state(123, 1, 7, true).await.unwrap_err();
    assert!(matches!(err, Error::MfaRequired { .. }), "got {err:?}");
    assert!(client.mfa_pending());

    // While the gate is up, a non-MFA request fails before hitting the
    // network (the lock mock's expect(1) would trip otherwise).
    let err = client.trigger_alarm(123, 1).await.unwrap_err();
    assert!(matches!(err, Error::MfaRequired { .. }));
}

// ── Implicit re-auth ────────────────────────────────────────────────

#[tokio::test]
async fn stale_session_reauths_once_then_retries() {
    let server = MockServer::start().await;

    // First grant hands out a token the API rejects; second a good one.
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("stale", "r1")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh", "r2")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/authuser"))
        .and(bearer_token("stale"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/authuser"))
        .and(bearer_token("fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "u": [{ "_id": "abc", "system": [] }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("seed"));
    let authuser = client.connect().await.unwrap();
    assert_eq!(authuser.users.len(), 1);
}
