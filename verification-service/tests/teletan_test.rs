mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_json, make_bearer_token, post_json, test_config, TestApp};
use tower::util::ServiceExt;

const TELETAN_ROUTE: &str = "/version/v1/tan/teletan";

fn teletan_request(auth: Option<&str>, tele_tan_type: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(TELETAN_ROUTE)
        .header(header::CONTENT_LENGTH, 0);
    if let Some(auth) = auth {
        builder = builder.header(header::AUTHORIZATION, auth);
    }
    if let Some(t) = tele_tan_type {
        builder = builder.header("X-Verification-TeleTAN-Type", t);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn tele_tan_has_fixed_length_and_restricted_alphabet() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let code = body["teleTan"].as_str().unwrap();
    assert_eq!(code.len(), 10);
    for c in code.chars() {
        assert!(
            "23456789ABCDEFGHJKMNPQRSTUVWXYZ".contains(c),
            "unexpected character {c} in {code}"
        );
    }
}

#[tokio::test]
async fn rate_limit_refuses_with_429() {
    let mut config = test_config();
    config.tan.tele.rate_limit.count = 2;
    let app = TestApp::spawn_with_config(config).await;

    for _ in 0..2 {
        let response = app
            .internal
            .clone()
            .oneshot(teletan_request(None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn missing_bearer_token_is_unauthorized() {
    let app = TestApp::spawn_with_jwt().await;

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn garbage_bearer_token_is_unauthorized() {
    let app = TestApp::spawn_with_jwt().await;

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(Some("Bearer nonsense"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn hotline_role_may_issue_test_tele_tans() {
    let app = TestApp::spawn_with_jwt().await;
    let token = make_bearer_token(&["c19hotline"]);

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(Some(&token), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn event_tele_tans_need_the_event_role() {
    let app = TestApp::spawn_with_jwt().await;

    // The plain hotline role does not cover EVENT issuance
    let token = make_bearer_token(&["c19hotline"]);
    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(Some(&token), Some("EVENT")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = make_bearer_token(&["c19hotline_event"]);
    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(Some(&token), Some("EVENT")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_tele_tan_type_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(None, Some("BOGUS")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issued_tele_tan_can_register_a_token() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(teletan_request(None, None))
        .await
        .unwrap();
    let code = body_json(response).await["teleTan"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            "/version/v1/registrationToken",
            &serde_json::json!({"key": code, "keyType": "TELETAN"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}
