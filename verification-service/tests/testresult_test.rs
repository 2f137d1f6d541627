mod common;

use axum::http::StatusCode;
use common::{body_json, post_json, TestApp};
use serde_json::json;
use tower::util::ServiceExt;
use uuid::Uuid;

use verification_service::models::TeleTanType;
use verification_service::services::hashing;

const TOKEN_ROUTE: &str = "/version/v1/registrationToken";
const TESTRESULT_ROUTE: &str = "/version/v1/testresult";

async fn register_guid(app: &TestApp, seed: &str) -> (String, String) {
    let key = hashing::hash(seed);
    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TOKEN_ROUTE,
            &json!({"key": key, "keyType": "GUID"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    (
        key,
        body["registrationToken"].as_str().unwrap().to_string(),
    )
}

async fn register_tele_tan(app: &TestApp) -> String {
    let tele_tan = app
        .state
        .tan_service
        .generate_tele_tan(TeleTanType::Test)
        .await
        .unwrap();
    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TOKEN_ROUTE,
            &json!({"key": tele_tan, "keyType": "TELETAN"}),
        ))
        .await
        .unwrap();
    body_json(response).await["registrationToken"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn external_result_reflects_the_oracle() {
    let app = TestApp::spawn().await;
    let (key, token) = register_guid(&app, "poll").await;
    app.oracle.set_result(&key, 1).await;

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": token}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["testResult"], 1);
}

#[tokio::test]
async fn tele_tan_session_is_always_positive_externally() {
    let app = TestApp::spawn().await;
    let token = register_tele_tan(&app).await;

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": token}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["testResult"], 2);
}

#[tokio::test]
async fn unknown_token_is_rejected_externally() {
    let app = TestApp::spawn().await;

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": Uuid::new_v4().to_string()}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn internal_result_includes_the_digest() {
    let app = TestApp::spawn().await;
    let (key, token) = register_guid(&app, "internal-poll").await;
    app.oracle.set_result(&key, 2).await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": token}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["testResult"], 2);
    assert_eq!(body["hashedGuid"], key);
}

#[tokio::test]
async fn internal_profile_refuses_tele_tan_sessions() {
    let app = TestApp::spawn().await;
    let token = register_tele_tan(&app).await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": token}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn internal_unknown_token_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": Uuid::new_v4().to_string()}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disagreeing_dual_results_are_forbidden() {
    let app = TestApp::spawn().await;
    let key = hashing::hash("dual-poll");
    let key_dob = hashing::hash("dual-poll-dob");

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TOKEN_ROUTE,
            &json!({"key": key, "keyType": "GUID", "keyDob": key_dob}),
        ))
        .await
        .unwrap();
    let token = body_json(response).await["registrationToken"]
        .as_str()
        .unwrap()
        .to_string();

    app.oracle.set_result(&key, 2).await;
    app.oracle.set_result(&key_dob, 0).await;

    let response = app
        .external
        .clone()
        .oneshot(post_json(
            TESTRESULT_ROUTE,
            &json!({"registrationToken": token}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn fake_request_returns_decoy_result_with_padding() {
    let app = TestApp::spawn().await;

    let mut request = post_json(
        TESTRESULT_ROUTE,
        &json!({"registrationToken": Uuid::new_v4().to_string()}),
    );
    request
        .headers_mut()
        .insert("X-Verification-Fake", "1".parse().unwrap());

    let response = app.external.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["testResult"], 2);
    assert_eq!(body["responsePadding"].as_str().unwrap().len(), 45);
}
