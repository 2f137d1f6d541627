mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{post_json, TestApp};
use serde_json::json;
use tower::util::ServiceExt;

use verification_service::models::{
    TanSourceOfTrust, TanType, TeleTanType, VerificationTan,
};
use verification_service::services::hashing;
use verification_service::storage::TanStore;

const VERIFY_ROUTE: &str = "/version/v1/tan/verify";

async fn issue_tan(app: &TestApp) -> String {
    app.state
        .tan_service
        .generate_tan(TanSourceOfTrust::ConnectedLab, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn valid_tan_is_redeemed_exactly_once() {
    let app = TestApp::spawn().await;
    let tan = issue_tan(&app).await;

    let first = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": tan})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let stored = app.state.tan_service.get_by_value(&tan).await.unwrap().unwrap();
    assert!(stored.redeemed);

    let second = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": tan})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn concurrent_verification_has_a_single_winner() {
    let app = TestApp::spawn().await;
    let tan = issue_tan(&app).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let router = app.internal.clone();
        let body = json!({"tan": tan});
        handles.push(tokio::spawn(async move {
            router
                .oneshot(post_json(VERIFY_ROUTE, &body))
                .await
                .unwrap()
                .status()
        }));
    }

    let mut ok = 0;
    let mut not_found = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::NOT_FOUND => not_found += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(not_found, 7);
}

#[tokio::test]
async fn unknown_tan_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(
            VERIFY_ROUTE,
            &json!({"tan": uuid::Uuid::new_v4().to_string()}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_tan_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": "!!nonsense!!"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_tan_is_not_found() {
    let app = TestApp::spawn().await;
    let raw = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let expired = VerificationTan::new(
        hashing::hash(&raw),
        now - Duration::days(15),
        now - Duration::days(1),
        TanSourceOfTrust::ConnectedLab,
        TanType::Tan,
        None,
    );
    app.tans.insert(expired).await.unwrap();

    let response = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": raw})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn not_yet_valid_tan_is_not_found() {
    let app = TestApp::spawn().await;
    let raw = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let future = VerificationTan::new(
        hashing::hash(&raw),
        now + Duration::hours(1),
        now + Duration::days(14),
        TanSourceOfTrust::ConnectedLab,
        TanType::Tan,
        None,
    );
    app.tans.insert(future).await.unwrap();

    let response = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": raw})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn redeemed_tele_tan_reports_its_type_in_a_header() {
    let app = TestApp::spawn().await;
    let tele_tan = app
        .state
        .tan_service
        .generate_tele_tan(TeleTanType::Event)
        .await
        .unwrap();

    let response = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": tele_tan})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let header = response
        .headers()
        .get("X-Verification-TeleTAN-Type")
        .expect("type header missing");
    assert_eq!(header.to_str().unwrap(), "EVENT");
}

#[tokio::test]
async fn plain_tan_has_no_type_header() {
    let app = TestApp::spawn().await;
    let tan = issue_tan(&app).await;

    let response = app
        .internal
        .clone()
        .oneshot(post_json(VERIFY_ROUTE, &json!({"tan": tan})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("X-Verification-TeleTAN-Type")
        .is_none());
}
