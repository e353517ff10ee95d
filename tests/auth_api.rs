mod common;

use actix_web::{http::StatusCode, middleware, test, web, App};
use chrono::Duration;
use common::{test_app, test_app_with, ADMIN, VIEWER};
use ledger_server::auth::middleware::rate_limit;
use ledger_server::configure_routes;
use serde_json::{json, Value};

macro_rules! init_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .wrap(middleware::from_fn(rate_limit))
                .app_data(web::Data::new($state))
                .configure(configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_login_returns_session() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": ADMIN.1 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["renewal_token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["role"], "admin");
    assert_eq!(body["expires_in_seconds"], 3600);
    assert_eq!(ctx.store.renewal_count().await, 1);
}

#[actix_web::test]
async fn test_login_failures_are_indistinguishable() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let wrong_secret = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": "nope" }))
        .to_request();
    let resp = test::call_service(&app, wrong_secret).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let first: Value = test::read_body_json(resp).await;

    let unknown = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": "ghost", "secret": "nope" }))
        .to_request();
    let resp = test::call_service(&app, unknown).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let second: Value = test::read_body_json(resp).await;

    assert_eq!(first, second);
    assert_eq!(first, json!({ "error": "invalid credentials" }));
}

#[actix_web::test]
async fn test_login_rejects_bad_bodies() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let cases = [
        json!({ "identity": ADMIN.0 }),
        json!({ "identity": "", "secret": "x" }),
        json!({ "identity": ADMIN.0, "secret": "   " }),
        json!("not an object"),
    ];
    for body in cases {
        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}

#[actix_web::test]
async fn test_refresh_then_logout_revokes() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": VIEWER.0, "secret": VIEWER.1 }))
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let access = session["access_token"].as_str().unwrap().to_string();
    let renewal = session["renewal_token"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": renewal }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let renewed: Value = test::read_body_json(resp).await;
    assert_eq!(renewed["role"], "viewer");
    assert!(renewed.get("renewal_token").is_none());

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .set_json(json!({ "renewal_token": renewal }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "renewal token revoked successfully");

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": renewal }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_refresh_rejects_expired_and_access_tokens() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": ADMIN.1 }))
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;

    // an access token is not a renewal token
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": session["access_token"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    ctx.clock.advance(Duration::days(8));
    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": session["renewal_token"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_refresh_rotates_when_enabled() {
    let ctx = test_app_with(|s| s.auth.rotate_renewal_tokens = true).await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": ADMIN.1 }))
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let original = session["renewal_token"].clone();

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": original }))
        .to_request();
    let renewed: Value = test::call_and_read_body_json(&app, req).await;
    assert!(renewed["renewal_token"].is_string());
    assert_ne!(renewed["renewal_token"], original);

    let req = test::TestRequest::post()
        .uri("/auth/refresh")
        .set_json(json!({ "renewal_token": original }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(ctx.store.renewal_count().await, 1);
}

#[actix_web::test]
async fn test_logout_checks_bearer_before_body() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .set_json(json!({ "renewal_token": "whatever" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", "Bearer not-a-token"))
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": ADMIN.1 }))
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let access = session["access_token"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .set_json(json!({ "wrong_field": 1 }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_logout_of_unknown_token_still_succeeds() {
    let ctx = test_app().await;
    let app = init_app!(ctx.state.clone());

    let req = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({ "identity": ADMIN.0, "secret": ADMIN.1 }))
        .to_request();
    let session: Value = test::call_and_read_body_json(&app, req).await;
    let access = session["access_token"].as_str().unwrap();

    let req = test::TestRequest::post()
        .uri("/auth/logout")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .set_json(json!({ "renewal_token": "never-issued" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(ctx.store.renewal_count().await, 1);
}
