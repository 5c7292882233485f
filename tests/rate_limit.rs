#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::*;
use favortrack::config::{AppConfig, CloudinaryConfig};
use favortrack::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use favortrack::repo::SuggestionRepo;
use favortrack::signature::SignatureAlgorithm;
use favortrack::AppState;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn tight_limits() -> RateLimiterFacade {
    let cfg = RateLimitConfig {
        suggestion_limit: 1,
        suggestion_window: Duration::from_secs(300),
        reply_limit: 1,
        reply_window: Duration::from_secs(300),
        signature_limit: 1,
        signature_window: Duration::from_secs(300),
    };
    RateLimiterFacade::new(InMemoryRateLimiter::new(true), cfg)
}

#[actix_web::test]
#[serial_test::serial]
async fn second_suggestion_and_reply_are_limited() {
    let (repo, _dir) = fresh_repo();
    let s = repo
        .create_suggestion(favortrack::models::NewSuggestion { text: "t".into(), creator_id: "alice".into(), creator_name: "Alice".into() })
        .await
        .unwrap();
    let state = AppState::new(Arc::new(repo), AppConfig::default()).with_rate_limiter(tight_limits());
    let app = test_app!(state);
    let tok = user_token("alice");

    let create = json!({"text": "idea", "userId": "alice", "userName": "Alice"});
    let req = test::TestRequest::post().uri("/api/v1/suggestions").insert_header(bearer(&tok)).set_json(&create).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
    let req = test::TestRequest::post().uri("/api/v1/suggestions").insert_header(bearer(&tok)).set_json(&create).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["error"], "rate_limited");

    let reply = json!({"suggestionId": s.id, "text": "hi", "senderId": "alice", "senderName": "Alice"});
    let req = test::TestRequest::post().uri("/api/v1/suggestions/reply").insert_header(bearer(&tok)).set_json(&reply).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::post().uri("/api/v1/suggestions/reply").insert_header(bearer(&tok)).set_json(&reply).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);

    // limits are per uid
    let other = user_token("bob");
    let req = test::TestRequest::post()
        .uri("/api/v1/suggestions")
        .insert_header(bearer(&other))
        .set_json(&json!({"text": "idea", "userId": "bob", "userName": "Bob"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
}

#[actix_web::test]
#[serial_test::serial]
async fn signature_requests_are_limited() {
    let (repo, _dir) = fresh_repo();
    let cfg = AppConfig {
        cloudinary: Some(CloudinaryConfig {
            cloud_name: Some("demo".into()),
            api_key: "key".into(),
            api_secret: "secret".into(),
            upload_preset: None,
            algorithm: SignatureAlgorithm::Sha1,
        }),
        ..AppConfig::default()
    };
    let app = test_app!(AppState::new(Arc::new(repo), cfg).with_rate_limiter(tight_limits()));
    let tok = user_token("alice");
    let req = test::TestRequest::post().uri("/api/v1/uploads/signature").insert_header(bearer(&tok)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let req = test::TestRequest::post().uri("/api/v1/uploads/signature").insert_header(bearer(&tok)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 429);
}
