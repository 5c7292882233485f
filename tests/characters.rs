#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use common::*;
use favortrack::config::AppConfig;
use favortrack::AppState;
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;

async fn body(resp: actix_web::dev::ServiceResponse) -> Value {
    serde_json::from_slice(&test::read_body(resp).await).unwrap()
}

macro_rules! send {
    ($app:expr, $req:expr, $token:expr) => {{
        let req = $req.insert_header(bearer($token)).to_request();
        test::call_service(&$app, req).await
    }};
}

#[actix_web::test]
#[serial]
async fn account_and_character_lifecycle() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/accounts").set_json(&json!({"name": "Main"})), &tok);
    assert_eq!(resp.status(), 201);
    let account = body(resp).await;
    let acc_id = account["id"].as_str().unwrap().to_string();

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/accounts").set_json(&json!({"name": "Main"})), &tok);
    assert_eq!(resp.status(), 409);

    let resp = send!(
        app,
        test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Thorn", "accountId": acc_id})),
        &tok
    );
    assert_eq!(resp.status(), 201);
    let ch = body(resp).await;
    let ch_id = ch["id"].as_str().unwrap().to_string();
    assert_eq!(ch["accountId"], acc_id.as_str());
    assert_eq!(ch["ownerId"], "alice");

    let resp = send!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/v1/characters/{ch_id}/favors/Marna"))
            .set_json(&json!({"level": "close_friends"})),
        &tok
    );
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await["favors"]["Marna"], "close_friends");

    let resp = send!(
        app,
        test::TestRequest::put()
            .uri(&format!("/api/v1/characters/{ch_id}/favors/Marna"))
            .set_json(&json!({"level": "besties"})),
        &tok
    );
    assert_eq!(resp.status(), 400);

    let resp = send!(app, test::TestRequest::get().uri(&format!("/api/v1/characters?accountId={acc_id}")), &tok);
    assert_eq!(body(resp).await.as_array().unwrap().len(), 1);

    // deleting the account keeps the character but drops the link
    let resp = send!(app, test::TestRequest::delete().uri(&format!("/api/v1/accounts/{acc_id}")), &tok);
    assert_eq!(resp.status(), 204);
    let resp = send!(app, test::TestRequest::get().uri(&format!("/api/v1/characters/{ch_id}")), &tok);
    assert_eq!(resp.status(), 200);
    assert!(body(resp).await["accountId"].is_null());

    let resp = send!(app, test::TestRequest::delete().uri(&format!("/api/v1/characters/{ch_id}")), &tok);
    assert_eq!(resp.status(), 204);
    let resp = send!(app, test::TestRequest::get().uri(&format!("/api/v1/characters/{ch_id}")), &tok);
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn characters_are_private_to_their_owner() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let alice = user_token("alice");
    let bob = user_token("bob");

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Thorn"})), &alice);
    let ch_id = body(resp).await["id"].as_str().unwrap().to_string();

    let resp = send!(app, test::TestRequest::get().uri(&format!("/api/v1/characters/{ch_id}")), &bob);
    assert_eq!(resp.status(), 404);
    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/characters/{ch_id}")).set_json(&json!({"name": "Stolen"})),
        &bob
    );
    assert_eq!(resp.status(), 404);
    let resp = send!(app, test::TestRequest::get().uri("/api/v1/characters"), &bob);
    assert!(body(resp).await.as_array().unwrap().is_empty());

    let req = test::TestRequest::get().uri("/api/v1/characters").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
#[serial]
async fn unknown_account_link_is_a_validation_error() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let alice = user_token("alice");
    let bob = user_token("bob");

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/accounts").set_json(&json!({"name": "Alt"})), &bob);
    let bobs_account = body(resp).await["id"].as_str().unwrap().to_string();

    let resp = send!(
        app,
        test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Thorn", "accountId": bobs_account})),
        &alice
    );
    assert_eq!(resp.status(), 400);
    assert_eq!(body(resp).await["error"], "validation");

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Thorn"})), &alice);
    let ch_id = body(resp).await["id"].as_str().unwrap().to_string();
    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/characters/{ch_id}")).set_json(&json!({"accountId": "nope"})),
        &alice
    );
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial]
async fn update_character_null_account_unlinks() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");

    let resp = send!(app, test::TestRequest::post().uri("/api/v1/accounts").set_json(&json!({"name": "Main"})), &tok);
    let acc_id = body(resp).await["id"].as_str().unwrap().to_string();
    let resp = send!(
        app,
        test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Thorn", "accountId": acc_id})),
        &tok
    );
    let ch_id = body(resp).await["id"].as_str().unwrap().to_string();

    // absent field leaves the link alone
    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/characters/{ch_id}")).set_json(&json!({"name": "Thorny"})),
        &tok
    );
    let ch = body(resp).await;
    assert_eq!(ch["name"], "Thorny");
    assert_eq!(ch["accountId"], acc_id.as_str());

    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/characters/{ch_id}")).set_json(&json!({"accountId": null})),
        &tok
    );
    assert!(body(resp).await["accountId"].is_null());
}

#[actix_web::test]
#[serial]
async fn import_replaces_existing_characters() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");

    send!(app, test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Old"})), &tok);

    let payload = json!({ "characters": [
        { "name": "Ash", "favors": { "Marna": "friends" } },
        { "name": "Birch" }
    ]});
    let resp = send!(app, test::TestRequest::post().uri("/api/v1/characters/import").set_json(&payload), &tok);
    assert_eq!(resp.status(), 200);
    assert_eq!(body(resp).await.as_array().unwrap().len(), 2);

    let resp = send!(app, test::TestRequest::get().uri("/api/v1/characters"), &tok);
    let list = body(resp).await;
    let names: Vec<&str> = list.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Ash", "Birch"]);
    assert_eq!(list[0]["favors"]["Marna"], "friends");
}

#[actix_web::test]
#[serial]
async fn invalid_import_writes_nothing() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");

    send!(app, test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Keep"})), &tok);

    let payload = json!({ "characters": [ { "name": "Fine" }, { "name": "" } ] });
    let resp = send!(app, test::TestRequest::post().uri("/api/v1/characters/import").set_json(&payload), &tok);
    assert_eq!(resp.status(), 400);
    let err = body(resp).await;
    assert!(err["message"].as_str().unwrap().contains("record 1"));

    let payload = json!({ "characters": [ { "name": "Fine", "accountId": "missing" } ] });
    let resp = send!(app, test::TestRequest::post().uri("/api/v1/characters/import").set_json(&payload), &tok);
    assert_eq!(resp.status(), 400);

    let resp = send!(app, test::TestRequest::get().uri("/api/v1/characters"), &tok);
    let list = body(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["name"], "Keep");
}

#[actix_web::test]
#[serial]
async fn snapshot_survives_restart() {
    let (repo, dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");
    send!(app, test::TestRequest::post().uri("/api/v1/characters").set_json(&json!({"name": "Persisted"})), &tok);

    std::env::set_var("FAVOR_DATA_DIR", dir.path());
    let reloaded = favortrack::repo::inmem::InMemRepo::new();
    let app = test_app!(AppState::new(Arc::new(reloaded), AppConfig::default()));
    let resp = send!(app, test::TestRequest::get().uri("/api/v1/characters"), &tok);
    assert_eq!(body(resp).await[0]["name"], "Persisted");
}

#[actix_web::test]
#[serial]
async fn account_notes_can_be_cleared() {
    let (repo, _dir) = fresh_repo();
    let app = test_app!(AppState::new(Arc::new(repo), AppConfig::default()));
    let tok = user_token("alice");

    let resp = send!(
        app,
        test::TestRequest::post().uri("/api/v1/accounts").set_json(&json!({"name": "Main", "notes": "crafting mule"})),
        &tok
    );
    let acc_id = body(resp).await["id"].as_str().unwrap().to_string();

    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/accounts/{acc_id}")).set_json(&json!({"name": "Mule"})),
        &tok
    );
    assert_eq!(body(resp).await["notes"], "crafting mule");

    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/accounts/{acc_id}")).set_json(&json!({"notes": null})),
        &tok
    );
    assert_eq!(resp.status(), 200);
    assert!(body(resp).await["notes"].is_null());

    let resp = send!(
        app,
        test::TestRequest::patch().uri(&format!("/api/v1/accounts/{acc_id}")).set_json(&json!({"notes": "x".repeat(2001)})),
        &tok
    );
    assert_eq!(resp.status(), 400);
}
