#![allow(dead_code)]

use actix_web::http::header::HeaderValue;
use favortrack::auth::{create_id_token, Role};
use favortrack::repo::inmem::InMemRepo;
use favortrack::repo::UserRepo;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

pub fn set_secret() {
    std::env::set_var("JWT_SECRET", SECRET);
}

/// Empty repository snapshotting into its own temp dir; keep the guard alive for the test.
pub fn fresh_repo() -> (InMemRepo, tempfile::TempDir) {
    set_secret();
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("FAVOR_DATA_DIR", dir.path());
    (InMemRepo::new(), dir)
}

pub fn user_token(uid: &str) -> String {
    create_id_token(uid, uid, vec![Role::User]).unwrap()
}

pub fn admin_token(uid: &str) -> String {
    create_id_token(uid, uid, vec![Role::User, Role::Admin]).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, HeaderValue) {
    ("Authorization", HeaderValue::from_str(&format!("Bearer {token}")).unwrap())
}

pub async fn stored_admin(repo: &InMemRepo, uid: &str) {
    repo.upsert_user(uid, uid).await.unwrap();
    repo.set_admin(uid, true).await.unwrap();
}

#[macro_export]
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state))
                .configure(favortrack::config),
        )
        .await
    };
}
