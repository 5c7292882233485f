pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod security;
pub mod signature;
pub mod suggestions;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
