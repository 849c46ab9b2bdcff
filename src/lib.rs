pub mod auth;
pub mod config;
pub mod error;
pub mod feed;
pub mod gateway;
pub mod models;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod security;
pub mod status;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
