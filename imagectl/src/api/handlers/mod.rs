//! Axum route handlers.

pub mod auth;
pub mod generate;
pub mod usage;
