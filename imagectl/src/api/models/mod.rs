//! API request and response data models.
//!
//! - [`images`]: image generation request and result
//! - [`usage`]: click recording, stats and collection provisioning
//! - [`auth`]: sign-in session payloads

pub mod auth;
pub mod images;
pub mod usage;
