//! HTTP surface.
//!
//! - **Images** (`/api/generate/image`): proxy to the OpenAI images API with usage tracking
//! - **Usage** (`/api/bosbase/*`): click recording, stats and collection provisioning
//! - **Authentication** (`/api/auth/*`): sessions for users signed in through the auth proxy
//!
//! Routes are documented with `utoipa`; the docs are served at `/docs`.

pub mod handlers;
pub mod models;
