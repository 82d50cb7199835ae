//! Sign-in on top of an authenticating reverse proxy.
//!
//! OAuth itself (the Google redirect dance) happens in the proxy in front of this service. The
//! proxy forwards the verified identity as headers, which [`identity::OAuthProfile`] extracts.
//! Signing in mirrors the profile into BosBase ([`sync::sync_user`]) and issues a JWT session
//! cookie ([`session`]) that later requests present instead of the headers.

pub mod identity;
pub mod session;
pub mod sync;

pub use identity::OAuthProfile;
pub use session::SessionClaims;
pub use sync::{AuthSyncError, sync_user};
