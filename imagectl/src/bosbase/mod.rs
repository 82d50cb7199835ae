//! BosBase (PocketBase-compatible) backend access.
//!
//! - [`store::RecordStore`]: the operations usage tracking and user sync need
//! - [`store::StoreConnector`]: hands out a freshly authenticated store per operation
//! - [`client`]: the reqwest implementation against a live server
//! - `in_memory`: a fake for tests (behind the `test-utils` feature outside this crate)

pub mod client;
pub mod errors;
#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory;
pub mod models;
pub mod store;

pub use client::{BosBaseClient, BosBaseConnector};
pub use errors::StoreError;
pub use models::{Collection, CollectionField, CollectionPatch, ListQuery, ListResult, Record, quote_filter_literal};
pub use store::{RecordStore, StoreConnector};
