//! Usage tracking on top of BosBase.
//!
//! One event is recorded per image generation attempt: [`recorder::UsageRecorder::record_start`]
//! writes it with `success = false` before the upstream call, and
//! [`recorder::UsageRecorder::record_outcome`] overwrites the outcome afterwards.
//! [`stats::StatsReader`] aggregates the events on demand.

pub mod normalize;
pub mod provision;
pub mod recorder;
pub mod schema;
pub mod stats;

pub use normalize::normalize_success;
pub use provision::{ProvisionError, Provisioner, Ready};
pub use recorder::{EventId, RecordError, UsageAttempt, UsageOutcome, UsageRecorder};
pub use schema::SchemaDescriptor;
pub use stats::{ApiStats, StatsReader};
