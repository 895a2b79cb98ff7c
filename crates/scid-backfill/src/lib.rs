//! Restartable batch jobs over existing catalog data.
//!
//! Both jobs are idempotent: a track that already has an SCid (or a
//! retroactive credit) is skipped, so a re-run after a crash or a partial
//! run changes nothing that was already done.

pub mod grandfather;
pub mod identifiers;

pub use grandfather::{RewardBackfill, RewardBackfillOptions, RewardBackfillResult, TrackCredit};
pub use identifiers::{IdentifierBackfill, IdentifierBackfillOptions, IdentifierBackfillResult};
