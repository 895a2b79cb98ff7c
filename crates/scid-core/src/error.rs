use thiserror::Error;

use crate::types::Balance;

/// Coarse classification used by callers that map errors onto a transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Settlement,
    Storage,
}

#[derive(Debug, Error)]
pub enum ScidError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("invalid SCid {scid:?}: {reason}")]
    InvalidScid { scid: String, reason: String },

    #[error("unknown chain code: {0}")]
    UnknownChainCode(String),

    #[error("sequence must be between 0 and {max}, got {value}")]
    SequenceOutOfRange { value: u64, max: u32 },

    #[error("sequence space exhausted for artist hash {artist_hash} in year {year:02}")]
    SequenceExhausted { artist_hash: String, year: u8 },

    #[error("stream too short: {duration}s (minimum {min}s)")]
    StreamTooShort { duration: u32, min: u32 },

    #[error("stream timestamp {timestamp} is ahead of the ledger clock {now}")]
    StreamFromFuture { timestamp: i64, now: i64 },

    #[error("creator and listener shares must sum to 10000 basis points, got {got}")]
    SplitBasisPointsMismatch { got: u32 },

    #[error("distributor batch size must be between 1 and {max}, got {got}")]
    BatchSize { max: usize, got: usize },

    #[error("no unclaimed rewards for profile {0}")]
    NothingToClaim(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // ── Not-found errors ─────────────────────────────────────────────────────
    #[error("SCid not found: {0}")]
    ScidNotFound(String),

    #[error("track not found: {0}")]
    TrackNotFound(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("track {0} has no owning profile")]
    TrackWithoutProfile(String),

    // ── Conflict errors ──────────────────────────────────────────────────────
    #[error("track {track_id} already has SCid {scid}")]
    AlreadyRegistered { track_id: String, scid: String },

    #[error("only the current owner can transfer {scid}")]
    NotOwner { scid: String },

    #[error("SCid {scid} already registered on-chain in {tx_hash}")]
    AlreadyAnchored { scid: String, tx_hash: String },

    #[error("SCid {0} is revoked")]
    Revoked(String),

    #[error("rewards for track {0} were already credited")]
    AlreadyCredited(String),

    // ── Settlement errors ────────────────────────────────────────────────────
    #[error("settlement failed: {reason}")]
    Settlement { reason: String, settled: Balance },

    #[error("on-chain registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("notification dispatch failed: {0}")]
    Notification(String),

    // ── Serialization / storage ──────────────────────────────────────────────
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

impl ScidError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScidError::InvalidScid { .. }
            | ScidError::UnknownChainCode(_)
            | ScidError::SequenceOutOfRange { .. }
            | ScidError::SequenceExhausted { .. }
            | ScidError::StreamTooShort { .. }
            | ScidError::StreamFromFuture { .. }
            | ScidError::SplitBasisPointsMismatch { .. }
            | ScidError::BatchSize { .. }
            | ScidError::NothingToClaim(_)
            | ScidError::InvalidInput(_)
            | ScidError::Config(_) => ErrorKind::Validation,

            ScidError::ScidNotFound(_)
            | ScidError::TrackNotFound(_)
            | ScidError::ProfileNotFound(_)
            | ScidError::TrackWithoutProfile(_) => ErrorKind::NotFound,

            ScidError::AlreadyRegistered { .. }
            | ScidError::NotOwner { .. }
            | ScidError::AlreadyAnchored { .. }
            | ScidError::Revoked(_)
            | ScidError::AlreadyCredited(_) => ErrorKind::Conflict,

            ScidError::Settlement { .. }
            | ScidError::RegistryUnavailable(_)
            | ScidError::Notification(_) => ErrorKind::Settlement,

            ScidError::Serialization(_) | ScidError::Storage(_) | ScidError::Other(_) => {
                ErrorKind::Storage
            }
        }
    }
}
