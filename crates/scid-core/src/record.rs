//! scid-core::record
//!
//! Persistent record shapes. Everything here is bincode-encoded into sled
//! trees by `scid-state`.

use serde::{Deserialize, Serialize};

use crate::types::{utc_day, Balance, ChainCode, ListenerKey, Scid, ScidStatus, Timestamp};

/// Reset a daily counter if `last_reset` falls on an earlier UTC day than
/// `now`. Returns true when a reset happened.
pub fn roll_daily_window(
    earned_today: &mut Balance,
    last_reset: &mut Option<Timestamp>,
    now: Timestamp,
) -> bool {
    let stale = match last_reset {
        Some(ts) => utc_day(*ts) < utc_day(now),
        None => true,
    };
    if stale {
        *earned_today = 0;
        *last_reset = Some(now);
    }
    stale
}

// ── TransferRecord ────────────────────────────────────────────────────────────

/// One entry of an SCid's append-only ownership history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub from_profile_id: String,
    pub to_profile_id: String,
    pub transaction_hash: Option<String>,
    pub transferred_at: Timestamp,
    pub reason: Option<String>,
}

// ── ScidRecord ────────────────────────────────────────────────────────────────

/// The ledger entry for one track's SCid (= primary key `scid`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScidRecord {
    pub scid: Scid,
    pub track_id: String,
    /// Current owner.
    pub profile_id: String,
    pub previous_owner_id: Option<String>,
    /// Artist wallet at registration time.
    pub wallet_address: Option<String>,
    pub chain_code: ChainCode,
    pub chain_id: u64,
    pub artist_hash: String,
    /// Two-digit year component (0..=99).
    pub year: u8,
    pub sequence: u32,
    pub status: ScidStatus,

    // Streaming ledger
    pub stream_count: u64,
    pub ogun_rewards_earned: Balance,
    pub ogun_rewards_claimed: Balance,
    pub daily_ogun_earned: Balance,
    pub last_daily_reset: Option<Timestamp>,
    pub last_stream_at: Option<Timestamp>,

    pub transfer_history: Vec<TransferRecord>,

    // On-chain proof
    pub transaction_hash: Option<String>,
    pub block_number: Option<u64>,
    pub contract_address: Option<String>,
    pub metadata_hash: Option<String>,
    pub checksum: String,

    pub created_at: Timestamp,
    pub registered_at: Option<Timestamp>,
}

impl ScidRecord {
    /// Earned but not yet claimed. Never negative: claimed ≤ earned is kept by
    /// every mutation path.
    pub fn unclaimed(&self) -> Balance {
        self.ogun_rewards_earned
            .saturating_sub(self.ogun_rewards_claimed)
    }

    /// Lazily reset the per-track daily counter.
    pub fn roll_daily(&mut self, now: Timestamp) -> bool {
        roll_daily_window(&mut self.daily_ogun_earned, &mut self.last_daily_reset, now)
    }

    /// `(artist_hash, year)` pair that scopes the sequence counter.
    pub fn sequence_scope(&self) -> (String, u8) {
        (self.artist_hash.clone(), self.year)
    }
}

// ── ListenerLedger ────────────────────────────────────────────────────────────

/// Per-listener daily budget and lifetime total, keyed by `ListenerKey`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerLedger {
    pub listener: ListenerKey,
    pub daily_ogun_earned: Balance,
    pub last_daily_reset: Option<Timestamp>,
    pub total_ogun_earned: Balance,
}

impl ListenerLedger {
    pub fn new(listener: ListenerKey) -> Self {
        Self {
            listener,
            daily_ogun_earned: 0,
            last_daily_reset: None,
            total_ogun_earned: 0,
        }
    }

    pub fn roll_daily(&mut self, now: Timestamp) -> bool {
        roll_daily_window(&mut self.daily_ogun_earned, &mut self.last_daily_reset, now)
    }
}

// ── RetroactiveCredit ─────────────────────────────────────────────────────────

/// Marker written once per track by the grandfather reward job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetroactiveCredit {
    pub track_id: String,
    pub scid: Scid,
    pub playback_count: u64,
    pub amount: Balance,
    pub is_nft: bool,
    /// Service identity that ran the job.
    pub credited_by: String,
    pub credited_at: Timestamp,
}

// ── Claims ────────────────────────────────────────────────────────────────────

/// Saga phase of a claim attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimPhase {
    /// Local ledger marked claimed; remote call outstanding.
    Reserved,
    /// Distributor accepted the settlement.
    Settled { settlement_ref: String },
    /// Distributor failed; local reservation rolled back.
    Compensated { reason: String },
    /// No distributor configured; ledger-only claim.
    Deferred,
}

/// How claimed OGUN is delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementMode {
    Transfer,
    Stake,
}

/// One record's share of a claim attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimItem {
    pub scid: Scid,
    pub amount: Balance,
    pub is_nft: bool,
    /// Set once this item's remote settlement succeeded.
    pub settled: bool,
}

/// Audit record of one claim attempt (= primary key `claim_id`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub claim_id: u64,
    pub profile_id: String,
    pub wallet_address: String,
    pub mode: SettlementMode,
    pub items: Vec<ClaimItem>,
    pub phase: ClaimPhase,
    pub opened_at: Timestamp,
    pub closed_at: Option<Timestamp>,
}

impl ClaimReceipt {
    pub fn total(&self) -> Balance {
        self.items.iter().map(|i| i.amount).sum()
    }
}
