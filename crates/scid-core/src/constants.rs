/// ─── SCid / OGUN Ledger Constants ───────────────────────────────────────────
///
/// Identifier grammar:  SC-CCC-HHHH-YYNNNNN
/// Ledger unit:         micro-OGUN (1 OGUN = 1,000,000 micro-OGUN)
/// Settlement unit:     wei (1 OGUN = 10^18 wei), used only at the distributor boundary

use crate::types::Balance;

// ── Identifier grammar ───────────────────────────────────────────────────────

/// Constant two-character prefix of every SCid.
pub const SCID_PREFIX: &str = "SC";

/// Separator between SCid components.
pub const SCID_SEPARATOR: char = '-';

/// Number of hex characters kept from SHA-256(artist identifier).
pub const ARTIST_HASH_LENGTH: usize = 4;

/// Zero-padded width of the sequence component.
pub const SEQUENCE_LENGTH: usize = 5;

/// Largest representable sequence number.
pub const MAX_SEQUENCE: u32 = 99_999;

/// Number of hex characters kept from MD5(scid) for the checksum.
pub const CHECKSUM_LENGTH: usize = 4;

/// Canonical SCid length: "SC-POL-7B3A-2400001".
pub const SCID_LENGTH: usize = 19;

/// Polygon mainnet; used when neither a chain code nor a known chain id is given.
pub const DEFAULT_CHAIN_ID: u64 = 137;

// ── Units ─────────────────────────────────────────────────────────────────────

/// 1 OGUN expressed in micro-OGUN.
pub const MICRO_OGUN_PER_OGUN: Balance = 1_000_000;

/// On-chain token decimals are 18; the ledger keeps 6.
pub const WEI_PER_MICRO_OGUN: u128 = 1_000_000_000_000;

// ── Reward policy defaults ────────────────────────────────────────────────────

/// Base reward per qualifying stream of an NFT-minted track (0.5 OGUN).
pub const NFT_REWARD_PER_STREAM: Balance = 500_000;

/// Base reward per qualifying stream of a non-NFT track (0.05 OGUN).
pub const BASE_REWARD_PER_STREAM: Balance = 50_000;

/// Verified-artist multiplier in basis points (×1.5).
pub const VERIFIED_BONUS_BPS: u32 = 15_000;

/// Streams shorter than this are not counted (seconds).
pub const MIN_STREAM_DURATION_SECS: u32 = 30;

/// Streams stamped further than this ahead of the ledger clock are rejected
/// (seconds).
pub const MAX_STREAM_CLOCK_SKEW_SECS: i64 = 300;

/// Duration at which the duration bonus equals ×1 (seconds).
pub const REFERENCE_STREAM_DURATION_SECS: u32 = 180;

/// Maximum duration bonus in basis points (×2).
pub const MAX_DURATION_BONUS_BPS: u32 = 20_000;

/// WIN-WIN split: creator share of the base reward.
pub const CREATOR_SHARE_BPS: u32 = 7_000;

/// WIN-WIN split: listener share of the base reward.
pub const LISTENER_SHARE_BPS: u32 = 3_000;

/// Per-track daily creator cap (100 OGUN).
pub const MAX_DAILY_CREATOR_REWARD: Balance = 100 * MICRO_OGUN_PER_OGUN;

/// Per-listener daily cap (50 OGUN).
pub const MAX_DAILY_LISTENER_REWARD: Balance = 50 * MICRO_OGUN_PER_OGUN;

/// Retroactive cap per track for grandfathered plays (10,000 OGUN).
pub const MAX_RETROACTIVE_REWARD_PER_TRACK: Balance = 10_000 * MICRO_OGUN_PER_OGUN;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

// ── Settlement ────────────────────────────────────────────────────────────────

/// The distributor accepts between 1 and 100 entries per batch call.
pub const MAX_DISTRIBUTOR_BATCH: usize = 100;

// ── Queries ───────────────────────────────────────────────────────────────────

pub const DEFAULT_SEARCH_LIMIT: usize = 50;
pub const TOP_STREAMED_LIMIT: usize = 10;

pub const SECONDS_PER_DAY: i64 = 86_400;
