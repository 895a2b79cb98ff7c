use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_REWARD_PER_STREAM, BPS_DENOMINATOR, CREATOR_SHARE_BPS, LISTENER_SHARE_BPS,
    MAX_DAILY_CREATOR_REWARD, MAX_DAILY_LISTENER_REWARD, MAX_DURATION_BONUS_BPS,
    MAX_RETROACTIVE_REWARD_PER_TRACK, MIN_STREAM_DURATION_SECS, NFT_REWARD_PER_STREAM,
    REFERENCE_STREAM_DURATION_SECS, VERIFIED_BONUS_BPS,
};
use crate::error::ScidError;
use crate::types::Balance;

/// Every economic constant of the streaming-reward ledger.
///
/// Amounts are micro-OGUN; multipliers and shares are basis points.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardPolicy {
    pub nft_reward_per_stream: Balance,
    pub base_reward_per_stream: Balance,
    pub verified_bonus_bps: u32,
    pub min_stream_duration_secs: u32,
    pub reference_stream_duration_secs: u32,
    pub max_duration_bonus_bps: u32,
    pub creator_share_bps: u32,
    pub listener_share_bps: u32,
    pub max_daily_creator_reward: Balance,
    pub max_daily_listener_reward: Balance,
    pub max_retroactive_reward_per_track: Balance,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            nft_reward_per_stream: NFT_REWARD_PER_STREAM,
            base_reward_per_stream: BASE_REWARD_PER_STREAM,
            verified_bonus_bps: VERIFIED_BONUS_BPS,
            min_stream_duration_secs: MIN_STREAM_DURATION_SECS,
            reference_stream_duration_secs: REFERENCE_STREAM_DURATION_SECS,
            max_duration_bonus_bps: MAX_DURATION_BONUS_BPS,
            creator_share_bps: CREATOR_SHARE_BPS,
            listener_share_bps: LISTENER_SHARE_BPS,
            max_daily_creator_reward: MAX_DAILY_CREATOR_REWARD,
            max_daily_listener_reward: MAX_DAILY_LISTENER_REWARD,
            max_retroactive_reward_per_track: MAX_RETROACTIVE_REWARD_PER_TRACK,
        }
    }
}

impl RewardPolicy {
    pub fn validate(&self) -> Result<(), ScidError> {
        let shares = self.creator_share_bps + self.listener_share_bps;
        if shares != BPS_DENOMINATOR {
            return Err(ScidError::SplitBasisPointsMismatch { got: shares });
        }
        if self.reference_stream_duration_secs == 0 {
            return Err(ScidError::Config(
                "reference_stream_duration_secs must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Creator's per-play rate used for retroactive crediting.
    pub fn creator_rate(&self, is_nft: bool) -> Balance {
        let base = if is_nft {
            self.nft_reward_per_stream
        } else {
            self.base_reward_per_stream
        };
        base * self.creator_share_bps as Balance / BPS_DENOMINATOR as Balance
    }
}

/// The identity background jobs act as. Configured explicitly rather than
/// looked up by display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub profile_id: String,
    pub display_name: String,
}

impl Default for ServiceIdentity {
    fn default() -> Self {
        Self {
            profile_id: "service:scid-ledger".into(),
            display_name: "SCid Ledger".into(),
        }
    }
}

/// Remote settlement relay. Absent → claims settle at the ledger level only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributorConfig {
    /// JSON-RPC endpoint of the signing relay.
    pub endpoint: String,
    /// Distributor contract the relay submits to.
    pub contract_address: String,
}

/// On-chain SCid registry relay. Absent → on-chain anchoring is skipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub endpoint: String,
    pub contract_address: String,
    pub chain_id: u64,
}

/// Top-level ledger configuration, loaded from JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub reward_policy: RewardPolicy,
    #[serde(default)]
    pub service_identity: ServiceIdentity,
    #[serde(default)]
    pub distributor: Option<DistributorConfig>,
    #[serde(default)]
    pub registry: Option<RegistryConfig>,
}

impl LedgerConfig {
    pub fn with_data_dir<P: Into<PathBuf>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            reward_policy: RewardPolicy::default(),
            service_identity: ServiceIdentity::default(),
            distributor: None,
            registry: None,
        }
    }

    /// Read and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ScidError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ScidError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ScidError> {
        let cfg: LedgerConfig =
            serde_json::from_str(json).map_err(|e| ScidError::Config(e.to_string()))?;
        cfg.reward_policy.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_rates_match_win_win_split() {
        let p = RewardPolicy::default();
        assert_eq!(p.creator_rate(true), 350_000);
        assert_eq!(p.creator_rate(false), 35_000);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg = LedgerConfig::from_json(
            r#"{ "data_dir": "/tmp/scid", "reward_policy": { "max_daily_listener_reward": 1 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.reward_policy.max_daily_listener_reward, 1);
        assert_eq!(cfg.reward_policy.creator_share_bps, CREATOR_SHARE_BPS);
        assert!(cfg.distributor.is_none());
        assert_eq!(cfg.service_identity, ServiceIdentity::default());
    }

    #[test]
    fn oversubscribed_split_rejected() {
        let err = LedgerConfig::from_json(
            r#"{ "data_dir": "x", "reward_policy": { "creator_share_bps": 8000 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ScidError::SplitBasisPointsMismatch { got: 11_000 }));
    }
}
