use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use scid_core::constants::{MAX_DISTRIBUTOR_BATCH, WEI_PER_MICRO_OGUN};
use scid_core::{Balance, Scid, ScidError};

/// Proof that the distributor accepted a payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Transaction hash or equivalent reference.
    pub reference: String,
    pub block_number: Option<u64>,
}

/// One line of a batch payout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEntry {
    pub wallet: String,
    pub scid: Scid,
    /// micro-OGUN
    pub amount: Balance,
    pub is_nft: bool,
}

/// External reward distributor. Amounts are micro-OGUN; implementations
/// convert with `to_wei` at the wire.
///
/// A failure is `ScidError::Settlement` carrying the distributor's reason.
#[async_trait]
pub trait Distributor: Send + Sync {
    async fn submit_reward(
        &self,
        wallet: &str,
        scid: &Scid,
        amount: Balance,
        is_nft: bool,
    ) -> Result<SettlementReceipt, ScidError>;

    async fn submit_reward_and_stake(
        &self,
        wallet: &str,
        scid: &Scid,
        amount: Balance,
        is_nft: bool,
    ) -> Result<SettlementReceipt, ScidError>;

    /// 1..=100 entries, settled all-or-nothing.
    async fn batch_submit_rewards(
        &self,
        entries: &[RewardEntry],
    ) -> Result<SettlementReceipt, ScidError>;
}

/// micro-OGUN → 18-decimal smallest unit.
pub fn to_wei(amount: Balance) -> Result<u128, ScidError> {
    amount
        .checked_mul(WEI_PER_MICRO_OGUN)
        .ok_or_else(|| ScidError::InvalidInput(format!("amount {amount} overflows wei")))
}

pub fn check_batch(len: usize) -> Result<(), ScidError> {
    if len == 0 || len > MAX_DISTRIBUTOR_BATCH {
        return Err(ScidError::BatchSize {
            max: MAX_DISTRIBUTOR_BATCH,
            got: len,
        });
    }
    Ok(())
}

/// Distributor reason carried by a settlement failure, or the error text.
pub fn failure_reason(err: &ScidError) -> String {
    match err {
        ScidError::Settlement { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
