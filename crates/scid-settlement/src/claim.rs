//! Claim reconciliation.
//!
//! A claim is a three-phase saga over two systems:
//!
//!   reserve     one local transaction sets `claimed = earned` on up to 100
//!               records and writes the `Reserved` receipt
//!   settle      distributor call (single, batch, or one stake call per record)
//!   compensate  on failure, a local transaction subtracts exactly what was
//!               reserved for every unsettled record
//!
//! Each attempt is persisted as a `ClaimReceipt` and every phase change is
//! logged with its `claim_id`. Claims for one profile are serialized.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use scid_core::constants::MAX_DISTRIBUTOR_BATCH;
use scid_core::{
    Balance, ClaimItem, ClaimPhase, ClaimReceipt, Notification, Notifier, Scid, ScidError,
    SettlementMode, Timestamp, TrackDirectory,
};
use scid_state::LedgerDb;

use crate::distributor::{failure_reason, Distributor, RewardEntry, SettlementReceipt};

/// Result of a successful or deferred claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub claim_id: u64,
    pub profile_id: String,
    pub mode: SettlementMode,
    pub total: Balance,
    pub record_count: usize,
    /// `None` when settlement was deferred.
    pub settlement_reference: Option<String>,
    /// No distributor configured: the ledger is committed but nothing moved
    /// on-chain.
    pub deferred: bool,
    /// Unclaimed balance left after this claim (records beyond the batch
    /// bound, or accrual that raced the claim). `None` if it could not be
    /// read back.
    pub remaining_unclaimed: Option<Balance>,
}

pub struct ClaimCoordinator {
    db: Arc<LedgerDb>,
    distributor: Option<Arc<dyn Distributor>>,
    tracks: Arc<dyn TrackDirectory>,
    notifier: Arc<dyn Notifier>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ClaimCoordinator {
    pub fn new(
        db: Arc<LedgerDb>,
        distributor: Option<Arc<dyn Distributor>>,
        tracks: Arc<dyn TrackDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db,
            distributor,
            tracks,
            notifier,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Σ(earned − claimed) over records the profile currently owns.
    pub fn unclaimed_rewards(&self, profile_id: &str) -> Result<Balance, ScidError> {
        let mut total: Balance = 0;
        for scid in self.db.scids_for_profile(profile_id)? {
            if let Some(r) = self.db.get_record(&scid)? {
                total += r.unclaimed();
            }
        }
        Ok(total)
    }

    /// Claim receipts for `profile_id`, newest first.
    pub fn claim_history(&self, profile_id: &str) -> Result<Vec<ClaimReceipt>, ScidError> {
        self.db.claims_for_profile(profile_id)
    }

    fn profile_lock(&self, profile_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(profile_id.to_string()).or_default().clone()
    }

    /// Drop the profile's entry once nobody else holds or waits on it.
    fn release_lock(&self, profile_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = Arc::strong_count(&lock) == 2
            && locks.get(profile_id).is_some_and(|l| Arc::ptr_eq(l, &lock));
        if idle {
            locks.remove(profile_id);
        }
    }

    /// Settle the profile's unclaimed rewards to `wallet_address`.
    ///
    /// Returns `NothingToClaim` when there is no positive balance, and
    /// `Settlement` (with the distributor's reason) after compensation.
    pub async fn claim_streaming_rewards(
        &self,
        profile_id: &str,
        wallet_address: &str,
        stake_directly: bool,
        now: Timestamp,
    ) -> Result<ClaimOutcome, ScidError> {
        if wallet_address.is_empty() {
            return Err(ScidError::InvalidInput("wallet address must not be empty".into()));
        }

        let lock = self.profile_lock(profile_id);
        let result = {
            let _guard = lock.lock().await;
            self.claim_locked(profile_id, wallet_address, stake_directly, now)
                .await
        };
        self.release_lock(profile_id, lock);
        result
    }

    async fn claim_locked(
        &self,
        profile_id: &str,
        wallet_address: &str,
        stake_directly: bool,
        now: Timestamp,
    ) -> Result<ClaimOutcome, ScidError> {
        // ── Snapshot ─────────────────────────────────────────────────────────
        let mut candidates = Vec::new();
        for scid in self.db.scids_for_profile(profile_id)? {
            if let Some(r) = self.db.get_record(&scid)? {
                if r.unclaimed() > 0 {
                    candidates.push(r);
                }
            }
        }
        if candidates.is_empty() {
            return Err(ScidError::NothingToClaim(profile_id.to_string()));
        }
        candidates.sort_by(|a, b| b.unclaimed().cmp(&a.unclaimed()).then_with(|| a.scid.cmp(&b.scid)));
        candidates.truncate(MAX_DISTRIBUTOR_BATCH);

        let mut nft_by_scid = HashMap::new();
        for r in &candidates {
            let is_nft = self
                .tracks
                .track(&r.track_id)?
                .map(|t| t.is_nft())
                .unwrap_or(false);
            nft_by_scid.insert(r.scid.clone(), is_nft);
        }
        let scids: Vec<Scid> = candidates.iter().map(|r| r.scid.clone()).collect();

        // ── Reserve ──────────────────────────────────────────────────────────
        // Amounts are re-read inside the transaction; a record transferred
        // away since the snapshot reserves nothing. The receipt is written in
        // the same transaction, so a reservation never exists without one.
        let claim_id = self.db.next_claim_id()?;
        let mode = if stake_directly { SettlementMode::Stake } else { SettlementMode::Transfer };
        let reserved = self.db.update_records_with_claim(&scids, |records| {
            let mut items = Vec::with_capacity(records.len());
            for r in records.iter_mut() {
                let amount = if r.profile_id == profile_id { r.unclaimed() } else { 0 };
                if amount == 0 {
                    continue;
                }
                r.ogun_rewards_claimed += amount;
                items.push(ClaimItem {
                    scid: r.scid.clone(),
                    amount,
                    is_nft: nft_by_scid.get(&r.scid).copied().unwrap_or(false),
                    settled: false,
                });
            }
            if items.is_empty() {
                return Ok(None);
            }
            Ok(Some(ClaimReceipt {
                claim_id,
                profile_id: profile_id.to_string(),
                wallet_address: wallet_address.to_string(),
                mode,
                items,
                phase: ClaimPhase::Reserved,
                opened_at: now,
                closed_at: None,
            }))
        })?;
        let Some(mut receipt) = reserved else {
            return Err(ScidError::NothingToClaim(profile_id.to_string()));
        };
        info!(
            claim_id = receipt.claim_id,
            profile_id,
            records = receipt.items.len(),
            total = receipt.total(),
            phase = "reserved",
            "claim reserved"
        );

        // ── Settle ───────────────────────────────────────────────────────────
        let Some(distributor) = self.distributor.clone() else {
            receipt.phase = ClaimPhase::Deferred;
            receipt.closed_at = Some(now);
            self.record_phase(&receipt);
            info!(claim_id = receipt.claim_id, profile_id, phase = "deferred", "settlement deferred, no distributor configured");
            return Ok(self.finish(&receipt, None, true));
        };

        match self.settle(distributor.as_ref(), &mut receipt).await {
            Ok(reference) => {
                receipt.phase = ClaimPhase::Settled { settlement_ref: reference.clone() };
                receipt.closed_at = Some(now);
                // Tokens have moved; from here on storage trouble is logged,
                // never reported as a failed claim.
                self.record_phase(&receipt);
                info!(
                    claim_id = receipt.claim_id,
                    profile_id,
                    settlement_ref = %reference,
                    phase = "settled",
                    "claim settled"
                );
                Ok(self.finish(&receipt, Some(reference), false))
            }
            Err(e) => {
                let reason = failure_reason(&e);
                self.compensate(&mut receipt, &reason, now)?;
                let settled: Balance = receipt
                    .items
                    .iter()
                    .filter(|i| i.settled)
                    .map(|i| i.amount)
                    .sum();
                Err(ScidError::Settlement { reason, settled })
            }
        }
    }

    /// Drive the remote side. Marks each item `settled` as the distributor
    /// accepts it.
    async fn settle(
        &self,
        distributor: &dyn Distributor,
        receipt: &mut ClaimReceipt,
    ) -> Result<String, ScidError> {
        let wallet = receipt.wallet_address.clone();
        match receipt.mode {
            SettlementMode::Transfer => {
                let result: SettlementReceipt = if receipt.items.len() == 1 {
                    let item = &receipt.items[0];
                    distributor
                        .submit_reward(&wallet, &item.scid, item.amount, item.is_nft)
                        .await?
                } else {
                    let entries: Vec<RewardEntry> = receipt
                        .items
                        .iter()
                        .map(|i| RewardEntry {
                            wallet: wallet.clone(),
                            scid: i.scid.clone(),
                            amount: i.amount,
                            is_nft: i.is_nft,
                        })
                        .collect();
                    distributor.batch_submit_rewards(&entries).await?
                };
                for item in receipt.items.iter_mut() {
                    item.settled = true;
                }
                Ok(result.reference)
            }
            // No batch stake on the distributor: one call per record, stop at
            // the first failure.
            SettlementMode::Stake => {
                let mut refs = Vec::with_capacity(receipt.items.len());
                for item in receipt.items.iter_mut() {
                    let r = distributor
                        .submit_reward_and_stake(&wallet, &item.scid, item.amount, item.is_nft)
                        .await?;
                    item.settled = true;
                    refs.push(r.reference);
                }
                Ok(refs.join(","))
            }
        }
    }

    /// Give back every unsettled reservation. A storage failure here leaves
    /// the receipt in `Reserved` for manual reconciliation.
    fn compensate(
        &self,
        receipt: &mut ClaimReceipt,
        reason: &str,
        now: Timestamp,
    ) -> Result<(), ScidError> {
        let refunds: Vec<(Scid, Balance)> = receipt
            .items
            .iter()
            .filter(|i| !i.settled)
            .map(|i| (i.scid.clone(), i.amount))
            .collect();
        let scids: Vec<Scid> = refunds.iter().map(|(s, _)| s.clone()).collect();

        let rolled_back = self.db.update_records(&scids, |records| {
            for (r, (_, amount)) in records.iter_mut().zip(&refunds) {
                r.ogun_rewards_claimed = r.ogun_rewards_claimed.saturating_sub(*amount);
            }
            Ok(())
        });
        if let Err(e) = rolled_back {
            error!(
                claim_id = receipt.claim_id,
                profile_id = %receipt.profile_id,
                error = %e,
                "compensation failed, claim left reserved"
            );
            // Keep the per-item settled flags for whoever reconciles this.
            self.record_phase(receipt);
            return Err(e);
        }

        receipt.phase = ClaimPhase::Compensated { reason: reason.to_string() };
        receipt.closed_at = Some(now);
        self.record_phase(receipt);
        warn!(
            claim_id = receipt.claim_id,
            profile_id = %receipt.profile_id,
            refunded = refunds.len(),
            reason,
            phase = "compensated",
            "claim compensated"
        );
        Ok(())
    }

    /// Persist a receipt after the reservation. The ledger is already in its
    /// final state, so a failed write only costs the audit trail.
    fn record_phase(&self, receipt: &ClaimReceipt) {
        if let Err(e) = self.db.put_claim(receipt) {
            error!(
                claim_id = receipt.claim_id,
                profile_id = %receipt.profile_id,
                phase = ?receipt.phase,
                error = %e,
                "claim receipt not updated"
            );
        }
    }

    fn finish(
        &self,
        receipt: &ClaimReceipt,
        settlement_reference: Option<String>,
        deferred: bool,
    ) -> ClaimOutcome {
        let total = receipt.total();
        let n = Notification::RewardsClaimed {
            profile_id: receipt.profile_id.clone(),
            total,
            record_count: receipt.items.len(),
            deferred,
        };
        if let Err(e) = self.notifier.notify(n) {
            warn!(claim_id = receipt.claim_id, error = %e, "claim notification dropped");
        }
        let remaining_unclaimed = match self.unclaimed_rewards(&receipt.profile_id) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(claim_id = receipt.claim_id, error = %e, "remaining balance unavailable");
                None
            }
        };
        ClaimOutcome {
            claim_id: receipt.claim_id,
            profile_id: receipt.profile_id.clone(),
            mode: receipt.mode,
            total,
            record_count: receipt.items.len(),
            settlement_reference,
            deferred,
            remaining_unclaimed,
        }
    }
}
