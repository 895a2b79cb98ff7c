use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scid_core::{Scid, ScidError, ScidRecord, ScidStatus, Timestamp};
use scid_state::{OnChainProof, ScidRegistry};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainRegistration {
    pub transaction_hash: String,
    pub block_number: u64,
}

/// The on-chain SCid registry contract.
#[async_trait]
pub trait RegistryContract: Send + Sync {
    fn contract_address(&self) -> &str;

    async fn register(
        &self,
        scid: &Scid,
        owner: &str,
        token_id: u64,
        nft_contract: &str,
        metadata_hash: &str,
    ) -> Result<OnChainRegistration, ScidError>;

    async fn is_registered(&self, scid: &Scid) -> Result<bool, ScidError>;

    async fn verify_ownership(&self, scid: &Scid, owner: &str) -> Result<bool, ScidError>;
}

/// Anchors ledger SCids in the on-chain registry and records the proof.
pub struct AnchorService {
    registry: Arc<ScidRegistry>,
    contract: Option<Arc<dyn RegistryContract>>,
}

impl AnchorService {
    pub fn new(registry: Arc<ScidRegistry>, contract: Option<Arc<dyn RegistryContract>>) -> Self {
        Self { registry, contract }
    }

    /// Register `scid` on-chain, then mark the ledger record `REGISTERED`.
    pub async fn register_on_chain(
        &self,
        scid: &str,
        owner_wallet: &str,
        token_id: u64,
        nft_contract: &str,
        metadata_hash: Option<&str>,
        now: Timestamp,
    ) -> Result<ScidRecord, ScidError> {
        let record = self
            .registry
            .get_by_scid(scid)?
            .ok_or_else(|| ScidError::ScidNotFound(scid.to_string()))?;

        match record.status {
            ScidStatus::Registered => {
                return Err(ScidError::AlreadyAnchored {
                    scid: record.scid.to_string(),
                    tx_hash: record.transaction_hash.clone().unwrap_or_default(),
                })
            }
            ScidStatus::Revoked => return Err(ScidError::Revoked(record.scid.to_string())),
            ScidStatus::Pending | ScidStatus::Transferred => {}
        }

        let Some(contract) = &self.contract else {
            warn!(scid = %record.scid, "registry not configured, skipping on-chain registration");
            return Err(ScidError::RegistryUnavailable("registry not configured".into()));
        };

        let metadata = metadata_hash
            .map(str::to_string)
            .or_else(|| record.metadata_hash.clone())
            .unwrap_or_default();
        let anchored = contract
            .register(&record.scid, owner_wallet, token_id, nft_contract, &metadata)
            .await?;

        let proof = OnChainProof {
            transaction_hash: anchored.transaction_hash,
            block_number: anchored.block_number,
            contract_address: contract.contract_address().to_string(),
        };
        let updated = self
            .registry
            .mark_registered(record.scid.as_str(), &proof, now)?;
        info!(
            scid = %updated.scid,
            tx = %proof.transaction_hash,
            block = proof.block_number,
            "SCid anchored on-chain"
        );
        Ok(updated)
    }

    /// False when no registry is configured.
    pub async fn is_registered_on_chain(&self, scid: &str) -> Result<bool, ScidError> {
        match &self.contract {
            Some(c) => c.is_registered(&Scid::normalized(scid)).await,
            None => Ok(false),
        }
    }

    /// False when no registry is configured.
    pub async fn verify_on_chain_ownership(
        &self,
        scid: &str,
        claimed_owner: &str,
    ) -> Result<bool, ScidError> {
        match &self.contract {
            Some(c) => c.verify_ownership(&Scid::normalized(scid), claimed_owner).await,
            None => Ok(false),
        }
    }
}
