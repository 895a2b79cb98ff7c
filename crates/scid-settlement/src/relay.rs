use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use scid_core::{Balance, DistributorConfig, RegistryConfig, Scid, ScidError};

use crate::anchor::{OnChainRegistration, RegistryContract};
use crate::distributor::{check_batch, to_wei, Distributor, RewardEntry, SettlementReceipt};

/// JSON-RPC 2.0 over HTTP POST to a signing relay that holds the contract
/// keys. Transport and RPC errors come back as plain strings; callers wrap
/// them in the error variant for their side of the system.
struct RelayClient {
    url: String,
    client: reqwest::Client,
}

impl RelayClient {
    fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Call a JSON-RPC method and return the `result` field.
    async fn call(&self, method: &str, params: Value) -> Result<Value, String> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("connecting to relay at {}: {e}", self.url))?;

        let json: Value = resp
            .json()
            .await
            .map_err(|e| format!("parsing relay response: {e}"))?;

        if let Some(err) = json.get("error") {
            let reason = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(reason);
        }

        Ok(json["result"].clone())
    }
}

fn settlement_failed(reason: String) -> ScidError {
    ScidError::Settlement { reason, settled: 0 }
}

fn parse_receipt(result: &Value) -> Result<SettlementReceipt, String> {
    let reference = result["transactionHash"]
        .as_str()
        .ok_or("missing transactionHash in relay response")?
        .to_string();
    Ok(SettlementReceipt {
        reference,
        block_number: result["blockNumber"].as_u64(),
    })
}

// ── Distributor ──────────────────────────────────────────────────────────────

/// `Distributor` backed by the streaming-rewards relay.
pub struct RelayDistributor {
    rpc: RelayClient,
    contract_address: String,
}

impl RelayDistributor {
    pub fn new(cfg: &DistributorConfig) -> Self {
        Self {
            rpc: RelayClient::new(&cfg.endpoint),
            contract_address: cfg.contract_address.clone(),
        }
    }

    async fn submit(
        &self,
        method: &str,
        wallet: &str,
        scid: &Scid,
        amount: Balance,
        is_nft: bool,
    ) -> Result<SettlementReceipt, ScidError> {
        let amount_wei = to_wei(amount)?;
        debug!(method, wallet, scid = %scid, amount, "submitting reward");
        let result = self
            .rpc
            .call(
                method,
                json!({
                    "contract": self.contract_address,
                    "user": wallet,
                    "scid": scid.as_str(),
                    "amount": amount_wei.to_string(),
                    "isNft": is_nft,
                }),
            )
            .await
            .map_err(|reason| {
                warn!(method, scid = %scid, %reason, "relay call failed");
                settlement_failed(reason)
            })?;
        parse_receipt(&result).map_err(settlement_failed)
    }
}

#[async_trait]
impl Distributor for RelayDistributor {
    async fn submit_reward(
        &self,
        wallet: &str,
        scid: &Scid,
        amount: Balance,
        is_nft: bool,
    ) -> Result<SettlementReceipt, ScidError> {
        self.submit("rewards_submitReward", wallet, scid, amount, is_nft)
            .await
    }

    async fn submit_reward_and_stake(
        &self,
        wallet: &str,
        scid: &Scid,
        amount: Balance,
        is_nft: bool,
    ) -> Result<SettlementReceipt, ScidError> {
        self.submit("rewards_submitRewardAndStake", wallet, scid, amount, is_nft)
            .await
    }

    async fn batch_submit_rewards(
        &self,
        entries: &[RewardEntry],
    ) -> Result<SettlementReceipt, ScidError> {
        check_batch(entries.len())?;

        // The contract takes parallel arrays.
        let mut users = Vec::with_capacity(entries.len());
        let mut scids = Vec::with_capacity(entries.len());
        let mut amounts = Vec::with_capacity(entries.len());
        let mut is_nfts = Vec::with_capacity(entries.len());
        for e in entries {
            users.push(e.wallet.clone());
            scids.push(e.scid.as_str().to_string());
            amounts.push(to_wei(e.amount)?.to_string());
            is_nfts.push(e.is_nft);
        }

        debug!(count = entries.len(), "submitting reward batch");
        let result = self
            .rpc
            .call(
                "rewards_batchSubmitRewards",
                json!({
                    "contract": self.contract_address,
                    "users": users,
                    "scids": scids,
                    "amounts": amounts,
                    "isNfts": is_nfts,
                }),
            )
            .await
            .map_err(|reason| {
                warn!(count = entries.len(), %reason, "relay batch failed");
                settlement_failed(reason)
            })?;
        parse_receipt(&result).map_err(settlement_failed)
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// `RegistryContract` backed by the SCid registry relay.
pub struct RelayRegistry {
    rpc: RelayClient,
    contract_address: String,
    chain_id: u64,
}

impl RelayRegistry {
    pub fn new(cfg: &RegistryConfig) -> Self {
        Self {
            rpc: RelayClient::new(&cfg.endpoint),
            contract_address: cfg.contract_address.clone(),
            chain_id: cfg.chain_id,
        }
    }

    async fn call(&self, method: &str, mut params: Value) -> Result<Value, ScidError> {
        params["contract"] = json!(self.contract_address);
        params["chainId"] = json!(self.chain_id);
        self.rpc
            .call(method, params)
            .await
            .map_err(ScidError::RegistryUnavailable)
    }
}

#[async_trait]
impl RegistryContract for RelayRegistry {
    fn contract_address(&self) -> &str {
        &self.contract_address
    }

    async fn register(
        &self,
        scid: &Scid,
        owner: &str,
        token_id: u64,
        nft_contract: &str,
        metadata_hash: &str,
    ) -> Result<OnChainRegistration, ScidError> {
        let result = self
            .call(
                "registry_register",
                json!({
                    "scid": scid.as_str(),
                    "owner": owner,
                    "tokenId": token_id,
                    "nftContract": nft_contract,
                    "metadataHash": metadata_hash,
                }),
            )
            .await?;
        let transaction_hash = result["transactionHash"]
            .as_str()
            .ok_or_else(|| {
                ScidError::RegistryUnavailable("missing transactionHash in relay response".into())
            })?
            .to_string();
        let block_number = result["blockNumber"].as_u64().ok_or_else(|| {
            ScidError::RegistryUnavailable("missing blockNumber in relay response".into())
        })?;
        Ok(OnChainRegistration {
            transaction_hash,
            block_number,
        })
    }

    async fn is_registered(&self, scid: &Scid) -> Result<bool, ScidError> {
        let result = self
            .call("registry_isRegistered", json!({ "scid": scid.as_str() }))
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn verify_ownership(&self, scid: &Scid, owner: &str) -> Result<bool, ScidError> {
        let result = self
            .call(
                "registry_verifyOwnership",
                json!({ "scid": scid.as_str(), "owner": owner }),
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }
}
