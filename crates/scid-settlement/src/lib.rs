pub mod anchor;
pub mod claim;
pub mod distributor;
pub mod relay;

pub use anchor::{AnchorService, OnChainRegistration, RegistryContract};
pub use claim::{ClaimCoordinator, ClaimOutcome};
pub use distributor::{
    check_batch, failure_reason, to_wei, Distributor, RewardEntry, SettlementReceipt,
};
pub use relay::{RelayDistributor, RelayRegistry};
