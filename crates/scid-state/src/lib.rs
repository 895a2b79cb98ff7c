pub mod db;
pub mod query;
pub mod registry;

pub use db::LedgerDb;
pub use query::{LedgerQuery, LedgerStats, SearchFilter, SearchPage, TopTrack};
pub use registry::{BulkRegisterResult, OnChainProof, RegisterRequest, ScidRegistry};
