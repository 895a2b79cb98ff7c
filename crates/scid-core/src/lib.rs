pub mod config;
pub mod constants;
pub mod directory;
pub mod error;
pub mod notify;
pub mod record;
pub mod types;

pub use config::{DistributorConfig, LedgerConfig, RegistryConfig, RewardPolicy, ServiceIdentity};
pub use constants::*;
pub use directory::{Catalog, NftData, ProfileDirectory, ProfileInfo, TrackDirectory, TrackInfo};
pub use error::{ErrorKind, ScidError};
pub use notify::{Notification, Notifier, NullNotifier};
pub use record::*;
pub use types::*;
