pub mod engine;
pub mod notify;
pub mod split;

pub use engine::{RewardEngine, StreamEvent, StreamSplit};
pub use notify::ChannelNotifier;
pub use split::{clamp_to_budget, compute_split, RewardQuote};
