use serde::{Deserialize, Serialize};

use crate::error::ScidError;
use crate::types::{Balance, ListenerKey, Scid};

/// Reward activity pushed to creators and listeners.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    CreatorRewardEarned {
        profile_id: String,
        scid: Scid,
        track_id: String,
        amount: Balance,
        listener: Option<ListenerKey>,
    },
    ListenerRewardEarned {
        listener: ListenerKey,
        scid: Scid,
        track_id: String,
        amount: Balance,
    },
    RewardsClaimed {
        profile_id: String,
        total: Balance,
        record_count: usize,
        deferred: bool,
    },
}

impl Notification {
    /// Who the notification is addressed to.
    pub fn recipient(&self) -> String {
        match self {
            Notification::CreatorRewardEarned { profile_id, .. }
            | Notification::RewardsClaimed { profile_id, .. } => profile_id.clone(),
            Notification::ListenerRewardEarned { listener, .. } => listener.storage_key(),
        }
    }
}

/// Fire-and-forget sink. Implementations must not block; callers log and
/// drop any error.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification) -> Result<(), ScidError>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _notification: Notification) -> Result<(), ScidError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_kind() {
        let n = Notification::ListenerRewardEarned {
            listener: ListenerKey::Profile("fan".into()),
            scid: Scid::normalized("sc-pol-7b3a-2400001"),
            track_id: "t1".into(),
            amount: 150_000,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["kind"], "listener_reward_earned");
        assert_eq!(json["scid"], "SC-POL-7B3A-2400001");
        assert_eq!(n.recipient(), "profile:fan");
    }
}
