//! Pure reward arithmetic. No storage, no clock.

use serde::{Deserialize, Serialize};

use scid_core::constants::BPS_DENOMINATOR;
use scid_core::{Balance, RewardPolicy, ScidError};

/// Uncapped reward for one qualifying stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardQuote {
    /// Base reward after verified and duration bonuses.
    pub base: Balance,
    pub creator: Balance,
    pub listener: Balance,
}

fn apply_bps(amount: Balance, bps: u32) -> Balance {
    amount * bps as Balance / BPS_DENOMINATOR as Balance
}

/// Price one stream.
///
/// base  = (nft ? nft_rate : base_rate) × (verified ? bonus : 1) × min(duration / reference, cap)
/// split = base × creator_share, base × listener_share
pub fn compute_split(
    policy: &RewardPolicy,
    is_nft: bool,
    verified: bool,
    duration_secs: u32,
) -> Result<RewardQuote, ScidError> {
    if duration_secs < policy.min_stream_duration_secs {
        return Err(ScidError::StreamTooShort {
            duration: duration_secs,
            min: policy.min_stream_duration_secs,
        });
    }

    let mut base = if is_nft {
        policy.nft_reward_per_stream
    } else {
        policy.base_reward_per_stream
    };
    if verified {
        base = apply_bps(base, policy.verified_bonus_bps);
    }

    // Ratio kept exact: base × min(d × 10⁴, cap_bps × ref) / (ref × 10⁴).
    let reference = policy.reference_stream_duration_secs.max(1) as Balance;
    let denom = BPS_DENOMINATOR as Balance;
    let scaled = (duration_secs as Balance * denom).min(policy.max_duration_bonus_bps as Balance * reference);
    base = base * scaled / (reference * denom);

    Ok(RewardQuote {
        base,
        creator: apply_bps(base, policy.creator_share_bps),
        listener: apply_bps(base, policy.listener_share_bps),
    })
}

/// Clamp `amount` to what is left of a daily budget.
/// Returns `(paid, limited)`; `limited` is set when any of `amount` was cut.
pub fn clamp_to_budget(amount: Balance, earned_today: Balance, cap: Balance) -> (Balance, bool) {
    let remaining = cap.saturating_sub(earned_today);
    let paid = amount.min(remaining);
    (paid, paid < amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nft_unverified_three_minutes() {
        let q = compute_split(&RewardPolicy::default(), true, false, 180).unwrap();
        assert_eq!(q.base, 500_000);
        assert_eq!(q.creator, 350_000);
        assert_eq!(q.listener, 150_000);
    }

    #[test]
    fn non_nft_is_a_tenth() {
        let q = compute_split(&RewardPolicy::default(), false, false, 180).unwrap();
        assert_eq!(q.base, 50_000);
        assert_eq!(q.creator, 35_000);
        assert_eq!(q.listener, 15_000);
    }

    #[test]
    fn verified_bonus_and_duration_cap() {
        let p = RewardPolicy::default();
        // 1.5 × 2 (capped at 360s and beyond)
        let q = compute_split(&p, true, true, 3_600).unwrap();
        assert_eq!(q.base, 1_500_000);
        // Half-length stream earns half.
        let half = compute_split(&p, true, false, 90).unwrap();
        assert_eq!(half.base, 250_000);
        // 30s: 500_000 × 30/180
        let min = compute_split(&p, true, false, 30).unwrap();
        assert_eq!(min.base, 83_333);
    }

    #[test]
    fn short_stream_rejected() {
        let err = compute_split(&RewardPolicy::default(), true, false, 29).unwrap_err();
        assert!(matches!(err, ScidError::StreamTooShort { duration: 29, min: 30 }));
    }

    #[test]
    fn clamp_behaviour() {
        assert_eq!(clamp_to_budget(10, 0, 100), (10, false));
        assert_eq!(clamp_to_budget(10, 95, 100), (5, true));
        assert_eq!(clamp_to_budget(10, 100, 100), (0, true));
        assert_eq!(clamp_to_budget(0, 100, 100), (0, false));
    }
}
