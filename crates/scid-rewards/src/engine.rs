use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use scid_core::constants::MAX_STREAM_CLOCK_SKEW_SECS;
use scid_core::{
    Balance, ListenerKey, Notification, Notifier, ProfileDirectory, RewardPolicy, Scid,
    ScidError, ScidStatus, Timestamp, TrackDirectory,
};
use scid_state::LedgerDb;

use crate::split::{clamp_to_budget, compute_split};

/// One playback reported by a client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamEvent {
    pub scid: String,
    pub listener_profile_id: Option<String>,
    pub listener_wallet: Option<String>,
    pub duration_secs: u32,
    /// When the client says the stream happened. Recorded as `last_stream_at`
    /// but never used for daily windows.
    pub timestamp: Timestamp,
}

/// Outcome of `RewardEngine::log_stream`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSplit {
    pub scid: Scid,
    pub track_id: String,
    pub creator_profile_id: String,
    pub listener: Option<ListenerKey>,
    pub is_nft: bool,
    pub verified: bool,
    /// Base reward after bonuses, before the split.
    pub base_reward: Balance,
    pub creator_reward: Balance,
    pub listener_reward: Balance,
    pub creator_daily_limit_reached: bool,
    pub listener_daily_limit_reached: bool,
    pub total_streams: u64,
}

/// Prices streams and accrues them on the ledger.
pub struct RewardEngine {
    pub db: Arc<LedgerDb>,
    tracks: Arc<dyn TrackDirectory>,
    profiles: Arc<dyn ProfileDirectory>,
    notifier: Arc<dyn Notifier>,
    policy: RewardPolicy,
}

impl RewardEngine {
    pub fn new(
        db: Arc<LedgerDb>,
        tracks: Arc<dyn TrackDirectory>,
        profiles: Arc<dyn ProfileDirectory>,
        notifier: Arc<dyn Notifier>,
        policy: RewardPolicy,
    ) -> Self {
        Self { db, tracks, profiles, notifier, policy }
    }

    pub fn policy(&self) -> &RewardPolicy {
        &self.policy
    }

    /// Validate, price and record one stream against the ledger clock `now`.
    ///
    /// Daily windows roll on `now`, not on the client's timestamp; events
    /// stamped more than `MAX_STREAM_CLOCK_SKEW_SECS` ahead of `now` are
    /// rejected. Creator and listener shares are clamped to their daily budgets inside
    /// the same transaction that bumps the stream counter, so concurrent
    /// streams on one SCid or one listener never overshoot a cap. Nothing is
    /// written when validation or persistence fails.
    pub fn log_stream(&self, event: &StreamEvent, now: Timestamp) -> Result<StreamSplit, ScidError> {
        // ── Validation ────────────────────────────────────────────────────────
        if event.duration_secs < self.policy.min_stream_duration_secs {
            return Err(ScidError::StreamTooShort {
                duration: event.duration_secs,
                min: self.policy.min_stream_duration_secs,
            });
        }
        if event.timestamp > now.saturating_add(MAX_STREAM_CLOCK_SKEW_SECS) {
            return Err(ScidError::StreamFromFuture { timestamp: event.timestamp, now });
        }
        let scid = scid_ident::parse(&event.scid)?.scid;

        let record = self
            .db
            .get_record(&scid)?
            .ok_or_else(|| ScidError::ScidNotFound(scid.to_string()))?;
        if record.status == ScidStatus::Revoked {
            return Err(ScidError::Revoked(scid.to_string()));
        }

        // ── Pricing ───────────────────────────────────────────────────────────
        let track = self
            .tracks
            .track(&record.track_id)?
            .ok_or_else(|| ScidError::TrackNotFound(record.track_id.clone()))?;
        let is_nft = track.is_nft();
        let verified = self
            .profiles
            .profile(&record.profile_id)?
            .map(|p| p.verified)
            .unwrap_or(false);
        let quote = compute_split(&self.policy, is_nft, verified, event.duration_secs)?;

        let listener = ListenerKey::resolve(
            event.listener_profile_id.as_deref(),
            event.listener_wallet.as_deref(),
        );

        // ── Accrual ───────────────────────────────────────────────────────────
        let played_at = event.timestamp.min(now);
        let policy = &self.policy;
        let split = self.db.update_record_and_listener(&scid, listener.as_ref(), |rec, ledger| {
            if rec.status == ScidStatus::Revoked {
                return Err(ScidError::Revoked(rec.scid.to_string()));
            }

            rec.roll_daily(now);
            let (creator_reward, creator_limited) =
                clamp_to_budget(quote.creator, rec.daily_ogun_earned, policy.max_daily_creator_reward);

            let (listener_reward, listener_limited) = match ledger {
                Some(l) => {
                    l.roll_daily(now);
                    let (paid, limited) = clamp_to_budget(
                        quote.listener,
                        l.daily_ogun_earned,
                        policy.max_daily_listener_reward,
                    );
                    l.daily_ogun_earned += paid;
                    l.total_ogun_earned += paid;
                    (paid, limited)
                }
                // Anonymous stream: listener share is forfeited.
                None => (0, false),
            };

            rec.stream_count += 1;
            rec.ogun_rewards_earned += creator_reward;
            rec.daily_ogun_earned += creator_reward;
            rec.last_stream_at = Some(played_at);

            Ok(StreamSplit {
                scid: rec.scid.clone(),
                track_id: rec.track_id.clone(),
                creator_profile_id: rec.profile_id.clone(),
                listener: listener.clone(),
                is_nft,
                verified,
                base_reward: quote.base,
                creator_reward,
                listener_reward,
                creator_daily_limit_reached: creator_limited,
                listener_daily_limit_reached: listener_limited,
                total_streams: rec.stream_count,
            })
        })?;

        debug!(
            scid = %split.scid,
            base = split.base_reward,
            creator = split.creator_reward,
            listener = split.listener_reward,
            "stream accrued"
        );
        if split.creator_daily_limit_reached {
            info!(scid = %split.scid, "creator daily limit reached");
        }

        self.dispatch(&split);
        Ok(split)
    }

    /// Best effort; the ledger write has already committed.
    fn dispatch(&self, split: &StreamSplit) {
        if split.creator_reward > 0 {
            let n = Notification::CreatorRewardEarned {
                profile_id: split.creator_profile_id.clone(),
                scid: split.scid.clone(),
                track_id: split.track_id.clone(),
                amount: split.creator_reward,
                listener: split.listener.clone(),
            };
            if let Err(e) = self.notifier.notify(n) {
                warn!(scid = %split.scid, error = %e, "creator notification dropped");
            }
        }
        if let (Some(listener), true) = (&split.listener, split.listener_reward > 0) {
            let n = Notification::ListenerRewardEarned {
                listener: listener.clone(),
                scid: split.scid.clone(),
                track_id: split.track_id.clone(),
                amount: split.listener_reward,
            };
            if let Err(e) = self.notifier.notify(n) {
                warn!(scid = %split.scid, error = %e, "listener notification dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::ChannelNotifier;
    use scid_core::{
        Catalog, NftData, NullNotifier, ProfileInfo, TrackInfo, MICRO_OGUN_PER_OGUN,
        SECONDS_PER_DAY,
    };
    use scid_state::{RegisterRequest, ScidRegistry};
    use std::sync::Mutex;

    // 2024-06-01T00:00:00Z
    const NOW: Timestamp = 1_717_200_000;

    fn temp_db(name: &str) -> LedgerDb {
        let dir = std::env::temp_dir().join(format!("scid_rewards_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        LedgerDb::open(&dir).expect("open temp db")
    }

    fn catalog(nft: bool, verified: bool) -> Arc<Catalog> {
        Arc::new(Catalog::new(
            vec![TrackInfo {
                track_id: "t1".into(),
                profile_id: Some("artist".into()),
                title: Some("Song".into()),
                nft_data: nft.then(|| NftData { token_id: Some(1), ..NftData::default() }),
                playback_count: 0,
                deleted: false,
            }],
            vec![ProfileInfo {
                profile_id: "artist".into(),
                display_name: None,
                verified,
                wallet_address: None,
            }],
        ))
    }

    fn setup(name: &str, nft: bool, verified: bool, notifier: Arc<dyn Notifier>) -> (RewardEngine, Scid) {
        let db = Arc::new(temp_db(name));
        let reg = ScidRegistry::new(db.clone());
        let rec = reg
            .register(
                &RegisterRequest {
                    track_id: "t1".into(),
                    profile_id: "artist".into(),
                    ..RegisterRequest::default()
                },
                NOW,
            )
            .unwrap();
        let cat = catalog(nft, verified);
        let engine = RewardEngine::new(db, cat.clone(), cat, notifier, RewardPolicy::default());
        (engine, rec.scid)
    }

    fn event(scid: &Scid, listener: Option<&str>, duration: u32, ts: Timestamp) -> StreamEvent {
        StreamEvent {
            scid: scid.to_string(),
            listener_profile_id: listener.map(str::to_string),
            listener_wallet: None,
            duration_secs: duration,
            timestamp: ts,
        }
    }

    /// Log a stream whose client timestamp matches the ledger clock.
    fn stream(
        engine: &RewardEngine,
        scid: &Scid,
        listener: Option<&str>,
        duration: u32,
        ts: Timestamp,
    ) -> Result<StreamSplit, ScidError> {
        engine.log_stream(&event(scid, listener, duration, ts), ts)
    }

    #[test]
    fn nft_stream_splits_seventy_thirty() {
        let (engine, scid) = setup("nft_split", true, false, Arc::new(NullNotifier));
        let s = stream(&engine, &scid, Some("fan"), 180, NOW).unwrap();
        assert_eq!(s.base_reward, 500_000);
        assert_eq!(s.creator_reward, 350_000);
        assert_eq!(s.listener_reward, 150_000);
        assert!(!s.creator_daily_limit_reached);
        assert_eq!(s.total_streams, 1);

        let rec = engine.db.get_record(&scid).unwrap().unwrap();
        assert_eq!(rec.ogun_rewards_earned, 350_000);
        assert_eq!(rec.daily_ogun_earned, 350_000);
        assert_eq!(rec.last_stream_at, Some(NOW));
        let fan = engine
            .db
            .get_listener(&ListenerKey::Profile("fan".into()))
            .unwrap()
            .unwrap();
        assert_eq!(fan.daily_ogun_earned, 150_000);
    }

    #[test]
    fn verified_artist_gets_bonus() {
        let (engine, scid) = setup("verified", true, true, Arc::new(NullNotifier));
        let s = stream(&engine, &scid, Some("fan"), 180, NOW).unwrap();
        assert_eq!(s.base_reward, 750_000);
        assert!(s.verified);
    }

    #[test]
    fn creator_cap_zeroes_creator_share_only() {
        let (engine, scid) = setup("creator_cap", true, false, Arc::new(NullNotifier));
        engine
            .db
            .update_record(&scid, |r| {
                r.daily_ogun_earned = 100 * MICRO_OGUN_PER_OGUN;
                r.last_daily_reset = Some(NOW);
                Ok(())
            })
            .unwrap();

        let s = stream(&engine, &scid, Some("fan"), 180, NOW + 60).unwrap();
        assert_eq!(s.creator_reward, 0);
        assert!(s.creator_daily_limit_reached);
        assert_eq!(s.listener_reward, 150_000);
        assert!(!s.listener_daily_limit_reached);
        assert_eq!(s.total_streams, 1, "stream still counted");
    }

    #[test]
    fn daily_window_resets_next_utc_day() {
        let (engine, scid) = setup("reset", true, false, Arc::new(NullNotifier));
        engine
            .db
            .update_record(&scid, |r| {
                r.daily_ogun_earned = 100 * MICRO_OGUN_PER_OGUN;
                r.last_daily_reset = Some(NOW);
                Ok(())
            })
            .unwrap();
        let s = stream(&engine, &scid, None, 180, NOW + SECONDS_PER_DAY)
            .unwrap();
        assert_eq!(s.creator_reward, 350_000);
        let rec = engine.db.get_record(&scid).unwrap().unwrap();
        assert_eq!(rec.daily_ogun_earned, 350_000);
        assert_eq!(rec.last_daily_reset, Some(NOW + SECONDS_PER_DAY));
    }

    #[test]
    fn listener_cap_is_per_listener() {
        let (engine, scid) = setup("listener_cap", true, false, Arc::new(NullNotifier));
        // 50 OGUN / 0.15 OGUN = 333.3 streams
        let mut last = None;
        for i in 0..334 {
            last = Some(stream(&engine, &scid, Some("fan"), 180, NOW + i).unwrap());
        }
        let last = last.unwrap();
        assert_eq!(last.listener_reward, 50 * MICRO_OGUN_PER_OGUN - 333 * 150_000);
        assert!(last.listener_daily_limit_reached);

        let other = stream(&engine, &scid, Some("other"), 180, NOW + 400).unwrap();
        assert_eq!(other.listener_reward, 150_000);
    }

    #[test]
    fn anonymous_stream_forfeits_listener_share() {
        let (engine, scid) = setup("anon", false, false, Arc::new(NullNotifier));
        let s = stream(&engine, &scid, None, 180, NOW).unwrap();
        assert_eq!(s.creator_reward, 35_000);
        assert_eq!(s.listener_reward, 0);
        assert!(s.listener.is_none());
    }

    #[test]
    fn rejected_events_leave_no_trace() {
        let (engine, scid) = setup("reject", true, false, Arc::new(NullNotifier));
        assert!(matches!(
            stream(&engine, &scid, Some("fan"), 29, NOW),
            Err(ScidError::StreamTooShort { .. })
        ));
        assert!(matches!(
            stream(&engine, &Scid("not-an-scid".into()), None, 180, NOW),
            Err(ScidError::InvalidScid { .. })
        ));
        assert!(matches!(
            stream(&engine, &Scid("SC-POL-0000-2400001".into()), None, 180, NOW),
            Err(ScidError::ScidNotFound(_))
        ));
        let rec = engine.db.get_record(&scid).unwrap().unwrap();
        assert_eq!(rec.stream_count, 0);
        assert_eq!(rec.ogun_rewards_earned, 0);
    }

    #[test]
    fn future_stamped_streams_cannot_reopen_the_daily_cap() {
        let (engine, scid) = setup("future_stamp", true, false, Arc::new(NullNotifier));
        // Fill today's creator budget: 100 OGUN / 0.35 OGUN per stream.
        for i in 0..286 {
            stream(&engine, &scid, None, 180, NOW + i).unwrap();
        }
        let capped = engine.db.get_record(&scid).unwrap().unwrap();
        assert_eq!(capped.daily_ogun_earned, 100 * MICRO_OGUN_PER_OGUN);

        // Events stamped on later days are refused while the clock is still today.
        for d in 1..5 {
            let ev = event(&scid, Some("fan"), 180, NOW + d * SECONDS_PER_DAY);
            assert!(matches!(
                engine.log_stream(&ev, NOW + 300),
                Err(ScidError::StreamFromFuture { .. })
            ));
        }
        // Small client skew is tolerated but still accrues against today.
        let skewed = engine
            .log_stream(&event(&scid, None, 180, NOW + 500), NOW + 400)
            .unwrap();
        assert_eq!(skewed.creator_reward, 0);
        assert!(skewed.creator_daily_limit_reached);

        let rec = engine.db.get_record(&scid).unwrap().unwrap();
        assert_eq!(rec.ogun_rewards_earned, 100 * MICRO_OGUN_PER_OGUN);
        assert_eq!(rec.last_daily_reset, Some(NOW));
        assert_eq!(rec.last_stream_at, Some(NOW + 400), "clamped to the ledger clock");

        // The real next day resets as usual.
        let next = engine
            .log_stream(&event(&scid, None, 180, NOW + SECONDS_PER_DAY), NOW + SECONDS_PER_DAY)
            .unwrap();
        assert_eq!(next.creator_reward, 350_000);
    }

    #[test]
    fn backdated_stream_accrues_to_current_day() {
        let (engine, scid) = setup("backdated", true, false, Arc::new(NullNotifier));
        engine
            .db
            .update_record(&scid, |r| {
                r.daily_ogun_earned = 100 * MICRO_OGUN_PER_OGUN;
                r.last_daily_reset = Some(NOW);
                Ok(())
            })
            .unwrap();
        let ev = event(&scid, Some("fan"), 180, NOW - 2 * SECONDS_PER_DAY);
        let s = engine.log_stream(&ev, NOW + 60).unwrap();
        assert_eq!(s.creator_reward, 0);
        assert!(s.creator_daily_limit_reached);
    }

    struct FailingNotifier(Mutex<usize>);

    impl Notifier for FailingNotifier {
        fn notify(&self, _n: Notification) -> Result<(), ScidError> {
            *self.0.lock().unwrap() += 1;
            Err(ScidError::Notification("down".into()))
        }
    }

    #[test]
    fn notification_failure_keeps_ledger_write() {
        let notifier = Arc::new(FailingNotifier(Mutex::new(0)));
        let (engine, scid) = setup("notify_fail", true, false, notifier.clone());
        let s = stream(&engine, &scid, Some("fan"), 180, NOW).unwrap();
        assert_eq!(s.creator_reward, 350_000);
        assert_eq!(*notifier.0.lock().unwrap(), 2);
        assert_eq!(engine.db.get_record(&scid).unwrap().unwrap().stream_count, 1);
    }

    #[tokio::test]
    async fn notifications_carry_both_parties() {
        let (notifier, mut rx) = ChannelNotifier::channel(8);
        let (engine, scid) = setup("notify_ok", true, false, Arc::new(notifier));
        stream(&engine, &scid, Some("fan"), 180, NOW).unwrap();

        match rx.recv().await.unwrap() {
            Notification::CreatorRewardEarned { profile_id, amount, .. } => {
                assert_eq!(profile_id, "artist");
                assert_eq!(amount, 350_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            Notification::ListenerRewardEarned { listener, amount, .. } => {
                assert_eq!(listener, ListenerKey::Profile("fan".into()));
                assert_eq!(amount, 150_000);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
