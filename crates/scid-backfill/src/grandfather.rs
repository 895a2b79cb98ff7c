use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use scid_core::{
    format_ogun, Balance, ChainCode, RetroactiveCredit, RewardPolicy, Scid, ScidError,
    ServiceIdentity, Timestamp, TrackDirectory, TrackInfo,
};
use scid_state::{RegisterRequest, ScidRegistry};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardBackfillOptions {
    pub dry_run: bool,
    /// Maximum number of tracks to process; 0 means no limit.
    pub limit: usize,
    /// Tracks with fewer historical plays are ignored.
    pub min_plays: u64,
    /// Chain code for SCids created on the way.
    pub chain_code: ChainCode,
}

impl Default for RewardBackfillOptions {
    fn default() -> Self {
        Self {
            dry_run: true,
            limit: 0,
            min_plays: 1,
            chain_code: ChainCode::Polygon,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackCredit {
    pub track_id: String,
    pub title: String,
    pub profile_id: String,
    /// `None` on a dry run for a track without an SCid.
    pub scid: Option<Scid>,
    pub playback_count: u64,
    pub is_nft: bool,
    pub ogun_credited: Balance,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBackfillResult {
    pub total_tracks_processed: usize,
    pub total_plays_rewarded: u64,
    pub total_ogun_credited: Balance,
    pub nft_tracks_rewarded: usize,
    pub non_nft_tracks_rewarded: usize,
    pub creators_rewarded: usize,
    /// Tracks credited by an earlier run.
    pub skipped: usize,
    pub track_details: Vec<TrackCredit>,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// Credits creators for plays that predate the streaming ledger.
///
/// Reward per track = creator rate × historical plays, capped per track. The
/// credit, the stream-count bump and the once-per-track marker are written in
/// one transaction.
pub struct RewardBackfill {
    registry: Arc<ScidRegistry>,
    tracks: Arc<dyn TrackDirectory>,
    policy: RewardPolicy,
    service: ServiceIdentity,
}

impl RewardBackfill {
    pub fn new(
        registry: Arc<ScidRegistry>,
        tracks: Arc<dyn TrackDirectory>,
        policy: RewardPolicy,
        service: ServiceIdentity,
    ) -> Self {
        Self { registry, tracks, policy, service }
    }

    /// Retroactive amount for `plays` historical plays.
    pub fn retroactive_amount(&self, plays: u64, is_nft: bool) -> Balance {
        let raw = self.policy.creator_rate(is_nft).saturating_mul(plays as Balance);
        raw.min(self.policy.max_retroactive_reward_per_track)
    }

    pub fn run(
        &self,
        opts: &RewardBackfillOptions,
        now: Timestamp,
    ) -> Result<RewardBackfillResult, ScidError> {
        let mut candidates: Vec<TrackInfo> = self
            .tracks
            .tracks()?
            .into_iter()
            .filter(|t| t.playback_count >= opts.min_plays)
            .collect();
        candidates.sort_by(|a, b| {
            b.playback_count
                .cmp(&a.playback_count)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        if opts.limit > 0 {
            candidates.truncate(opts.limit);
        }

        info!(
            candidates = candidates.len(),
            min_plays = opts.min_plays,
            dry_run = opts.dry_run,
            service = %self.service.profile_id,
            "retroactive reward backfill starting"
        );

        let mut result = RewardBackfillResult {
            dry_run: opts.dry_run,
            ..RewardBackfillResult::default()
        };
        let mut creators = BTreeSet::new();

        for track in &candidates {
            match self.credit_track(track, opts, now) {
                Ok(Some(detail)) => {
                    result.total_tracks_processed += 1;
                    result.total_plays_rewarded += detail.playback_count;
                    result.total_ogun_credited += detail.ogun_credited;
                    if detail.is_nft {
                        result.nft_tracks_rewarded += 1;
                    } else {
                        result.non_nft_tracks_rewarded += 1;
                    }
                    creators.insert(detail.profile_id.clone());
                    result.track_details.push(detail);
                }
                Ok(None) => result.skipped += 1,
                Err(e) => {
                    warn!(track_id = %track.track_id, error = %e, "retroactive credit failed");
                    result.errors.push(format!("Track {}: {e}", track.track_id));
                }
            }
        }
        result.creators_rewarded = creators.len();

        info!(
            processed = result.total_tracks_processed,
            credited = %format_ogun(result.total_ogun_credited),
            creators = result.creators_rewarded,
            skipped = result.skipped,
            errors = result.errors.len(),
            dry_run = result.dry_run,
            "retroactive reward backfill complete"
        );
        Ok(result)
    }

    /// `Ok(None)` when the track was already credited.
    fn credit_track(
        &self,
        track: &TrackInfo,
        opts: &RewardBackfillOptions,
        now: Timestamp,
    ) -> Result<Option<TrackCredit>, ScidError> {
        let profile_id = track
            .profile_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ScidError::TrackWithoutProfile(track.track_id.clone()))?;

        let db = &self.registry.db;
        if db.has_credit(&track.track_id)? {
            return Ok(None);
        }

        let is_nft = track.is_nft();
        let plays = track.playback_count;
        let amount = self.retroactive_amount(plays, is_nft);

        let scid = if opts.dry_run {
            db.scid_for_track(&track.track_id)?
        } else {
            let scid = match db.scid_for_track(&track.track_id)? {
                Some(s) => s,
                None => {
                    let req = RegisterRequest {
                        track_id: track.track_id.clone(),
                        profile_id: profile_id.clone(),
                        wallet_address: track.artist_wallet(),
                        chain_code: Some(opts.chain_code),
                        ..RegisterRequest::default()
                    };
                    self.registry.register(&req, now)?.scid
                }
            };

            let credit = RetroactiveCredit {
                track_id: track.track_id.clone(),
                scid: scid.clone(),
                playback_count: plays,
                amount,
                is_nft,
                credited_by: self.service.profile_id.clone(),
                credited_at: now,
            };
            match db.apply_credit(&credit, |r| {
                r.stream_count += plays;
                r.ogun_rewards_earned += amount;
            }) {
                Ok(_) => {}
                Err(ScidError::AlreadyCredited(_)) => return Ok(None),
                Err(e) => return Err(e),
            }
            debug!(track_id = %track.track_id, scid = %scid, amount, "retroactive credit applied");
            Some(scid)
        };

        Ok(Some(TrackCredit {
            track_id: track.track_id.clone(),
            title: track.title.clone().unwrap_or_else(|| "Untitled".into()),
            profile_id,
            scid,
            playback_count: plays,
            is_nft,
            ogun_credited: amount,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scid_core::{Catalog, NftData, MICRO_OGUN_PER_OGUN};
    use scid_state::LedgerDb;

    const NOW: Timestamp = 1_717_200_000;

    fn temp_db(name: &str) -> LedgerDb {
        let dir = std::env::temp_dir().join(format!("scid_backfill_og_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        LedgerDb::open(&dir).expect("open temp db")
    }

    fn track(id: &str, profile: &str, plays: u64, nft: bool) -> TrackInfo {
        TrackInfo {
            track_id: id.into(),
            profile_id: Some(profile.into()),
            title: Some(format!("Song {id}")),
            nft_data: nft.then(|| NftData { contract: Some("0xnft".into()), ..NftData::default() }),
            playback_count: plays,
            deleted: false,
        }
    }

    fn job(name: &str, tracks: Vec<TrackInfo>) -> RewardBackfill {
        let registry = Arc::new(ScidRegistry::new(Arc::new(temp_db(name))));
        RewardBackfill::new(
            registry,
            Arc::new(Catalog::new(tracks, vec![])),
            RewardPolicy::default(),
            ServiceIdentity::default(),
        )
    }

    fn live() -> RewardBackfillOptions {
        RewardBackfillOptions { dry_run: false, ..RewardBackfillOptions::default() }
    }

    #[test]
    fn credits_creator_rate_per_play() {
        let job = job(
            "og_rates",
            vec![track("nft", "alice", 10, true), track("plain", "bob", 10, false)],
        );
        let res = job.run(&live(), NOW).unwrap();
        assert_eq!(res.total_tracks_processed, 2);
        assert_eq!(res.creators_rewarded, 2);
        assert_eq!(res.nft_tracks_rewarded, 1);

        let nft = job.registry.get_by_track("nft").unwrap().unwrap();
        assert_eq!(nft.ogun_rewards_earned, 10 * 350_000);
        assert_eq!(nft.stream_count, 10);
        let plain = job.registry.get_by_track("plain").unwrap().unwrap();
        assert_eq!(plain.ogun_rewards_earned, 10 * 35_000);

        let credit = job.registry.db.get_credit("nft").unwrap().unwrap();
        assert_eq!(credit.credited_by, ServiceIdentity::default().profile_id);
    }

    #[test]
    fn per_track_cap_applies() {
        let job = job("og_cap", vec![track("hit", "alice", 1_000_000, true)]);
        let res = job.run(&live(), NOW).unwrap();
        assert_eq!(res.total_ogun_credited, 10_000 * MICRO_OGUN_PER_OGUN);
    }

    #[test]
    fn existing_scid_is_credited_in_place() {
        let job = job("og_existing", vec![track("t1", "alice", 4, false)]);
        let rec = job
            .registry
            .register(
                &RegisterRequest {
                    track_id: "t1".into(),
                    profile_id: "alice".into(),
                    ..RegisterRequest::default()
                },
                NOW,
            )
            .unwrap();
        job.registry
            .db
            .update_record(&rec.scid, |r| {
                r.stream_count = 2;
                r.ogun_rewards_earned = 70_000;
                Ok(())
            })
            .unwrap();

        job.run(&live(), NOW).unwrap();
        let after = job.registry.get_by_scid(rec.scid.as_str()).unwrap().unwrap();
        assert_eq!(after.stream_count, 6);
        assert_eq!(after.ogun_rewards_earned, 70_000 + 4 * 35_000);
    }

    #[test]
    fn rerun_is_a_no_op() {
        let job = job("og_rerun", vec![track("t1", "alice", 5, true)]);
        job.run(&live(), NOW).unwrap();
        let before = job.registry.db.all_records().unwrap();

        let again = job.run(&live(), NOW + 10).unwrap();
        assert_eq!(again.total_tracks_processed, 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(job.registry.db.all_records().unwrap(), before);
    }

    #[test]
    fn dry_run_reports_without_writing() {
        let job = job("og_dry", vec![track("t1", "alice", 5, true), track("t2", "bob", 0, true)]);
        let res = job.run(&RewardBackfillOptions::default(), NOW).unwrap();
        assert!(res.dry_run);
        assert_eq!(res.total_tracks_processed, 1, "below min_plays is ignored");
        assert_eq!(res.total_ogun_credited, 5 * 350_000);
        assert_eq!(res.track_details[0].scid, None);
        assert_eq!(job.registry.db.record_count(), 0);
        assert!(!job.registry.db.has_credit("t1").unwrap());
    }

    #[test]
    fn ordering_limit_and_errors() {
        let mut orphan = track("orphan", "x", 50, false);
        orphan.profile_id = None;
        let job = job(
            "og_order",
            vec![track("small", "a", 2, false), orphan, track("big", "b", 9, false)],
        );
        let res = job
            .run(&RewardBackfillOptions { limit: 2, ..live() }, NOW)
            .unwrap();
        assert_eq!(res.errors.len(), 1, "orphan has most plays and fails");
        assert_eq!(res.track_details.len(), 1);
        assert_eq!(res.track_details[0].track_id, "big");
        assert!(job.registry.get_by_track("small").unwrap().is_none());
    }
}
