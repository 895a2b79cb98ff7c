use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use scid_core::{ChainCode, ScidError, Timestamp, TrackDirectory};
use scid_state::{RegisterRequest, ScidRegistry};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentifierBackfillOptions {
    /// Chain code for newly allocated identifiers.
    pub chain_code: ChainCode,
    /// Maximum number of tracks to register; 0 means no limit.
    pub limit: usize,
    pub dry_run: bool,
}

impl Default for IdentifierBackfillOptions {
    fn default() -> Self {
        Self {
            chain_code: ChainCode::Polygon,
            limit: 0,
            dry_run: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierBackfillResult {
    pub total_tracks: usize,
    pub tracks_without_scid: usize,
    /// Registered, or would be registered on a dry run.
    pub registered: usize,
    /// Tracks that already had an SCid.
    pub skipped: usize,
    pub nft_tracks: usize,
    pub non_nft_tracks: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// Allocates an SCid for every catalog track that lacks one.
pub struct IdentifierBackfill {
    registry: Arc<ScidRegistry>,
    tracks: Arc<dyn TrackDirectory>,
}

impl IdentifierBackfill {
    pub fn new(registry: Arc<ScidRegistry>, tracks: Arc<dyn TrackDirectory>) -> Self {
        Self { registry, tracks }
    }

    pub fn run(
        &self,
        opts: &IdentifierBackfillOptions,
        now: Timestamp,
    ) -> Result<IdentifierBackfillResult, ScidError> {
        let tracks = self.tracks.tracks()?;
        let mut result = IdentifierBackfillResult {
            total_tracks: tracks.len(),
            dry_run: opts.dry_run,
            ..IdentifierBackfillResult::default()
        };

        for track in tracks {
            if opts.limit > 0 && result.registered >= opts.limit {
                break;
            }
            match self.registry.db.track_has_record(&track.track_id) {
                Ok(true) => {
                    result.skipped += 1;
                    continue;
                }
                Ok(false) => result.tracks_without_scid += 1,
                Err(e) => {
                    result.errors.push(format!("Track {}: {e}", track.track_id));
                    continue;
                }
            }

            let Some(profile_id) = track.profile_id.clone().filter(|p| !p.is_empty()) else {
                result.errors.push(format!("Track {}: no profile id", track.track_id));
                continue;
            };

            if !opts.dry_run {
                let req = RegisterRequest {
                    track_id: track.track_id.clone(),
                    profile_id,
                    wallet_address: track.artist_wallet(),
                    chain_code: Some(opts.chain_code),
                    ..RegisterRequest::default()
                };
                match self.registry.register(&req, now) {
                    Ok(_) => {}
                    Err(ScidError::AlreadyRegistered { .. }) => {
                        result.skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        warn!(track_id = %track.track_id, error = %e, "identifier backfill failed");
                        result.errors.push(format!("Track {}: {e}", track.track_id));
                        continue;
                    }
                }
            }

            result.registered += 1;
            if track.is_nft() {
                result.nft_tracks += 1;
            } else {
                result.non_nft_tracks += 1;
            }
        }

        info!(
            total = result.total_tracks,
            registered = result.registered,
            skipped = result.skipped,
            errors = result.errors.len(),
            dry_run = result.dry_run,
            "identifier backfill complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scid_core::{Catalog, NftData, TrackInfo};
    use scid_state::LedgerDb;

    const NOW: Timestamp = 1_717_200_000;

    fn temp_db(name: &str) -> LedgerDb {
        let dir = std::env::temp_dir().join(format!("scid_backfill_ids_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        LedgerDb::open(&dir).expect("open temp db")
    }

    fn track(id: &str, profile: Option<&str>, nft: bool) -> TrackInfo {
        TrackInfo {
            track_id: id.into(),
            profile_id: profile.map(str::to_string),
            title: None,
            nft_data: nft.then(|| NftData {
                token_id: Some(3),
                minter: Some("0xMinter".into()),
                ..NftData::default()
            }),
            playback_count: 0,
            deleted: false,
        }
    }

    fn job(name: &str) -> IdentifierBackfill {
        let registry = Arc::new(ScidRegistry::new(Arc::new(temp_db(name))));
        let catalog = Catalog::new(
            vec![
                track("t1", Some("alice"), true),
                track("t2", Some("alice"), false),
                track("t3", None, false),
            ],
            vec![],
        );
        IdentifierBackfill::new(registry, Arc::new(catalog))
    }

    #[test]
    fn allocates_missing_and_collects_errors() {
        let job = job("ids_run");
        let res = job.run(&IdentifierBackfillOptions::default(), NOW).unwrap();
        assert_eq!(res.total_tracks, 3);
        assert_eq!(res.registered, 2);
        assert_eq!(res.nft_tracks, 1);
        assert_eq!(res.non_nft_tracks, 1);
        assert_eq!(res.errors.len(), 1);

        let t1 = job.registry.get_by_track("t1").unwrap().unwrap();
        assert_eq!(t1.wallet_address.as_deref(), Some("0xMinter"));
    }

    #[test]
    fn rerun_changes_nothing() {
        let job = job("ids_rerun");
        job.run(&IdentifierBackfillOptions::default(), NOW).unwrap();
        let before = job.registry.db.all_records().unwrap();

        let again = job.run(&IdentifierBackfillOptions::default(), NOW + 100).unwrap();
        assert_eq!(again.registered, 0);
        assert_eq!(again.skipped, 2);
        assert_eq!(job.registry.db.all_records().unwrap(), before);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let job = job("ids_dry");
        let opts = IdentifierBackfillOptions { dry_run: true, ..IdentifierBackfillOptions::default() };
        let res = job.run(&opts, NOW).unwrap();
        assert_eq!(res.registered, 2);
        assert!(res.dry_run);
        assert_eq!(job.registry.db.record_count(), 0);
    }

    #[test]
    fn limit_bounds_registrations() {
        let job = job("ids_limit");
        let opts = IdentifierBackfillOptions { limit: 1, ..IdentifierBackfillOptions::default() };
        let res = job.run(&opts, NOW).unwrap();
        assert_eq!(res.registered, 1);
        assert_eq!(job.registry.db.record_count(), 1);
    }
}
