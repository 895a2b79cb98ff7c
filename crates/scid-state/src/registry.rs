use std::sync::Arc;

use chrono::{DateTime, Datelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use scid_core::constants::DEFAULT_CHAIN_ID;
use scid_core::{
    ChainCode, Scid, ScidError, ScidRecord, ScidStatus, Timestamp, TransferRecord,
};
use scid_ident::{artist_hash, checksum, generate, resolve_chain, GenerateOptions};

use crate::db::LedgerDb;

/// Input to `ScidRegistry::register`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub track_id: String,
    pub profile_id: String,
    pub wallet_address: Option<String>,
    pub chain_code: Option<ChainCode>,
    pub chain_id: Option<u64>,
    pub metadata_hash: Option<String>,
}

/// On-chain proof recorded by `mark_registered`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnChainProof {
    pub transaction_hash: String,
    pub block_number: u64,
    pub contract_address: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRegisterResult {
    pub registered: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Calendar year of a Unix timestamp (UTC).
pub fn year_of(ts: Timestamp) -> Result<i32, ScidError> {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.year())
        .ok_or_else(|| ScidError::InvalidInput(format!("timestamp out of range: {ts}")))
}

/// Owns the SCid lifecycle: allocation, on-chain proof, ownership transfer,
/// revocation.
///
/// Every mutation is a single sled transaction; concurrent registrations for
/// the same `(artist_hash, year)` never share a sequence.
pub struct ScidRegistry {
    pub db: Arc<LedgerDb>,
}

impl ScidRegistry {
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }

    /// Mint a `PENDING` SCid for a track that has none.
    pub fn register(&self, req: &RegisterRequest, now: Timestamp) -> Result<ScidRecord, ScidError> {
        if req.track_id.is_empty() {
            return Err(ScidError::InvalidInput("track id must not be empty".into()));
        }
        if req.profile_id.is_empty() {
            return Err(ScidError::InvalidInput("profile id must not be empty".into()));
        }

        let hash = artist_hash(&req.profile_id);
        let full_year = year_of(now)?;
        let year = full_year.rem_euclid(100) as u8;
        let chain = resolve_chain(req.chain_code, req.chain_id);

        let record = self.db.insert_with_next_sequence(&req.track_id, &hash, year, |seq| {
            let opts = GenerateOptions {
                artist_identifier: req.profile_id.clone(),
                sequence_number: seq as u64,
                chain_code: Some(chain),
                chain_id: req.chain_id,
                year: Some(full_year),
            };
            let scid = generate(&opts)?;
            Ok(ScidRecord {
                checksum: checksum(&scid),
                scid,
                track_id: req.track_id.clone(),
                profile_id: req.profile_id.clone(),
                previous_owner_id: None,
                wallet_address: req.wallet_address.clone(),
                chain_code: chain,
                chain_id: req.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
                artist_hash: hash.clone(),
                year,
                sequence: seq,
                status: ScidStatus::Pending,
                stream_count: 0,
                ogun_rewards_earned: 0,
                ogun_rewards_claimed: 0,
                daily_ogun_earned: 0,
                last_daily_reset: None,
                last_stream_at: None,
                transfer_history: Vec::new(),
                transaction_hash: None,
                block_number: None,
                contract_address: None,
                metadata_hash: req.metadata_hash.clone(),
                created_at: now,
                registered_at: None,
            })
        })?;

        info!(
            scid = %record.scid,
            track_id = %record.track_id,
            profile_id = %record.profile_id,
            sequence = record.sequence,
            "SCid registered"
        );
        Ok(record)
    }

    /// Register each track for `profile_id`; tracks that already carry an
    /// SCid are skipped, failures are collected.
    pub fn bulk_register(
        &self,
        track_ids: &[String],
        profile_id: &str,
        chain_code: ChainCode,
        now: Timestamp,
    ) -> BulkRegisterResult {
        let mut result = BulkRegisterResult::default();
        for track_id in track_ids {
            match self.db.track_has_record(track_id) {
                Ok(true) => {
                    result.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    result.errors.push(format!("Track {track_id}: {e}"));
                    continue;
                }
            }
            let req = RegisterRequest {
                track_id: track_id.clone(),
                profile_id: profile_id.to_string(),
                chain_code: Some(chain_code),
                ..RegisterRequest::default()
            };
            match self.register(&req, now) {
                Ok(_) => result.registered += 1,
                Err(ScidError::AlreadyRegistered { .. }) => result.skipped += 1,
                Err(e) => result.errors.push(format!("Track {track_id}: {e}")),
            }
        }
        result
    }

    /// Record on-chain proof. Repeating with the same or an updated proof is
    /// allowed; `registered_at` keeps its first value.
    pub fn mark_registered(
        &self,
        scid: &str,
        proof: &OnChainProof,
        now: Timestamp,
    ) -> Result<ScidRecord, ScidError> {
        let scid = Scid::normalized(scid);
        let record = self.db.update_record(&scid, |r| {
            match r.status {
                ScidStatus::Revoked => return Err(ScidError::Revoked(r.scid.to_string())),
                ScidStatus::Pending => r.status = ScidStatus::Registered,
                // A transferred SCid keeps its status; only the proof changes.
                ScidStatus::Registered | ScidStatus::Transferred => {}
            }
            r.transaction_hash = Some(proof.transaction_hash.clone());
            r.block_number = Some(proof.block_number);
            r.contract_address = Some(proof.contract_address.clone());
            if r.registered_at.is_none() {
                r.registered_at = Some(now);
            }
            Ok(r.clone())
        })?;
        info!(scid = %record.scid, tx = %proof.transaction_hash, "on-chain proof recorded");
        Ok(record)
    }

    /// Move ownership from `from_profile_id` to `to_profile_id`.
    pub fn transfer(
        &self,
        scid: &str,
        from_profile_id: &str,
        to_profile_id: &str,
        transaction_hash: Option<String>,
        reason: Option<String>,
        now: Timestamp,
    ) -> Result<ScidRecord, ScidError> {
        if to_profile_id.is_empty() {
            return Err(ScidError::InvalidInput("recipient profile must not be empty".into()));
        }
        let scid = Scid::normalized(scid);
        let record = self.db.update_record(&scid, |r| {
            if r.status == ScidStatus::Revoked {
                return Err(ScidError::Revoked(r.scid.to_string()));
            }
            if r.profile_id != from_profile_id {
                return Err(ScidError::NotOwner { scid: r.scid.to_string() });
            }
            r.transfer_history.push(TransferRecord {
                from_profile_id: from_profile_id.to_string(),
                to_profile_id: to_profile_id.to_string(),
                transaction_hash: transaction_hash.clone(),
                transferred_at: now,
                reason: reason.clone(),
            });
            r.previous_owner_id = Some(from_profile_id.to_string());
            r.profile_id = to_profile_id.to_string();
            r.status = ScidStatus::Transferred;
            Ok(r.clone())
        })?;
        info!(
            scid = %record.scid,
            from = from_profile_id,
            to = to_profile_id,
            "SCid transferred"
        );
        Ok(record)
    }

    /// Administrative, terminal. Revoking twice is a no-op.
    pub fn revoke(&self, scid: &str, reason: Option<&str>) -> Result<ScidRecord, ScidError> {
        let scid = Scid::normalized(scid);
        let record = self.db.update_record(&scid, |r| {
            r.status = ScidStatus::Revoked;
            Ok(r.clone())
        })?;
        info!(scid = %record.scid, reason = reason.unwrap_or(""), "SCid revoked");
        Ok(record)
    }

    // ── Lookups ───────────────────────────────────────────────────────────────

    pub fn get_by_scid(&self, scid: &str) -> Result<Option<ScidRecord>, ScidError> {
        self.db.get_record(&Scid::normalized(scid))
    }

    pub fn get_by_track(&self, track_id: &str) -> Result<Option<ScidRecord>, ScidError> {
        match self.db.scid_for_track(track_id)? {
            Some(scid) => self.db.get_record(&scid),
            None => Ok(None),
        }
    }

    /// Records currently owned by `profile_id`, newest first.
    pub fn get_by_profile(&self, profile_id: &str) -> Result<Vec<ScidRecord>, ScidError> {
        let mut out = Vec::new();
        for scid in self.db.scids_for_profile(profile_id)? {
            if let Some(r) = self.db.get_record(&scid)? {
                out.push(r);
            }
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.scid.cmp(&a.scid)));
        debug!(profile_id, count = out.len(), "records by profile");
        Ok(out)
    }

    /// Highest-sequence record for `(artist_hash, year)`.
    pub fn latest_for_artist_year(
        &self,
        artist_hash: &str,
        year: u8,
    ) -> Result<Option<ScidRecord>, ScidError> {
        match self.db.scids_for_artist_year(artist_hash, year)?.first() {
            Some(scid) => self.db.get_record(scid),
            None => Ok(None),
        }
    }

    /// Sequence the next registration for `profile_id` in `year` would get.
    pub fn next_sequence(&self, profile_id: &str, year: u8) -> Result<u32, ScidError> {
        Ok(self.db.current_sequence(&artist_hash(profile_id), year)? + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::temp_db;

    // 2024-06-01T00:00:00Z
    const NOW: Timestamp = 1_717_200_000;

    fn registry(name: &str) -> ScidRegistry {
        ScidRegistry::new(Arc::new(temp_db(name)))
    }

    fn req(track: &str, profile: &str) -> RegisterRequest {
        RegisterRequest {
            track_id: track.into(),
            profile_id: profile.into(),
            ..RegisterRequest::default()
        }
    }

    fn proof(tx: &str) -> OnChainProof {
        OnChainProof {
            transaction_hash: tx.into(),
            block_number: 42,
            contract_address: "0xregistry".into(),
        }
    }

    #[test]
    fn concurrent_registrations_get_distinct_contiguous_sequences() {
        let reg = registry("concurrent_seq");
        let threads = 8;
        let per_thread = 5;

        let mut sequences: Vec<u32> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let reg = &reg;
                    s.spawn(move || {
                        (0..per_thread)
                            .map(|i| {
                                reg.register(&req(&format!("t{t}-{i}"), "artist"), NOW)
                                    .unwrap()
                                    .sequence
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        sequences.sort_unstable();
        let expected: Vec<u32> = (1..=(threads * per_thread) as u32).collect();
        assert_eq!(sequences, expected);

        let hash = artist_hash("artist");
        assert_eq!(reg.db.current_sequence(&hash, 24).unwrap(), 40);
        assert_eq!(reg.db.scids_for_artist_year(&hash, 24).unwrap().len(), 40);
    }

    #[test]
    fn racing_registrations_of_one_track_admit_one() {
        let reg = registry("concurrent_dup");
        let results: Vec<Result<ScidRecord, ScidError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let reg = &reg;
                    s.spawn(move || reg.register(&req("same-track", "artist"), NOW))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, ScidError::AlreadyRegistered { .. })));
        assert_eq!(reg.db.current_sequence(&artist_hash("artist"), 24).unwrap(), 1);
    }

    #[test]
    fn register_allocates_sequential_ids() {
        let reg = registry("reg_seq");
        let a = reg.register(&req("t1", "profile123"), NOW).unwrap();
        let b = reg.register(&req("t2", "profile123"), NOW).unwrap();
        let h = artist_hash("profile123");

        assert_eq!(a.scid.as_str(), format!("SC-POL-{h}-2400001"));
        assert_eq!(b.scid.as_str(), format!("SC-POL-{h}-2400002"));
        assert_eq!(a.status, ScidStatus::Pending);
        assert_eq!(a.chain_id, DEFAULT_CHAIN_ID);
        assert_eq!(a.checksum, checksum(&a.scid));
        assert_eq!(
            reg.latest_for_artist_year(&h, 24).unwrap().unwrap().scid,
            b.scid
        );
        assert_eq!(reg.next_sequence("profile123", 24).unwrap(), 3);
    }

    #[test]
    fn register_resolves_chain_from_id() {
        let reg = registry("reg_chain");
        let r = reg
            .register(
                &RegisterRequest { chain_id: Some(8453), ..req("t1", "p") },
                NOW,
            )
            .unwrap();
        assert_eq!(r.chain_code, ChainCode::Base);
        assert_eq!(r.chain_id, 8453);
        assert!(r.scid.as_str().starts_with("SC-BAS-"));
    }

    #[test]
    fn second_registration_for_track_rejected() {
        let reg = registry("reg_dup");
        let first = reg.register(&req("t1", "p"), NOW).unwrap();
        let err = reg.register(&req("t1", "other"), NOW).unwrap_err();
        match err {
            ScidError::AlreadyRegistered { track_id, scid } => {
                assert_eq!(track_id, "t1");
                assert_eq!(scid, first.scid.as_str());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mark_registered_is_idempotent() {
        let reg = registry("reg_mark");
        let r = reg.register(&req("t1", "p"), NOW).unwrap();
        let once = reg.mark_registered(r.scid.as_str(), &proof("0xaa"), NOW + 5).unwrap();
        let twice = reg.mark_registered(r.scid.as_str(), &proof("0xaa"), NOW + 50).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.status, ScidStatus::Registered);
        assert_eq!(once.registered_at, Some(NOW + 5));

        let updated = reg
            .mark_registered(&r.scid.as_str().to_lowercase(), &proof("0xbb"), NOW + 60)
            .unwrap();
        assert_eq!(updated.transaction_hash.as_deref(), Some("0xbb"));
    }

    #[test]
    fn transfer_requires_current_owner() {
        let reg = registry("reg_transfer");
        let r = reg.register(&req("t1", "alice"), NOW).unwrap();

        let err = reg
            .transfer(r.scid.as_str(), "mallory", "mallory", None, None, NOW)
            .unwrap_err();
        assert!(matches!(err, ScidError::NotOwner { .. }));

        let t = reg
            .transfer(r.scid.as_str(), "alice", "bob", Some("0xtx".into()), Some("sale".into()), NOW + 1)
            .unwrap();
        assert_eq!(t.profile_id, "bob");
        assert_eq!(t.previous_owner_id.as_deref(), Some("alice"));
        assert_eq!(t.status, ScidStatus::Transferred);
        assert_eq!(t.scid, r.scid);
        assert_eq!(t.transfer_history.len(), 1);

        let t2 = reg.transfer(r.scid.as_str(), "bob", "carol", None, None, NOW + 2).unwrap();
        assert_eq!(t2.transfer_history.len(), 2);
        assert_eq!(t2.transfer_history[0].to_profile_id, "bob");
        assert!(reg.get_by_profile("alice").unwrap().is_empty());
        assert_eq!(reg.get_by_profile("carol").unwrap().len(), 1);
    }

    #[test]
    fn revoked_is_terminal() {
        let reg = registry("reg_revoke");
        let r = reg.register(&req("t1", "alice"), NOW).unwrap();
        reg.revoke(r.scid.as_str(), Some("takedown")).unwrap();
        assert!(matches!(
            reg.transfer(r.scid.as_str(), "alice", "bob", None, None, NOW),
            Err(ScidError::Revoked(_))
        ));
        assert!(matches!(
            reg.mark_registered(r.scid.as_str(), &proof("0x1"), NOW),
            Err(ScidError::Revoked(_))
        ));
    }

    #[test]
    fn lookups() {
        let reg = registry("reg_lookup");
        let a = reg.register(&req("t1", "p"), NOW).unwrap();
        let b = reg.register(&req("t2", "p"), NOW + 10).unwrap();
        assert_eq!(reg.get_by_track("t1").unwrap().unwrap().scid, a.scid);
        assert!(reg.get_by_track("nope").unwrap().is_none());
        assert_eq!(
            reg.get_by_scid(&a.scid.as_str().to_lowercase()).unwrap().unwrap().track_id,
            "t1"
        );
        let mine: Vec<_> = reg.get_by_profile("p").unwrap().into_iter().map(|r| r.scid).collect();
        assert_eq!(mine, vec![b.scid, a.scid]);
    }

    #[test]
    fn bulk_register_skips_existing() {
        let reg = registry("reg_bulk");
        reg.register(&req("t1", "p"), NOW).unwrap();
        let tracks = vec!["t1".to_string(), "t2".to_string(), "".to_string()];
        let res = reg.bulk_register(&tracks, "p", ChainCode::ZetaChain, NOW);
        assert_eq!(res.registered, 1);
        assert_eq!(res.skipped, 1);
        assert_eq!(res.errors.len(), 1);
        assert_eq!(reg.get_by_track("t2").unwrap().unwrap().chain_code, ChainCode::ZetaChain);
    }
}
