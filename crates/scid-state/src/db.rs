use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use sled::Transactional;

use scid_core::constants::MAX_SEQUENCE;
use scid_core::{
    ClaimReceipt, ListenerKey, ListenerLedger, RetroactiveCredit, Scid, ScidError, ScidRecord,
};

/// Persistent ledger backed by sled.
///
/// Named trees:
///   records        scid bytes                   → bincode(ScidRecord)
///   track_index    track_id                     → scid bytes        (unique)
///   profile_index  profile_id \0 scid           → []                (membership set)
///   artist_index   artist_hash yy nnnnn         → scid bytes        (ordered by sequence)
///   sequences      artist_hash ":" yy           → u32 BE            (last issued)
///   listeners      ListenerKey::storage_key     → bincode(ListenerLedger)
///   credits        track_id                     → bincode(RetroactiveCredit)
///   claims         claim_id u64 BE              → bincode(ClaimReceipt)
pub struct LedgerDb {
    db: sled::Db,
    records: sled::Tree,
    track_index: sled::Tree,
    profile_index: sled::Tree,
    artist_index: sled::Tree,
    sequences: sled::Tree,
    listeners: sled::Tree,
    credits: sled::Tree,
    claims: sled::Tree,
}

type TxResult<T> = Result<T, ConflictableTransactionError<ScidError>>;

fn storage(e: sled::Error) -> ScidError {
    ScidError::Storage(e.to_string())
}

fn tx_error(e: TransactionError<ScidError>) -> ScidError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => storage(e),
    }
}

fn abort<T>(r: Result<T, ScidError>) -> TxResult<T> {
    r.map_err(ConflictableTransactionError::Abort)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ScidError> {
    bincode::serialize(value).map_err(|e| ScidError::Serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ScidError> {
    bincode::deserialize(bytes).map_err(|e| ScidError::Serialization(e.to_string()))
}

fn profile_key(profile_id: &str, scid: &Scid) -> Vec<u8> {
    let mut k = Vec::with_capacity(profile_id.len() + 1 + scid.as_str().len());
    k.extend_from_slice(profile_id.as_bytes());
    k.push(0);
    k.extend_from_slice(scid.as_bytes());
    k
}

fn profile_prefix(profile_id: &str) -> Vec<u8> {
    let mut k = profile_id.as_bytes().to_vec();
    k.push(0);
    k
}

fn artist_prefix(artist_hash: &str, year: u8) -> String {
    format!("{artist_hash}{year:02}")
}

fn artist_key(artist_hash: &str, year: u8, sequence: u32) -> String {
    format!("{artist_hash}{year:02}{sequence:05}")
}

fn sequence_key(artist_hash: &str, year: u8) -> String {
    format!("{artist_hash}:{year:02}")
}

fn read_record(records: &TransactionalTree, scid: &Scid) -> TxResult<ScidRecord> {
    match records.get(scid.as_bytes())? {
        Some(bytes) => abort(decode(&bytes)),
        None => Err(ConflictableTransactionError::Abort(ScidError::ScidNotFound(
            scid.to_string(),
        ))),
    }
}

fn write_record(records: &TransactionalTree, record: &ScidRecord) -> TxResult<()> {
    let bytes = abort(encode(record))?;
    records.insert(record.scid.as_bytes(), bytes)?;
    Ok(())
}

impl LedgerDb {
    /// Open or create the ledger database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScidError> {
        let db = sled::open(path).map_err(storage)?;
        let records       = db.open_tree("records").map_err(storage)?;
        let track_index   = db.open_tree("track_index").map_err(storage)?;
        let profile_index = db.open_tree("profile_index").map_err(storage)?;
        let artist_index  = db.open_tree("artist_index").map_err(storage)?;
        let sequences     = db.open_tree("sequences").map_err(storage)?;
        let listeners     = db.open_tree("listeners").map_err(storage)?;
        let credits       = db.open_tree("credits").map_err(storage)?;
        let claims        = db.open_tree("claims").map_err(storage)?;
        Ok(Self {
            db,
            records,
            track_index,
            profile_index,
            artist_index,
            sequences,
            listeners,
            credits,
            claims,
        })
    }

    // ── Records ───────────────────────────────────────────────────────────────

    pub fn get_record(&self, scid: &Scid) -> Result<Option<ScidRecord>, ScidError> {
        match self.records.get(scid.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn scid_for_track(&self, track_id: &str) -> Result<Option<Scid>, ScidError> {
        match self.track_index.get(track_id.as_bytes()).map_err(storage)? {
            Some(bytes) => {
                let s = String::from_utf8(bytes.to_vec())
                    .map_err(|e| ScidError::Serialization(e.to_string()))?;
                Ok(Some(Scid(s)))
            }
            None => Ok(None),
        }
    }

    pub fn track_has_record(&self, track_id: &str) -> Result<bool, ScidError> {
        self.track_index
            .contains_key(track_id.as_bytes())
            .map_err(storage)
    }

    pub fn scids_for_profile(&self, profile_id: &str) -> Result<Vec<Scid>, ScidError> {
        let prefix = profile_prefix(profile_id);
        let mut out = Vec::new();
        for item in self.profile_index.scan_prefix(&prefix) {
            let (key, _) = item.map_err(storage)?;
            let s = String::from_utf8(key[prefix.len()..].to_vec())
                .map_err(|e| ScidError::Serialization(e.to_string()))?;
            out.push(Scid(s));
        }
        Ok(out)
    }

    /// SCids issued for `(artist_hash, year)`, highest sequence first.
    pub fn scids_for_artist_year(
        &self,
        artist_hash: &str,
        year: u8,
    ) -> Result<Vec<Scid>, ScidError> {
        let mut out = Vec::new();
        for item in self
            .artist_index
            .scan_prefix(artist_prefix(artist_hash, year).as_bytes())
            .rev()
        {
            let (_, value) = item.map_err(storage)?;
            let s = String::from_utf8(value.to_vec())
                .map_err(|e| ScidError::Serialization(e.to_string()))?;
            out.push(Scid(s));
        }
        Ok(out)
    }

    /// Last sequence issued for `(artist_hash, year)`, 0 when none.
    pub fn current_sequence(&self, artist_hash: &str, year: u8) -> Result<u32, ScidError> {
        match self
            .sequences
            .get(sequence_key(artist_hash, year).as_bytes())
            .map_err(storage)?
        {
            Some(bytes) => decode_u32(&bytes),
            None => Ok(0),
        }
    }

    /// Every record, in SCid order.
    pub fn all_records(&self) -> Result<Vec<ScidRecord>, ScidError> {
        let mut out = Vec::new();
        for item in self.records.iter() {
            let (_, bytes) = item.map_err(storage)?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Allocate the next sequence for `(artist_hash, year)` and insert the
    /// record `build` produces for it, in one transaction.
    ///
    /// Fails with `AlreadyRegistered` if `track_id` already has a record and
    /// with `SequenceExhausted` once the counter reaches `MAX_SEQUENCE`.
    /// `build` may run more than once under contention.
    pub fn insert_with_next_sequence<F>(
        &self,
        track_id: &str,
        artist_hash: &str,
        year: u8,
        build: F,
    ) -> Result<ScidRecord, ScidError>
    where
        F: Fn(u32) -> Result<ScidRecord, ScidError>,
    {
        let seq_key = sequence_key(artist_hash, year);
        (
            &self.records,
            &self.track_index,
            &self.profile_index,
            &self.artist_index,
            &self.sequences,
        )
            .transaction(|(records, tracks, profiles, artists, sequences)| {
                if let Some(existing) = tracks.get(track_id.as_bytes())? {
                    return Err(ConflictableTransactionError::Abort(
                        ScidError::AlreadyRegistered {
                            track_id: track_id.to_string(),
                            scid: String::from_utf8_lossy(&existing).into_owned(),
                        },
                    ));
                }

                let last = match sequences.get(seq_key.as_bytes())? {
                    Some(bytes) => abort(decode_u32(&bytes))?,
                    None => 0,
                };
                if last >= MAX_SEQUENCE {
                    return Err(ConflictableTransactionError::Abort(
                        ScidError::SequenceExhausted {
                            artist_hash: artist_hash.to_string(),
                            year,
                        },
                    ));
                }
                let next = last + 1;
                let record = abort(build(next))?;

                if records.get(record.scid.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(ScidError::Other(
                        format!("SCid {} already exists", record.scid),
                    )));
                }

                write_record(records, &record)?;
                tracks.insert(track_id.as_bytes(), record.scid.as_bytes())?;
                profiles.insert(profile_key(&record.profile_id, &record.scid), b"".as_ref())?;
                artists.insert(
                    artist_key(artist_hash, year, next).as_bytes(),
                    record.scid.as_bytes(),
                )?;
                sequences.insert(seq_key.as_bytes(), next.to_be_bytes().as_ref())?;
                Ok(record)
            })
            .map_err(tx_error)
    }

    /// Atomic read-modify-write of one record. The profile index follows any
    /// owner change `f` makes. `f` may run more than once under contention.
    pub fn update_record<F, T>(&self, scid: &Scid, f: F) -> Result<T, ScidError>
    where
        F: Fn(&mut ScidRecord) -> Result<T, ScidError>,
    {
        (&self.records, &self.profile_index)
            .transaction(|(records, profiles)| {
                let mut record = read_record(records, scid)?;
                let owner_before = record.profile_id.clone();
                let out = abort(f(&mut record))?;
                if record.profile_id != owner_before {
                    profiles.remove(profile_key(&owner_before, scid))?;
                    profiles.insert(profile_key(&record.profile_id, scid), b"".as_ref())?;
                }
                write_record(records, &record)?;
                Ok(out)
            })
            .map_err(tx_error)
    }

    /// Atomic read-modify-write of several records. Either every record is
    /// written or none is.
    pub fn update_records<F, T>(&self, scids: &[Scid], f: F) -> Result<T, ScidError>
    where
        F: Fn(&mut [ScidRecord]) -> Result<T, ScidError>,
    {
        self.records
            .transaction(|records| {
                let mut batch = Vec::with_capacity(scids.len());
                for scid in scids {
                    batch.push(read_record(records, scid)?);
                }
                let out = abort(f(&mut batch))?;
                for record in &batch {
                    write_record(records, record)?;
                }
                Ok(out)
            })
            .map_err(tx_error)
    }

    /// Apply `f` to several records and persist the claim receipt it returns,
    /// all in one transaction. `None` writes the records without a receipt.
    pub fn update_records_with_claim<F>(
        &self,
        scids: &[Scid],
        f: F,
    ) -> Result<Option<ClaimReceipt>, ScidError>
    where
        F: Fn(&mut [ScidRecord]) -> Result<Option<ClaimReceipt>, ScidError>,
    {
        (&self.records, &self.claims)
            .transaction(|(records, claims)| {
                let mut batch = Vec::with_capacity(scids.len());
                for scid in scids {
                    batch.push(read_record(records, scid)?);
                }
                let receipt = abort(f(&mut batch))?;
                for record in &batch {
                    write_record(records, record)?;
                }
                if let Some(receipt) = &receipt {
                    let bytes = abort(encode(receipt))?;
                    claims.insert(receipt.claim_id.to_be_bytes().to_vec(), bytes)?;
                }
                Ok(receipt)
            })
            .map_err(tx_error)
    }

    /// Atomic update of a record together with a listener's daily ledger.
    /// A listener with no ledger yet starts from `ListenerLedger::new`.
    pub fn update_record_and_listener<F, T>(
        &self,
        scid: &Scid,
        listener: Option<&ListenerKey>,
        f: F,
    ) -> Result<T, ScidError>
    where
        F: Fn(&mut ScidRecord, Option<&mut ListenerLedger>) -> Result<T, ScidError>,
    {
        (&self.records, &self.listeners)
            .transaction(|(records, listeners)| {
                let mut record = read_record(records, scid)?;
                let mut ledger = match listener {
                    Some(key) => match listeners.get(key.storage_key().as_bytes())? {
                        Some(bytes) => Some(abort(decode::<ListenerLedger>(&bytes))?),
                        None => Some(ListenerLedger::new(key.clone())),
                    },
                    None => None,
                };

                let out = abort(f(&mut record, ledger.as_mut()))?;

                write_record(records, &record)?;
                if let Some(ledger) = &ledger {
                    let bytes = abort(encode(ledger))?;
                    listeners.insert(ledger.listener.storage_key().as_bytes(), bytes)?;
                }
                Ok(out)
            })
            .map_err(tx_error)
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    pub fn get_listener(&self, key: &ListenerKey) -> Result<Option<ListenerLedger>, ScidError> {
        match self
            .listeners
            .get(key.storage_key().as_bytes())
            .map_err(storage)?
        {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // ── Retroactive credits ───────────────────────────────────────────────────

    pub fn get_credit(&self, track_id: &str) -> Result<Option<RetroactiveCredit>, ScidError> {
        match self.credits.get(track_id.as_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn has_credit(&self, track_id: &str) -> Result<bool, ScidError> {
        self.credits.contains_key(track_id.as_bytes()).map_err(storage)
    }

    /// Write the credit marker and apply `f` to its record in one
    /// transaction. `AlreadyCredited` if the track carries a marker.
    pub fn apply_credit<F>(&self, credit: &RetroactiveCredit, f: F) -> Result<ScidRecord, ScidError>
    where
        F: Fn(&mut ScidRecord),
    {
        (&self.records, &self.credits)
            .transaction(|(records, credits)| {
                if credits.get(credit.track_id.as_bytes())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        ScidError::AlreadyCredited(credit.track_id.clone()),
                    ));
                }
                let mut record = read_record(records, &credit.scid)?;
                f(&mut record);
                write_record(records, &record)?;
                let bytes = abort(encode(credit))?;
                credits.insert(credit.track_id.as_bytes(), bytes)?;
                Ok(record)
            })
            .map_err(tx_error)
    }

    // ── Claim receipts ────────────────────────────────────────────────────────

    /// Monotonic id for a new claim receipt.
    pub fn next_claim_id(&self) -> Result<u64, ScidError> {
        self.db.generate_id().map_err(storage)
    }

    pub fn put_claim(&self, receipt: &ClaimReceipt) -> Result<(), ScidError> {
        let bytes = encode(receipt)?;
        self.claims
            .insert(receipt.claim_id.to_be_bytes(), bytes)
            .map_err(storage)?;
        Ok(())
    }

    pub fn get_claim(&self, claim_id: u64) -> Result<Option<ClaimReceipt>, ScidError> {
        match self.claims.get(claim_id.to_be_bytes()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Receipts for `profile_id`, newest first.
    pub fn claims_for_profile(&self, profile_id: &str) -> Result<Vec<ClaimReceipt>, ScidError> {
        let mut out = Vec::new();
        for item in self.claims.iter().rev() {
            let (_, bytes) = item.map_err(storage)?;
            let receipt: ClaimReceipt = decode(&bytes)?;
            if receipt.profile_id == profile_id {
                out.push(receipt);
            }
        }
        Ok(out)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), ScidError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }
}

fn decode_u32(bytes: &[u8]) -> Result<u32, ScidError> {
    let arr: [u8; 4] = bytes
        .try_into()
        .map_err(|_| ScidError::Serialization(format!("bad counter width {}", bytes.len())))?;
    Ok(u32::from_be_bytes(arr))
}
