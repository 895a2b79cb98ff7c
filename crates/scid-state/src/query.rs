use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use scid_core::constants::{DEFAULT_SEARCH_LIMIT, TOP_STREAMED_LIMIT};
use scid_core::{Balance, ChainCode, Scid, ScidError, ScidRecord, ScidStatus};

use crate::db::LedgerDb;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopTrack {
    pub scid: Scid,
    pub track_id: String,
    pub stream_count: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_scids: usize,
    pub total_streams: u64,
    pub total_ogun_rewarded: Balance,
    pub total_ogun_claimed: Balance,
    pub scids_by_chain: BTreeMap<ChainCode, usize>,
    pub top_streamed_tracks: Vec<TopTrack>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    pub profile_id: Option<String>,
    pub chain_code: Option<ChainCode>,
    pub status: Option<ScidStatus>,
    /// Two-digit year component.
    pub year: Option<u8>,
    pub offset: usize,
    /// Defaults to 50 when unset.
    pub limit: Option<usize>,
}

impl SearchFilter {
    fn matches(&self, r: &ScidRecord) -> bool {
        self.profile_id.as_deref().map_or(true, |p| r.profile_id == p)
            && self.chain_code.map_or(true, |c| r.chain_code == c)
            && self.status.map_or(true, |s| r.status == s)
            && self.year.map_or(true, |y| r.year == y)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SearchPage {
    pub scids: Vec<ScidRecord>,
    /// Matches before paging.
    pub total: usize,
}

/// Read-only aggregate queries over the ledger.
pub struct LedgerQuery<'a> {
    db: &'a LedgerDb,
}

impl<'a> LedgerQuery<'a> {
    pub fn new(db: &'a LedgerDb) -> Self {
        Self { db }
    }

    pub fn stats(&self) -> Result<LedgerStats, ScidError> {
        let records = self.db.all_records()?;
        let mut stats = LedgerStats {
            total_scids: records.len(),
            ..LedgerStats::default()
        };
        for r in &records {
            stats.total_streams += r.stream_count;
            stats.total_ogun_rewarded += r.ogun_rewards_earned;
            stats.total_ogun_claimed += r.ogun_rewards_claimed;
            *stats.scids_by_chain.entry(r.chain_code).or_default() += 1;
        }

        let mut ranked: Vec<&ScidRecord> = records.iter().collect();
        ranked.sort_by(|a, b| {
            b.stream_count
                .cmp(&a.stream_count)
                .then_with(|| a.scid.cmp(&b.scid))
        });
        stats.top_streamed_tracks = ranked
            .into_iter()
            .take(TOP_STREAMED_LIMIT)
            .map(|r| TopTrack {
                scid: r.scid.clone(),
                track_id: r.track_id.clone(),
                stream_count: r.stream_count,
            })
            .collect();
        Ok(stats)
    }

    /// Filtered listing, newest first.
    pub fn search(&self, filter: &SearchFilter) -> Result<SearchPage, ScidError> {
        let mut hits: Vec<ScidRecord> = self
            .db
            .all_records()?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.scid.cmp(&a.scid)));

        let total = hits.len();
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let scids = hits.into_iter().skip(filter.offset).take(limit).collect();
        Ok(SearchPage { scids, total })
    }
}
