//! Read-only track and profile lookups.
//!
//! The ledger never owns track or profile data; it only asks for the facts it
//! prices rewards with (mint status, verified flag, historical plays).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ScidError;

/// NFT mint data attached to a track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftData {
    pub token_id: Option<u64>,
    pub contract: Option<String>,
    pub minter: Option<String>,
    pub owner: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub track_id: String,
    pub profile_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub nft_data: Option<NftData>,
    /// Historical play counter predating the ledger.
    #[serde(default)]
    pub playback_count: u64,
    #[serde(default)]
    pub deleted: bool,
}

impl TrackInfo {
    /// A track counts as minted when it carries a token id or a contract.
    pub fn is_nft(&self) -> bool {
        self.nft_data
            .as_ref()
            .map(|n| n.token_id.is_some() || n.contract.is_some())
            .unwrap_or(false)
    }

    /// Best known artist wallet for a freshly allocated SCid.
    pub fn artist_wallet(&self) -> Option<String> {
        self.nft_data
            .as_ref()
            .and_then(|n| n.minter.clone().or_else(|| n.owner.clone()))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub profile_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub wallet_address: Option<String>,
}

pub trait TrackDirectory: Send + Sync {
    fn track(&self, track_id: &str) -> Result<Option<TrackInfo>, ScidError>;

    /// All non-deleted tracks, for batch jobs.
    fn tracks(&self) -> Result<Vec<TrackInfo>, ScidError>;
}

pub trait ProfileDirectory: Send + Sync {
    fn profile(&self, profile_id: &str) -> Result<Option<ProfileInfo>, ScidError>;
}

/// In-memory catalog of tracks and profiles, typically loaded from a JSON
/// export.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    tracks: Vec<TrackInfo>,
    #[serde(default)]
    profiles: Vec<ProfileInfo>,
    #[serde(skip)]
    track_index: HashMap<String, usize>,
    #[serde(skip)]
    profile_index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(tracks: Vec<TrackInfo>, profiles: Vec<ProfileInfo>) -> Self {
        let mut c = Self {
            tracks,
            profiles,
            track_index: HashMap::new(),
            profile_index: HashMap::new(),
        };
        c.reindex();
        c
    }

    pub fn from_json(json: &str) -> Result<Self, ScidError> {
        let mut c: Catalog =
            serde_json::from_str(json).map_err(|e| ScidError::Serialization(e.to_string()))?;
        c.reindex();
        Ok(c)
    }

    pub fn upsert_track(&mut self, track: TrackInfo) {
        match self.track_index.get(&track.track_id) {
            Some(&i) => self.tracks[i] = track,
            None => {
                self.track_index.insert(track.track_id.clone(), self.tracks.len());
                self.tracks.push(track);
            }
        }
    }

    pub fn upsert_profile(&mut self, profile: ProfileInfo) {
        match self.profile_index.get(&profile.profile_id) {
            Some(&i) => self.profiles[i] = profile,
            None => {
                self.profile_index
                    .insert(profile.profile_id.clone(), self.profiles.len());
                self.profiles.push(profile);
            }
        }
    }

    fn reindex(&mut self) {
        self.track_index = self
            .tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.track_id.clone(), i))
            .collect();
        self.profile_index = self
            .profiles
            .iter()
            .enumerate()
            .map(|(i, p)| (p.profile_id.clone(), i))
            .collect();
    }
}

impl TrackDirectory for Catalog {
    fn track(&self, track_id: &str) -> Result<Option<TrackInfo>, ScidError> {
        Ok(self.track_index.get(track_id).map(|&i| self.tracks[i].clone()))
    }

    fn tracks(&self) -> Result<Vec<TrackInfo>, ScidError> {
        Ok(self.tracks.iter().filter(|t| !t.deleted).cloned().collect())
    }
}

impl ProfileDirectory for Catalog {
    fn profile(&self, profile_id: &str) -> Result<Option<ProfileInfo>, ScidError> {
        Ok(self
            .profile_index
            .get(profile_id)
            .map(|&i| self.profiles[i].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_json_is_indexed() {
        let c = Catalog::from_json(
            r#"{
                "tracks": [
                    { "track_id": "t1", "profile_id": "p1", "nft_data": { "token_id": 7 } },
                    { "track_id": "t2", "profile_id": "p1", "deleted": true }
                ],
                "profiles": [ { "profile_id": "p1", "verified": true } ]
            }"#,
        )
        .unwrap();
        assert!(c.track("t1").unwrap().unwrap().is_nft());
        assert!(c.profile("p1").unwrap().unwrap().verified);
        assert_eq!(c.tracks().unwrap().len(), 1, "deleted tracks are hidden from batch listing");
        assert!(c.track("missing").unwrap().is_none());
    }

    #[test]
    fn nft_detection_needs_token_or_contract() {
        let mut t = TrackInfo {
            track_id: "t".into(),
            profile_id: None,
            title: None,
            nft_data: Some(NftData::default()),
            playback_count: 0,
            deleted: false,
        };
        assert!(!t.is_nft());
        t.nft_data = Some(NftData { contract: Some("0xabc".into()), ..NftData::default() });
        assert!(t.is_nft());
    }
}
