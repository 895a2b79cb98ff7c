use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MICRO_OGUN_PER_OGUN, SECONDS_PER_DAY};
use crate::error::ScidError;

/// Ledger balance in micro-OGUN (1 OGUN = 1_000_000 micro-OGUN).
pub type Balance = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Current wall-clock time as a Unix timestamp.
pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Index of the UTC calendar day containing `ts`.
pub fn utc_day(ts: Timestamp) -> i64 {
    ts.div_euclid(SECONDS_PER_DAY)
}

/// Render a micro-OGUN balance as a decimal OGUN string ("0.350000").
pub fn format_ogun(amount: Balance) -> String {
    format!(
        "{}.{:06}",
        amount / MICRO_OGUN_PER_OGUN,
        amount % MICRO_OGUN_PER_OGUN
    )
}

// ── ChainCode ────────────────────────────────────────────────────────────────

/// Closed set of chains an SCid may be minted against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ChainCode {
    Polygon,
    ZetaChain,
    Ethereum,
    Base,
    Solana,
    Binance,
    Avalanche,
    Arbitrum,
}

impl ChainCode {
    pub const ALL: [ChainCode; 8] = [
        ChainCode::Polygon,
        ChainCode::ZetaChain,
        ChainCode::Ethereum,
        ChainCode::Base,
        ChainCode::Solana,
        ChainCode::Binance,
        ChainCode::Avalanche,
        ChainCode::Arbitrum,
    ];

    /// Three-letter code embedded in the SCid.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainCode::Polygon => "POL",
            ChainCode::ZetaChain => "ZET",
            ChainCode::Ethereum => "ETH",
            ChainCode::Base => "BAS",
            ChainCode::Solana => "SOL",
            ChainCode::Binance => "BNB",
            ChainCode::Avalanche => "AVA",
            ChainCode::Arbitrum => "ARB",
        }
    }
}

impl fmt::Display for ChainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainCode {
    type Err = ScidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        ChainCode::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or(ScidError::UnknownChainCode(upper))
    }
}

impl From<ChainCode> for String {
    fn from(c: ChainCode) -> Self {
        c.as_str().to_string()
    }
}

impl TryFrom<String> for ChainCode {
    type Error = ScidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

// ── Scid ─────────────────────────────────────────────────────────────────────

/// A canonical (uppercase) SCid string, e.g. `SC-POL-7B3A-2400001`.
///
/// Grammar validation lives in `scid-ident`; this type only guarantees the
/// canonical casing used as the storage key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Scid(pub String);

impl Scid {
    /// Normalise user input to the canonical uppercase form.
    pub fn normalized(s: &str) -> Self {
        Self(s.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Scid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Scid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scid({})", self.0)
    }
}

// ── ScidStatus ───────────────────────────────────────────────────────────────

/// Registration status of an SCid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScidStatus {
    /// Minted off-chain, no on-chain proof yet.
    Pending,
    /// On-chain proof recorded.
    Registered,
    /// Ownership moved at least once.
    Transferred,
    /// Administratively revoked (terminal).
    Revoked,
}

impl fmt::Display for ScidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScidStatus::Pending => "PENDING",
            ScidStatus::Registered => "REGISTERED",
            ScidStatus::Transferred => "TRANSFERRED",
            ScidStatus::Revoked => "REVOKED",
        };
        f.write_str(s)
    }
}

impl FromStr for ScidStatus {
    type Err = ScidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ScidStatus::Pending),
            "REGISTERED" => Ok(ScidStatus::Registered),
            "TRANSFERRED" => Ok(ScidStatus::Transferred),
            "REVOKED" => Ok(ScidStatus::Revoked),
            other => Err(ScidError::InvalidInput(format!("unknown status: {other}"))),
        }
    }
}

// ── ListenerKey ──────────────────────────────────────────────────────────────

/// Identity a listener's daily budget is tracked against. A profile wins over
/// a bare wallet when both are known.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerKey {
    Profile(String),
    Wallet(String),
}

impl ListenerKey {
    pub fn resolve(profile_id: Option<&str>, wallet: Option<&str>) -> Option<Self> {
        match (profile_id, wallet) {
            (Some(p), _) if !p.is_empty() => Some(ListenerKey::Profile(p.to_string())),
            (_, Some(w)) if !w.is_empty() => Some(ListenerKey::Wallet(w.to_ascii_lowercase())),
            _ => None,
        }
    }

    /// Storage key in the `listeners` tree.
    pub fn storage_key(&self) -> String {
        match self {
            ListenerKey::Profile(p) => format!("profile:{p}"),
            ListenerKey::Wallet(w) => format!("wallet:{w}"),
        }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_code_parse_is_case_insensitive() {
        assert_eq!("pol".parse::<ChainCode>().unwrap(), ChainCode::Polygon);
        assert_eq!("ARB".parse::<ChainCode>().unwrap(), ChainCode::Arbitrum);
        assert!(matches!(
            "XYZ".parse::<ChainCode>(),
            Err(ScidError::UnknownChainCode(c)) if c == "XYZ"
        ));
    }

    #[test]
    fn utc_day_handles_boundaries() {
        assert_eq!(utc_day(0), 0);
        assert_eq!(utc_day(SECONDS_PER_DAY - 1), 0);
        assert_eq!(utc_day(SECONDS_PER_DAY), 1);
        assert_eq!(utc_day(-1), -1);
    }

    #[test]
    fn format_ogun_keeps_six_decimals() {
        assert_eq!(format_ogun(350_000), "0.350000");
        assert_eq!(format_ogun(12 * MICRO_OGUN_PER_OGUN + 5), "12.000005");
    }

    #[test]
    fn listener_key_prefers_profile() {
        assert_eq!(
            ListenerKey::resolve(Some("p1"), Some("0xABC")),
            Some(ListenerKey::Profile("p1".into()))
        );
        assert_eq!(
            ListenerKey::resolve(None, Some("0xABC")),
            Some(ListenerKey::Wallet("0xabc".into()))
        );
        assert_eq!(ListenerKey::resolve(Some(""), None), None);
    }
}
