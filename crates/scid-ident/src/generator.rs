//! SCid allocation and parsing.
//!
//! Grammar: `SC-CCC-HHHH-YYNNNNN`
//!   SC     constant prefix
//!   CCC    chain code from the closed set (POL, ZET, ETH, BAS, SOL, BNB, AVA, ARB)
//!   HHHH   uppercase hex artist hash
//!   YY     two-digit year
//!   NNNNN  zero-padded sequence, scoped to (artist hash, year)
//!
//! Parsing is case-insensitive; every output is canonical uppercase.

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use scid_core::constants::{
    ARTIST_HASH_LENGTH, MAX_SEQUENCE, SCID_LENGTH, SCID_PREFIX, SCID_SEPARATOR, SEQUENCE_LENGTH,
};
use scid_core::{ChainCode, Scid, ScidError};

use crate::chain::resolve_chain;
use crate::hash::{artist_hash, md5_prefix};

#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
    /// Wallet address or profile id the artist hash is derived from.
    pub artist_identifier: String,
    pub sequence_number: u64,
    pub chain_code: Option<ChainCode>,
    pub chain_id: Option<u64>,
    /// Full calendar year; only the last two digits are kept.
    pub year: Option<i32>,
}

impl GenerateOptions {
    pub fn new(artist_identifier: impl Into<String>, sequence_number: u64) -> Self {
        Self {
            artist_identifier: artist_identifier.into(),
            sequence_number,
            ..Self::default()
        }
    }

    pub fn chain(mut self, code: ChainCode) -> Self {
        self.chain_code = Some(code);
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

/// Parsed components of a valid SCid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScidComponents {
    pub scid: Scid,
    pub chain_code: ChainCode,
    pub artist_hash: String,
    pub year: u8,
    pub sequence: u32,
}

/// Last two digits of `year`, or of the current UTC year.
pub fn format_year(year: Option<i32>) -> String {
    let y = year.unwrap_or_else(|| chrono::Utc::now().year());
    format!("{:02}", y.rem_euclid(100))
}

pub fn format_sequence(sequence: u64) -> Result<String, ScidError> {
    if sequence > MAX_SEQUENCE as u64 {
        return Err(ScidError::SequenceOutOfRange {
            value: sequence,
            max: MAX_SEQUENCE,
        });
    }
    Ok(format!("{:0width$}", sequence, width = SEQUENCE_LENGTH))
}

pub fn generate(opts: &GenerateOptions) -> Result<Scid, ScidError> {
    let chain = resolve_chain(opts.chain_code, opts.chain_id);
    let hash = artist_hash(&opts.artist_identifier);
    let year = format_year(opts.year);
    let sequence = format_sequence(opts.sequence_number)?;

    Ok(Scid(format!(
        "{SCID_PREFIX}{SCID_SEPARATOR}{chain}{SCID_SEPARATOR}{hash}{SCID_SEPARATOR}{year}{sequence}"
    )))
}

/// `generate` followed by `-XXXX` checksum suffix.
pub fn generate_with_checksum(opts: &GenerateOptions) -> Result<String, ScidError> {
    let scid = generate(opts)?;
    Ok(format!("{scid}{SCID_SEPARATOR}{}", checksum(&scid)))
}

/// First four uppercase hex chars of MD5 over the canonical SCid.
pub fn checksum(scid: &Scid) -> String {
    md5_prefix(scid.as_str())
}

pub fn parse(input: &str) -> Result<ScidComponents, ScidError> {
    let invalid = |reason: &str| ScidError::InvalidScid {
        scid: input.to_string(),
        reason: reason.to_string(),
    };

    if input.is_empty() {
        return Err(invalid("SCid must be a non-empty string"));
    }
    let upper = input.to_ascii_uppercase();
    if upper.len() != SCID_LENGTH {
        return Err(invalid("invalid SCid format"));
    }

    let parts: Vec<&str> = upper.split(SCID_SEPARATOR).collect();
    let [prefix, chain, hash, tail] = parts.as_slice() else {
        return Err(invalid("invalid SCid format"));
    };

    if *prefix != SCID_PREFIX {
        return Err(invalid("invalid SCid format"));
    }
    if chain.len() != 3 || !chain.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(invalid("invalid SCid format"));
    }
    if hash.len() != ARTIST_HASH_LENGTH
        || !hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b))
    {
        return Err(invalid("invalid SCid format"));
    }
    if tail.len() != 2 + SEQUENCE_LENGTH || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("invalid SCid format"));
    }

    let chain_code: ChainCode = chain
        .parse()
        .map_err(|_| invalid(&format!("unknown chain code: {chain}")))?;
    let year: u8 = tail[..2]
        .parse()
        .map_err(|_| invalid("invalid SCid format"))?;
    let sequence: u32 = tail[2..]
        .parse()
        .map_err(|_| invalid("invalid SCid format"))?;

    Ok(ScidComponents {
        chain_code,
        artist_hash: hash.to_string(),
        year,
        sequence,
        scid: Scid(upper.clone()),
    })
}

pub fn validate(input: &str) -> bool {
    parse(input).is_ok()
}

/// `SC-POL-7B3A-2400001` → `SC-POL-7B3A-24-00001`. Invalid input is returned
/// unchanged.
pub fn format_for_display(input: &str) -> String {
    match parse(input) {
        Ok(c) => format!(
            "{SCID_PREFIX}-{}-{}-{:02}-{:0width$}",
            c.chain_code,
            c.artist_hash,
            c.year,
            c.sequence,
            width = SEQUENCE_LENGTH
        ),
        Err(_) => input.to_string(),
    }
}

pub fn same_artist(a: &str, b: &str) -> bool {
    match (parse(a), parse(b)) {
        (Ok(a), Ok(b)) => a.artist_hash == b.artist_hash,
        _ => false,
    }
}

/// `count` consecutive SCids starting at `start_sequence`.
pub fn generate_batch(
    template: &GenerateOptions,
    count: u64,
    start_sequence: u64,
) -> Result<Vec<Scid>, ScidError> {
    (0..count)
        .map(|i| {
            let opts = GenerateOptions {
                sequence_number: start_sequence + i,
                ..template.clone()
            };
            generate(&opts)
        })
        .collect()
}

/// One past the highest sequence among `scids` carrying `artist_hash`.
/// Invalid entries are ignored.
pub fn next_sequence_from_scids<'a, I>(scids: I, artist_hash: &str) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    scids
        .into_iter()
        .filter_map(|s| parse(s).ok())
        .filter(|c| c.artist_hash == artist_hash)
        .map(|c| c.sequence as u64)
        .max()
        .unwrap_or(0)
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(seq: u64) -> GenerateOptions {
        GenerateOptions::new("profile123", seq)
            .chain(ChainCode::Polygon)
            .year(2024)
    }

    #[test]
    fn generate_has_expected_shape() {
        let scid = generate(&opts(1)).unwrap();
        let h = artist_hash("profile123");
        assert_eq!(scid.as_str(), format!("SC-POL-{h}-2400001"));
        assert_eq!(scid.as_str().len(), SCID_LENGTH);
    }

    #[test]
    fn parse_round_trips_generate() {
        let scid = generate(&GenerateOptions::new("0xAbC", 4242).chain_id(42161).year(2031)).unwrap();
        let c = parse(scid.as_str()).unwrap();
        assert_eq!(c.chain_code, ChainCode::Arbitrum);
        assert_eq!(c.artist_hash, artist_hash("0xabc"));
        assert_eq!(c.year, 31);
        assert_eq!(c.sequence, 4242);
        assert_eq!(c.scid, scid);
    }

    #[test]
    fn parse_is_case_insensitive_and_canonicalises() {
        let c = parse("sc-pol-7b3a-2400001").unwrap();
        assert_eq!(c.scid.as_str(), "SC-POL-7B3A-2400001");
        assert_eq!(c.artist_hash, "7B3A");
    }

    #[test]
    fn parse_rejects_unknown_chain() {
        let err = parse("SC-XYZ-7B3A-2400001").unwrap_err();
        match err {
            ScidError::InvalidScid { reason, .. } => assert!(reason.contains("XYZ")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_bad_grammar() {
        for bad in [
            "",
            "SC-POL-7B3A-24-00001",
            "XX-POL-7B3A-2400001",
            "SC-POL-7G3A-2400001",
            "SC-POL-7B3A-24000A1",
            "SC-POLY-7B3-2400001",
        ] {
            assert!(!validate(bad), "{bad:?} should be invalid");
        }
    }

    #[test]
    fn sequence_bounds() {
        assert_eq!(format_sequence(0).unwrap(), "00000");
        assert_eq!(format_sequence(99_999).unwrap(), "99999");
        assert!(matches!(
            generate(&opts(100_000)),
            Err(ScidError::SequenceOutOfRange { value: 100_000, max: 99_999 })
        ));
    }

    #[test]
    fn checksum_suffix_and_display() {
        let scid = generate(&opts(1)).unwrap();
        let with = generate_with_checksum(&opts(1)).unwrap();
        assert_eq!(with, format!("{scid}-{}", checksum(&scid)));
        assert_eq!(checksum(&scid).len(), 4);

        assert_eq!(
            format_for_display("SC-POL-7B3A-2400001"),
            "SC-POL-7B3A-24-00001"
        );
        assert_eq!(format_for_display("garbage"), "garbage");
    }

    #[test]
    fn batch_and_next_sequence() {
        let batch = generate_batch(&opts(0), 3, 7).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(same_artist(batch[0].as_str(), batch[2].as_str()));
        let h = artist_hash("profile123");
        let next = next_sequence_from_scids(batch.iter().map(|s| s.as_str()), &h);
        assert_eq!(next, 10);
        assert_eq!(next_sequence_from_scids(["nope"], &h), 1);
    }

    #[test]
    fn year_keeps_last_two_digits() {
        assert_eq!(format_year(Some(2024)), "24");
        assert_eq!(format_year(Some(2100)), "00");
        assert_eq!(format_year(None).len(), 2);
    }
}
