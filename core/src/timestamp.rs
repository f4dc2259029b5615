//! CDXJ timestamps: the 14-digit `YYYYMMDDhhmmss` secondary sort key, and
//! the flexible-precision values accepted by search range filters.

use chrono::NaiveDateTime;
use std::fmt::Display;
use std::str::FromStr;

const TIMESTAMP_FMT: &str = "%Y%m%d%H%M%S";
const FULL_LEN: usize = 14;
const LOW_PAD: &str = "00000000000000";
const HIGH_PAD: &str = "99999999999999";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid timestamp length: {0}")]
    InvalidLength(String),
    #[error("Invalid timestamp digits: {0}")]
    InvalidDigits(String),
    #[error("Invalid calendar timestamp: {0}")]
    InvalidDateTime(String),
}

/// A full, calendar-valid 14-digit CDXJ timestamp.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(NaiveDateTime);

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FMT))
    }
}

impl FromStr for Timestamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FULL_LEN {
            return Err(Error::InvalidLength(s.to_string()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidDigits(s.to_string()));
        }

        NaiveDateTime::parse_from_str(s, TIMESTAMP_FMT)
            .map(Timestamp)
            .map_err(|_| Error::InvalidDateTime(s.to_string()))
    }
}

/// A possibly-truncated timestamp as given on the command line for a
/// `from`/`to` range bound: anywhere from a bare year (4 digits) up to
/// a full 14-digit timestamp. Comparison against a record's raw 14-digit
/// timestamp segment happens purely at the byte level, so neither bound
/// needs to itself be a calendar-valid instant (`to=99999999999999` is
/// legal and means "no upper bound").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PartialTimestamp<'a>(&'a str);

impl<'a> PartialTimestamp<'a> {
    pub fn parse(input: &'a str) -> Result<Self, Error> {
        if input.is_empty() || input.len() > FULL_LEN {
            return Err(Error::InvalidLength(input.to_string()));
        }
        if !input.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidDigits(input.to_string()));
        }

        Ok(Self(input))
    }

    /// Left-pad with zeros to form the inclusive lower bound.
    pub fn normalize_low(&self) -> String {
        let mut out = self.0.to_string();
        out.push_str(&LOW_PAD[self.0.len()..]);
        out
    }

    /// Right-pad with nines to form the inclusive upper bound.
    pub fn normalize_high(&self) -> String {
        let mut out = self.0.to_string();
        out.push_str(&HIGH_PAD[self.0.len()..]);
        out
    }
}

/// Whether `timestamp` (a raw 14-digit segment) falls within `[from, to]`,
/// where either bound may be absent.
pub fn in_range(timestamp: &str, from: Option<&PartialTimestamp>, to: Option<&PartialTimestamp>) -> bool {
    if let Some(from) = from {
        if timestamp < from.normalize_low().as_str() {
            return false;
        }
    }
    if let Some(to) = to {
        if timestamp > to.normalize_high().as_str() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let ts: Timestamp = "20230101000000".parse().unwrap();
        assert_eq!(ts.to_string(), "20230101000000");
    }

    #[test]
    fn rejects_bad_length() {
        assert!("2023010100000".parse::<Timestamp>().is_err());
    }

    #[test]
    fn rejects_non_digits() {
        assert!("2023010100000x".parse::<Timestamp>().is_err());
    }

    #[test]
    fn partial_normalizes_low_and_high() {
        let year = PartialTimestamp::parse("2022").unwrap();
        assert_eq!(year.normalize_low(), "20220000000000");
        assert_eq!(year.normalize_high(), "20229999999999");
    }

    #[test]
    fn range_check() {
        let from = PartialTimestamp::parse("2022").unwrap();
        let to = PartialTimestamp::parse("2023").unwrap();

        assert!(in_range("20220601000000", Some(&from), Some(&to)));
        assert!(!in_range("20210601000000", Some(&from), Some(&to)));
        assert!(!in_range("20240101000000", Some(&from), Some(&to)));
    }
}
