//! Expand a query URL/SURT plus a match type into the `(key, is_prefix)`
//! pair that drives binary search.

use cdxj_core::surt::{self, Surt};
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid SURT or URL query")]
    InvalidQuery(#[from] surt::Error),
    #[error("unknown match type {0:?}")]
    UnknownMatchType(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchType {
    Exact,
    Prefix,
    Host,
    Domain,
}

impl FromStr for MatchType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "host" => Ok(Self::Host),
            "domain" => Ok(Self::Domain),
            other => Err(Error::UnknownMatchType(other.to_string())),
        }
    }
}

/// The effective search key and whether matching records must merely
/// start with it (`is_prefix`) or equal it exactly.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EffectiveQuery {
    pub key: String,
    pub is_prefix: bool,
}

/// Accepts either a bare SURT (`com,example)/path`) or a URL
/// (`http://example.com/path`); URLs are canonicalized via
/// [`Surt::from_url`] first.
fn query_surt(query: &str) -> Result<Surt<'static>, Error> {
    if query.contains("://") {
        Ok(Surt::from_url(query)?)
    } else {
        Ok(Surt::from_str(query)?)
    }
}

pub fn expand(query: &str, match_type: MatchType) -> Result<EffectiveQuery, Error> {
    let surt = query_surt(query)?;

    let (key, is_prefix) = match match_type {
        MatchType::Exact => (surt.full_key().to_string(), false),
        MatchType::Prefix => (surt.full_key().to_string(), true),
        MatchType::Host => (surt.host_key().to_string(), true),
        MatchType::Domain => (surt.domain_key().into_owned(), true),
    };

    Ok(EffectiveQuery { key, is_prefix })
}

impl EffectiveQuery {
    /// Whether `candidate_surt` satisfies this query.
    ///
    /// Exact queries require byte equality. Prefix queries are a plain
    /// byte prefix, with one exception: when `key` itself ends at a host
    /// boundary (`)`, as produced by `host_key`/`domain_key`), matching is
    /// boundary-aware instead of a raw string prefix. A raw prefix of
    /// `com,example)` does not match `com,example,blog)/...` byte for
    /// byte (`)` sorts before `,`), which would make a host/domain match
    /// miss every subdomain beneath it; conversely a naive prefix of
    /// `com,example` (paren dropped) would wrongly match an unrelated
    /// sibling host like `com,examplefoo)`. Requiring the byte right
    /// after the paren-less prefix to be `)` (same host) or `,` (a
    /// deeper subdomain label) gets both right. Plain `prefix` queries
    /// over a path (key not ending in `)`) are unaffected.
    pub fn matches_surt(&self, candidate_surt: &str) -> bool {
        if !self.is_prefix {
            return candidate_surt == self.key;
        }

        match self.key.strip_suffix(')') {
            Some(host_prefix) => {
                candidate_surt.starts_with(host_prefix)
                    && matches!(
                        candidate_surt.as_bytes().get(host_prefix.len()),
                        Some(b')') | Some(b',')
                    )
            }
            None => candidate_surt.starts_with(self.key.as_str()),
        }
    }
}
