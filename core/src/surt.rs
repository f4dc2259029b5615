//! A simplified Sort-friendly URI Reordering Transform representation.
//!
//! Implements the subset of SURT canonicalization needed to turn a URL (or
//! an already-canonical SURT) into the keys used for exact/prefix/host/
//! domain match-type expansion. This does not attempt bit-compatibility
//! with any particular third-party SURT library; see `DESIGN.md` for the
//! host/domain truncation rule this crate commits to.

use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid SURT: {0}")]
    InvalidSurt(String),
    #[error("Invalid URL")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),
}

/// A parsed SURT key, e.g. `com,example)/path?a=1`.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Surt<'a> {
    source: Cow<'a, str>,
    domain_name_part_lens: Vec<u8>,
}

impl<'a> Surt<'a> {
    pub fn as_str(&'a self) -> &'a str {
        &self.source
    }

    fn path_start(&self) -> usize {
        self.domain_name_part_lens.len()
            + self.domain_name_part_lens.iter().map(|len| *len as usize).sum::<usize>()
    }

    pub fn domain_name_parts(&'a self) -> DomainNamePartIter<'a> {
        DomainNamePartIter {
            source: &self.source[0..self.path_start() - 1],
            domain_name_part_lens: self.domain_name_part_lens.iter(),
        }
    }

    pub fn path(&'a self) -> &'a str {
        &self.source[self.path_start()..]
    }

    /// The key used for an `exact` or `prefix` match: the SURT as given.
    pub fn full_key(&self) -> &str {
        self.as_str()
    }

    /// The key used for a `host` match: the SURT truncated at the `)`
    /// closing the host part, dropping the path entirely.
    pub fn host_key(&self) -> &str {
        &self.source[0..self.path_start()]
    }

    /// The key used for a `domain` match: the host truncated to its
    /// registered part (TLD label plus the next label), so that a
    /// prefix search over this key matches the registered domain and
    /// every subdomain beneath it.
    ///
    /// This is a two-label heuristic, not a public-suffix-list lookup:
    /// good enough for ordinary TLDs, wrong for multi-label public
    /// suffixes like `co.uk`. See `DESIGN.md`.
    pub fn domain_key(&'a self) -> Cow<'a, str> {
        let keep = self.domain_name_part_lens.len().min(2);

        if keep == self.domain_name_part_lens.len() {
            Cow::Borrowed(self.host_key())
        } else {
            let mut end = 0usize;
            for len in &self.domain_name_part_lens[..keep] {
                end += *len as usize + 1;
            }
            // `end` now points just past the keep-th comma; replace it with `)`.
            let mut truncated = self.source[0..end - 1].to_string();
            truncated.push(')');
            Cow::Owned(truncated)
        }
    }

    pub fn parse_str(input: &'a str) -> Result<Self, Error> {
        let mut domain_name_part_lens = Vec::with_capacity(2);
        let mut len = 0usize;

        for ch in input.chars() {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                len += 1;
            } else if ch == ',' {
                domain_name_part_lens.push(
                    len.try_into().map_err(|_| Error::InvalidSurt(input.to_string()))?,
                );
                len = 0;
            } else if ch == ')' {
                domain_name_part_lens.push(
                    len.try_into().map_err(|_| Error::InvalidSurt(input.to_string()))?,
                );
                break;
            } else {
                return Err(Error::InvalidSurt(input.to_string()));
            }
        }

        if domain_name_part_lens.is_empty() {
            return Err(Error::InvalidSurt(input.to_string()));
        }

        Ok(Self {
            source: input.into(),
            domain_name_part_lens,
        })
    }

    pub fn into_owned(self) -> Surt<'static> {
        Surt {
            source: self.source.into_owned().into(),
            domain_name_part_lens: self.domain_name_part_lens,
        }
    }
}

impl Surt<'static> {
    /// Derive a SURT from a URL. Only `http`/`https` URLs with a domain
    /// name (no literal IP, no explicit port) are supported.
    pub fn from_url(input: &str) -> Result<Self, Error> {
        let url: url::Url = input.to_lowercase().parse()?;

        match (url.scheme(), url.domain()) {
            ("http" | "https", Some(domain_name)) if url.port().is_none() => {
                let mut source = String::new();
                let mut domain_name_part_lens = Vec::with_capacity(2);

                for part in domain_name.split('.').rev() {
                    if part != "www" {
                        source.push_str(part);
                        source.push(',');

                        domain_name_part_lens
                            .push(part.len().try_into().map_err(|_| {
                                Error::UnsupportedUrl(input.to_string())
                            })?);
                    }
                }

                source.pop();
                source.push(')');
                source.push_str(url.path());

                if source.ends_with('/') {
                    source.pop();
                }

                let mut query_pairs = url.query_pairs().collect::<Vec<_>>();

                if !query_pairs.is_empty() {
                    query_pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

                    source.push('?');
                    let mut first = true;

                    for (key, value) in query_pairs {
                        if first {
                            first = false;
                        } else {
                            source.push('&');
                        }

                        source.push_str(&key);
                        source.push('=');
                        source.push_str(&value);
                    }
                }

                Ok(Self {
                    source: source.into(),
                    domain_name_part_lens,
                })
            }
            _ => Err(Error::UnsupportedUrl(input.to_string())),
        }
    }
}

impl Display for Surt<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Surt<'static> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Surt::parse_str(s).map(|surt| surt.into_owned())
    }
}

pub struct DomainNamePartIter<'a> {
    source: &'a str,
    domain_name_part_lens: std::slice::Iter<'a, u8>,
}

impl<'a> Iterator for DomainNamePartIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.domain_name_part_lens.next().map(|len| {
            let len = *len as usize;
            let part = &self.source[0..len];
            self.source = &self.source[len.min(self.source.len())..];
            // Skip the separating comma, if any remains.
            self.source = self.source.strip_prefix(',').unwrap_or(self.source);
            part
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let input = "com,example)/a/b";
        let parsed = input.parse::<Surt>().unwrap();

        assert_eq!(parsed.domain_name_parts().count(), 2);
        assert_eq!(parsed.to_string(), input);
    }

    #[test]
    fn from_url_strips_www_and_trailing_slash() {
        let surt = Surt::from_url("https://www.example.com/").unwrap();
        let expected: Surt = "com,example)".parse().unwrap();

        assert_eq!(surt, expected);
    }

    #[test]
    fn host_key_drops_path() {
        let surt: Surt = "com,example)/a/b".parse().unwrap();
        assert_eq!(surt.host_key(), "com,example)");
    }

    #[test]
    fn domain_key_drops_subdomains() {
        let surt: Surt = "com,example,blog)/a".parse().unwrap();
        assert_eq!(surt.domain_key(), "com,example)");
    }

    #[test]
    fn domain_key_already_registered() {
        let surt: Surt = "com,example)/a".parse().unwrap();
        assert_eq!(surt.domain_key(), "com,example)");
    }

    #[test]
    fn rejects_missing_closing_paren() {
        assert!("com,example".parse::<Surt>().is_err());
    }
}
