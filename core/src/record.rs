//! The CDXJ line codec: `<surt> <timestamp> <json>` triples.

use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Malformed CDXJ line: {0:?}")]
    MalformedLine(String),
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Whether a missing JSON payload or a missing second space is tolerated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseMode {
    /// Used by `merge`: any malformed line aborts the operation.
    Strict,
    /// Used by `addfield`/`search`: a missing JSON payload is treated as
    /// an empty object instead of an error.
    Lenient,
}

/// A borrowed view of the three space-separated parts of a line, before
/// the JSON payload has been parsed. Used by callers (e.g. the merge)
/// that only need to compare or forward bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LineParts<'a> {
    pub surt: &'a str,
    pub timestamp: &'a str,
    pub json_text: &'a str,
}

/// Split a line into its three parts without parsing the JSON payload.
pub fn split(line: &str, mode: ParseMode) -> Result<LineParts<'_>, Error> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    let mut parts = line.splitn(3, ' ');
    let surt = parts.next().filter(|s| !s.is_empty());
    let timestamp = parts.next();
    let json_text = parts.next();

    match (surt, timestamp, json_text) {
        (Some(surt), Some(timestamp), Some(json_text)) => Ok(LineParts {
            surt,
            timestamp,
            json_text,
        }),
        (Some(surt), Some(timestamp), None) if mode == ParseMode::Lenient => Ok(LineParts {
            surt,
            timestamp,
            json_text: "",
        }),
        _ => Err(Error::MalformedLine(line.to_string())),
    }
}

/// A fully parsed, owned CDXJ record.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    pub surt: String,
    pub timestamp: String,
    pub json: Value,
}

impl Record {
    pub fn parse(line: &str, mode: ParseMode) -> Result<Self, Error> {
        let parts = split(line, mode)?;

        let json = if parts.json_text.is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(parts.json_text)?
        };

        Ok(Self {
            surt: parts.surt.to_string(),
            timestamp: parts.timestamp.to_string(),
            json,
        })
    }

    /// Compact-serialize back to a single CDXJ line (no trailing newline).
    pub fn to_line(&self) -> String {
        format(&self.surt, &self.timestamp, &self.json)
    }

    /// The `(surt, timestamp)` sort key.
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.surt, &self.timestamp)
    }
}

/// Render a `surt ts json` line using compact JSON (no internal whitespace).
/// Key ordering of `json` is whatever the `Value` iterates in; this is not
/// guaranteed stable across re-serialization.
pub fn format(surt: &str, timestamp: &str, json: &Value) -> String {
    let mut out = String::with_capacity(surt.len() + timestamp.len() + 32);
    out.push_str(surt);
    out.push(' ');
    out.push_str(timestamp);
    out.push(' ');
    // `to_string` on `Value` is already compact (no pretty-printing).
    out.push_str(&json.to_string());
    out
}

/// The raw bytes used for lexicographic ordering in the merge and in
/// binary search: the line with any trailing newline stripped, compared
/// byte-for-byte so that locale never enters into it.
pub fn sort_bytes(line: &str) -> &[u8] {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_format_round_trip() {
        let line = r#"com,a)/ 20230101000000 {"s":200}"#;
        let record = Record::parse(line, ParseMode::Strict).unwrap();

        assert_eq!(record.surt, "com,a)/");
        assert_eq!(record.timestamp, "20230101000000");
        assert_eq!(record.to_line(), line);
    }

    #[test]
    fn strict_rejects_missing_json() {
        let line = "com,a)/ 20230101000000";
        assert!(Record::parse(line, ParseMode::Strict).is_err());
    }

    #[test]
    fn lenient_tolerates_missing_json() {
        let line = "com,a)/ 20230101000000";
        let record = Record::parse(line, ParseMode::Lenient).unwrap();
        assert_eq!(record.json, Value::Object(serde_json::Map::new()));
    }

    #[test]
    fn rejects_missing_surt() {
        assert!(Record::parse(" 20230101000000 {}", ParseMode::Strict).is_err());
    }

    #[test]
    fn sort_bytes_strips_newline() {
        assert_eq!(sort_bytes("abc\n"), b"abc");
        assert_eq!(sort_bytes("abc\r\n"), b"abc");
        assert_eq!(sort_bytes("abc"), b"abc");
    }
}
