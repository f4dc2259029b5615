//! The post-search filter language: date-range bounds, field
//! predicates over the JSON payload, and the sort/dedupe/limit
//! post-ops applied to the matched record set.

use cdxj_core::record::{self, ParseMode, Record};
use cdxj_core::timestamp::{self, PartialTimestamp};
use regex::Regex;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
    #[error("Invalid timestamp bound")]
    InvalidTimestamp(#[from] timestamp::Error),
    #[error("Invalid field predicate: {0:?}")]
    InvalidPredicate(String),
    #[error("Invalid regex in field predicate: {0}")]
    InvalidRegex(#[from] regex::Error),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum PredicateOp {
    Equals,
    NotEquals,
    Matches,
    NotMatches,
}

/// A single `field=value` / `field!=value` / `field~regex` /
/// `field!~regex` predicate, evaluated against the record's JSON
/// payload. A field absent from the payload is treated as the empty
/// string, the same as every other value.
pub struct FieldPredicate {
    field: String,
    op: PredicateOp,
    value: String,
    regex: Option<Regex>,
}

impl FieldPredicate {
    /// Parse one predicate expression, e.g. `status=200` or `mime~^text/`.
    pub fn parse(expr: &str) -> Result<Self, Error> {
        let (field, op, rest) = if let Some(rest) = expr.split_once("!~") {
            (rest.0, PredicateOp::NotMatches, rest.1)
        } else if let Some(rest) = expr.split_once("!=") {
            (rest.0, PredicateOp::NotEquals, rest.1)
        } else if let Some(rest) = expr.split_once('~') {
            (rest.0, PredicateOp::Matches, rest.1)
        } else if let Some(rest) = expr.split_once('=') {
            (rest.0, PredicateOp::Equals, rest.1)
        } else {
            return Err(Error::InvalidPredicate(expr.to_string()));
        };

        if field.is_empty() {
            return Err(Error::InvalidPredicate(expr.to_string()));
        }

        let regex = match op {
            PredicateOp::Matches | PredicateOp::NotMatches => Some(Regex::new(rest)?),
            _ => None,
        };

        Ok(Self {
            field: field.to_string(),
            op,
            value: rest.to_string(),
            regex,
        })
    }

    fn matches(&self, record: &Record) -> bool {
        let field_text = record
            .json
            .get(&self.field)
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        match self.op {
            PredicateOp::Equals => field_text == self.value,
            PredicateOp::NotEquals => field_text != self.value,
            PredicateOp::Matches => self.regex.as_ref().is_some_and(|re| re.is_match(&field_text)),
            PredicateOp::NotMatches => self.regex.as_ref().is_none_or(|re| !re.is_match(&field_text)),
        }
    }
}

/// The full set of post-search options: a date range and zero or more
/// field predicates (all must hold, i.e. logical AND), plus the
/// sort/dedupe/limit post-ops.
#[derive(Default)]
pub struct Query<'a> {
    pub from: Option<PartialTimestamp<'a>>,
    pub to: Option<PartialTimestamp<'a>>,
    pub predicates: Vec<FieldPredicate>,
    pub sort: bool,
    pub dedupe: bool,
    pub limit: Option<usize>,
}

/// Apply date range and field predicates, then sort/dedupe/limit, to
/// `lines` (raw CDXJ text, assumed already in on-disk order).
pub fn apply(query: &Query, lines: Vec<String>) -> Result<Vec<String>, Error> {
    let mut kept = Vec::with_capacity(lines.len());

    for line in lines {
        if !timestamp::in_range(timestamp_of(&line)?, query.from.as_ref(), query.to.as_ref()) {
            continue;
        }

        if !query.predicates.is_empty() {
            let record = Record::parse(&line, ParseMode::Lenient)?;
            if !query.predicates.iter().all(|p| p.matches(&record)) {
                continue;
            }
        }

        kept.push(line);
    }

    if query.sort {
        kept.sort_by(|a, b| record::sort_bytes(a).cmp(record::sort_bytes(b)));
    }

    if query.dedupe {
        kept.dedup_by(|a, b| dedupe_key(a) == dedupe_key(b));
    }

    if let Some(limit) = query.limit {
        kept.truncate(limit);
    }

    Ok(kept)
}

fn timestamp_of(line: &str) -> Result<&str, Error> {
    Ok(record::split(line, ParseMode::Lenient)?.timestamp)
}

/// The `(surt, timestamp)` key used to collapse consecutive duplicates.
fn dedupe_key(line: &str) -> Option<(&str, &str)> {
    record::split(line, ParseMode::Lenient)
        .ok()
        .map(|parts| (parts.surt, parts.timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(n: u32, statuses: &[&str]) -> Vec<String> {
        (0..n)
            .map(|i| {
                let year = 2020 + (i % 5);
                let status = statuses[i as usize % statuses.len()];
                format!(
                    "com,a)/{i:02} {year}0601000000 {{\"status\":\"{status}\"}}",
                )
            })
            .collect()
    }

    #[test]
    fn date_range_and_field_predicate_combine_with_and() {
        let input = lines(10, &["200", "404"]);
        let query = Query {
            from: Some(PartialTimestamp::parse("2022").unwrap()),
            to: Some(PartialTimestamp::parse("2023").unwrap()),
            predicates: vec![FieldPredicate::parse("status=200").unwrap()],
            ..Default::default()
        };

        let result = apply(&query, input.clone()).unwrap();

        for line in &result {
            let record = Record::parse(line, ParseMode::Lenient).unwrap();
            let ts = record.timestamp;
            assert!(ts.as_str() >= "20220101000000" && ts.as_str() <= "20231231235959");
            assert_eq!(record.json.get("status").unwrap(), "200");
        }
        assert!(!result.is_empty());
        assert!(result.len() < input.len());
    }

    #[test]
    fn not_equals_keeps_missing_field() {
        let predicate = FieldPredicate::parse("status!=200").unwrap();
        let record = Record::parse("com,a)/ 20230101000000 {}", ParseMode::Lenient).unwrap();
        assert!(predicate.matches(&record));
    }

    #[test]
    fn missing_field_behaves_as_empty_string() {
        let record = Record::parse("com,a)/ 20230101000000 {}", ParseMode::Lenient).unwrap();

        assert!(FieldPredicate::parse("status=").unwrap().matches(&record));
        assert!(!FieldPredicate::parse("status=200").unwrap().matches(&record));
        assert!(FieldPredicate::parse("status~^$").unwrap().matches(&record));
        assert!(!FieldPredicate::parse("status!~^$").unwrap().matches(&record));
    }

    #[test]
    fn regex_predicate_matches_prefix() {
        let predicate = FieldPredicate::parse("mime~^text/").unwrap();
        let record =
            Record::parse(r#"com,a)/ 20230101000000 {"mime":"text/html"}"#, ParseMode::Lenient)
                .unwrap();
        assert!(predicate.matches(&record));
    }

    #[test]
    fn dedupe_collapses_only_consecutive_runs() {
        let input = vec![
            "com,a)/ 20230101000000 {}".to_string(),
            "com,a)/ 20230101000000 {}".to_string(),
            "com,b)/ 20230101000000 {}".to_string(),
            "com,a)/ 20230101000000 {}".to_string(),
        ];

        let query = Query {
            dedupe: true,
            ..Default::default()
        };
        let result = apply(&query, input).unwrap();

        assert_eq!(result.len(), 3);
    }

    #[test]
    fn limit_truncates_after_sort() {
        let input = vec![
            "com,b)/ 20230101000000 {}".to_string(),
            "com,a)/ 20230101000000 {}".to_string(),
        ];

        let query = Query {
            sort: true,
            limit: Some(1),
            ..Default::default()
        };
        let result = apply(&query, input).unwrap();

        assert_eq!(result, vec!["com,a)/ 20230101000000 {}".to_string()]);
    }

    #[test]
    fn rejects_malformed_predicate_expression() {
        assert!(FieldPredicate::parse("no-operator-here").is_err());
    }
}
