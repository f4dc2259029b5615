//! Per-key cardinality capping: find which SURTs appear more than a
//! threshold number of times, and drop lines carrying those SURTs.

use cdxj_core::record::{self, ParseMode};
use std::collections::HashMap;
use std::io::{BufRead, Write};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RemoveStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Count records per SURT, then emit the ones exceeding `threshold`,
/// most frequent first, tiebroken by SURT so output is deterministic.
/// Writes `<surt>\t<count>` lines followed by a trailing summary
/// comment.
pub fn find<R: BufRead, W: Write>(
    input: R,
    threshold: u64,
    output: &mut W,
) -> Result<usize, Error> {
    let counts = count_keys(input)?;

    let mut excessive: Vec<(&String, &u64)> =
        counts.iter().filter(|(_, count)| **count > threshold).collect();

    excessive.sort_by(|(a_key, a_count), (b_key, b_count)| {
        b_count.cmp(a_count).then_with(|| a_key.cmp(b_key))
    });

    for (key, count) in &excessive {
        writeln!(output, "{}\t{}", key, count)?;
    }

    writeln!(
        output,
        "# Found {} URLs with > {} occurrences",
        excessive.len(),
        threshold
    )?;

    Ok(excessive.len())
}

/// Count records per SURT key without any threshold filtering; the
/// building block shared by `find` and `auto`.
pub fn count_keys<R: BufRead>(input: R) -> Result<HashMap<String, u64>, Error> {
    let mut counts: HashMap<String, u64> = HashMap::new();

    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let parts = record::split(&line, ParseMode::Lenient)?;
        *counts.entry(parts.surt.to_string()).or_insert(0) += 1;
    }

    Ok(counts)
}

/// Load a blacklist of SURT keys from a TSV file: the first
/// tab-or-space-separated field per line is significant, the rest
/// (typically a count) is ignored. `#`-prefixed and blank lines are
/// skipped.
pub fn load_blacklist<R: BufRead>(reader: R) -> Result<std::collections::HashSet<String>, Error> {
    let mut keys = std::collections::HashSet::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim_start();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(key) = trimmed.split(|c: char| c == '\t' || c == ' ').next() {
            if !key.is_empty() {
                keys.insert(key.to_string());
            }
        }
    }

    Ok(keys)
}

/// Drop every line whose SURT is in `blacklist`.
pub fn remove<R: BufRead, W: Write>(
    blacklist: &std::collections::HashSet<String>,
    input: R,
    output: &mut W,
) -> Result<RemoveStats, Error> {
    let mut stats = RemoveStats::default();

    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        let parts = record::split(&line, ParseMode::Lenient)?;

        if blacklist.contains(parts.surt) {
            stats.dropped += 1;
        } else {
            writeln!(output, "{}", line)?;
            stats.kept += 1;
        }
    }

    Ok(stats)
}

/// Two-pass convenience mode over a file path: find the excessive set,
/// then remove it. Requires a reopenable source, so callers must not
/// pass stdin here (the CLI layer rejects `-` before calling this).
pub fn auto<R1: BufRead, R2: BufRead, W: Write>(
    first_pass: R1,
    second_pass: R2,
    threshold: u64,
    output: &mut W,
) -> Result<RemoveStats, Error> {
    let counts = count_keys(first_pass)?;
    let blacklist: std::collections::HashSet<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > threshold)
        .map(|(key, _)| key)
        .collect();

    remove(&blacklist, second_pass, output)
}
