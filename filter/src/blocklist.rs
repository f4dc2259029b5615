//! Drop CDXJ lines whose raw bytes match any of a compiled regex set.

use regex::RegexSet;
use std::io::{BufRead, Write};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub kept: usize,
    pub dropped: usize,
}

pub struct Blocklist {
    patterns: RegexSet,
}

impl Blocklist {
    /// Load patterns from a text file: one regex per line, `#`-prefixed
    /// and blank lines ignored. Patterns that fail to compile are
    /// skipped and returned alongside their compile error as warnings;
    /// a set with zero usable patterns still compiles as a no-op.
    pub fn load<R: BufRead>(reader: R) -> Result<(Self, Vec<String>), Error> {
        let mut usable = Vec::new();
        let mut warnings = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim_start();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            match regex::Regex::new(trimmed) {
                Ok(_) => usable.push(trimmed.to_string()),
                Err(error) => warnings.push(format!(
                    "skipping uncompilable blocklist pattern {:?}: {}",
                    trimmed, error
                )),
            }
        }

        if usable.is_empty() {
            warnings.push("blocklist has zero usable patterns; passing all lines through".to_string());
        }

        // RegexSet::new cannot itself fail here since every member was
        // already validated individually above.
        let patterns = RegexSet::new(&usable).expect("patterns pre-validated individually");

        Ok((Self { patterns }, warnings))
    }

    pub fn is_blocked(&self, line: &str) -> bool {
        self.patterns.is_match(line)
    }
}

/// Stream `input` to `output`, dropping any line the blocklist matches.
pub fn run<R: BufRead, W: Write>(
    blocklist: &Blocklist,
    input: R,
    output: &mut W,
) -> Result<Stats, Error> {
    let mut stats = Stats::default();

    for line in input.lines() {
        let line = line?;

        if blocklist.is_blocked(&line) {
            stats.dropped += 1;
        } else {
            writeln!(output, "{}", line)?;
            stats.kept += 1;
        }
    }

    Ok(stats)
}
