//! Offset-based binary search over a single sorted, flat CDXJ file.

use crate::matchtype::EffectiveQuery;
use cdxj_core::io::SEARCH_READ_SIZE;
use cdxj_core::record::{self, ParseMode};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
}

/// Scan backward from `pos` to the start of the line containing it
/// (the offset just past the nearest preceding `\n`, or 0).
fn line_start_containing(file: &mut File, pos: u64) -> Result<u64, Error> {
    if pos == 0 {
        return Ok(0);
    }

    let mut cursor = pos;
    loop {
        let window_start = cursor.saturating_sub(SEARCH_READ_SIZE as u64);
        let window_len = (cursor - window_start) as usize;

        file.seek(SeekFrom::Start(window_start))?;
        let mut buf = vec![0u8; window_len];
        file.read_exact(&mut buf)?;

        if let Some(idx) = buf.iter().rposition(|&b| b == b'\n') {
            return Ok(window_start + idx as u64 + 1);
        }
        if window_start == 0 {
            return Ok(0);
        }
        cursor = window_start;
    }
}

/// Read the line starting at `offset` (which must itself be a valid
/// line start). Returns the line text and the offset of the next line
/// (or `len` at end of file). `None` when `offset == len`.
fn read_line_at(file: &mut File, offset: u64, len: u64) -> Result<Option<(u64, String)>, Error> {
    if offset >= len {
        return Ok(None);
    }

    let mut read_size = SEARCH_READ_SIZE as u64;
    loop {
        let end = (offset + read_size).min(len);
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; (end - offset) as usize];
        file.read_exact(&mut buf)?;

        if let Some(idx) = buf.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&buf[..idx]).into_owned();
            return Ok(Some((offset + idx as u64 + 1, line)));
        }
        if end == len {
            let line = String::from_utf8_lossy(&buf).into_owned();
            return Ok(Some((len, line)));
        }
        read_size *= 2;
    }
}

/// Offset of the first line whose raw bytes are `>= key`: the
/// comparison is on full-line bytes, which agrees with surt-prefix
/// order because the space delimiter sorts below every SURT character.
fn lower_bound(file: &mut File, len: u64, key: &[u8]) -> Result<u64, Error> {
    let mut lo = 0u64;
    let mut hi = len;

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let line_start = line_start_containing(file, mid)?;

        match read_line_at(file, line_start, len)? {
            None => hi = line_start,
            Some((next_offset, line)) => {
                if record::sort_bytes(&line) < key {
                    lo = next_offset;
                } else {
                    hi = line_start;
                }
            }
        }
    }

    Ok(lo)
}

/// Find every line in `path` matching `query`, in on-disk order.
pub fn search(path: &Path, query: &EffectiveQuery) -> Result<Vec<String>, Error> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let key = query.key.as_bytes();

    let mut offset = lower_bound(&mut file, len, key)?;
    let mut matches = Vec::new();

    while let Some((next_offset, line)) = read_line_at(&mut file, offset, len)? {
        if line.is_empty() {
            offset = next_offset;
            continue;
        }

        let parts = record::split(&line, ParseMode::Lenient)?;

        if !query.matches_surt(parts.surt) {
            break;
        }

        matches.push(line);
        offset = next_offset;
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchtype::MatchType;
    use std::fs;

    fn write_fixture(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("flat.cdxj");
        fs::write(
            &path,
            concat!(
                "com,example)/ 20230101000000 {\"s\":200}\n",
                "com,example)/a 20230101000000 {\"s\":200}\n",
                "com,example,www)/ 20230101000000 {\"s\":200}\n",
                "com,other)/ 20230101000000 {\"s\":200}\n",
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn exact_match_returns_only_equal_surt() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let query = crate::matchtype::expand("com,example)/", MatchType::Exact).unwrap();
        let matches = search(&path, &query).unwrap();

        assert_eq!(matches.len(), 1);
        assert!(matches[0].starts_with("com,example)/ "));
    }

    #[test]
    fn prefix_match_returns_all_under_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let query = crate::matchtype::expand("com,example)/", MatchType::Prefix).unwrap();
        let matches = search(&path, &query).unwrap();

        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn host_match_includes_subdomains() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let query =
            crate::matchtype::expand("http://example.com/ignored", MatchType::Host).unwrap();
        let matches = search(&path, &query).unwrap();

        assert_eq!(matches.len(), 3);
        assert!(matches.iter().all(|line| !line.starts_with("com,other)")));
    }

    #[test]
    fn no_match_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());

        let query = crate::matchtype::expand("net,missing)/", MatchType::Exact).unwrap();
        let matches = search(&path, &query).unwrap();

        assert!(matches.is_empty());
    }
}
