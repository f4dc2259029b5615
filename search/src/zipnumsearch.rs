//! Binary search over a ZipNum index plus candidate-chunk decompression.

use crate::matchtype::EffectiveQuery;
use cdxj_core::record::{self, ParseMode};
use cdxj_zipnum::decoder as zipnum_decoder;
use cdxj_zipnum::index::IndexEntry;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
    #[error("chunk at {shard_name:?} offset {offset} could not be decompressed: {source}")]
    ShardCorrupt {
        shard_name: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("shard {0:?} could not be located")]
    ShardMissing(String),
}

/// Binary search `entries` (already sorted by `first_key`) for the
/// candidate chunk(s) that could contain `query`, decompressing only
/// those chunks and scanning forward within them. Stops as soon as a
/// decompressed line no longer matches, after at least one match has
/// been seen, since the stream is globally sorted.
pub fn search(
    entries: &[IndexEntry],
    shard_paths: &HashMap<String, PathBuf>,
    query: &EffectiveQuery,
    skip_errors: bool,
) -> Result<Vec<String>, Error> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let count_le = entries.partition_point(|e| e.first_key.as_str() <= query.key.as_str());
    let start_idx = count_le.saturating_sub(1);

    let mut matches = Vec::new();
    let mut started = false;

    'chunks: for entry in &entries[start_idx..] {
        let path = match shard_paths.get(&entry.shard_name) {
            Some(path) => path,
            None => {
                if skip_errors {
                    log::warn!("skipping missing shard {:?}", entry.shard_name);
                    continue;
                }
                return Err(Error::ShardMissing(entry.shard_name.clone()));
            }
        };

        let bytes = match zipnum_decoder::read_and_decompress_chunk(path, entry.offset, entry.length) {
            Ok(bytes) => bytes,
            Err(source) => {
                if skip_errors {
                    log::warn!(
                        "skipping corrupt chunk in {:?} at offset {}: {source}",
                        entry.shard_name,
                        entry.offset
                    );
                    continue;
                }
                return Err(Error::ShardCorrupt {
                    shard_name: entry.shard_name.clone(),
                    offset: entry.offset,
                    source,
                });
            }
        };

        let text = String::from_utf8_lossy(&bytes);

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }

            let parts = record::split(line, ParseMode::Lenient)?;

            if query.matches_surt(parts.surt) {
                started = true;
                matches.push(line.to_string());
            } else if started {
                break 'chunks;
            }
        }
    }

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchtype::MatchType;
    use cdxj_zipnum::encoder::{self, Config as EncodeConfig};
    use std::io::Cursor;

    fn sample_lines() -> String {
        concat!(
            "com,example)/ 20230101000000 {\"s\":200}\n",
            "com,example)/a 20230101000000 {\"s\":200}\n",
            "com,example,www)/ 20230101000000 {\"s\":200}\n",
            "com,other)/ 20230101000000 {\"s\":200}\n",
        )
        .to_string()
    }

    #[test]
    fn host_match_spans_chunk_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let config = EncodeConfig {
            chunk_lines: 1,
            base_name: "out".to_string(),
            ..Default::default()
        };

        encoder::encode(&config, dir.path(), Cursor::new(sample_lines()), &|| false).unwrap();

        let idx_bytes = std::fs::read(dir.path().join("out.idx")).unwrap();
        let entries = cdxj_zipnum::index::read_index(Cursor::new(idx_bytes)).unwrap();

        let shard_paths: HashMap<String, PathBuf> = entries
            .iter()
            .map(|e| (e.shard_name.clone(), dir.path().join(&e.shard_name)))
            .collect();

        let query =
            crate::matchtype::expand("http://example.com/ignored", MatchType::Host).unwrap();
        let matches = search(&entries, &shard_paths, &query, false).unwrap();

        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn missing_shard_skipped_when_requested() {
        let entries = vec![IndexEntry {
            first_key: "com,a)/".to_string(),
            shard_name: "ghost.cdx.gz".to_string(),
            offset: 0,
            length: 10,
            shard_num: 0,
        }];
        let shard_paths = HashMap::new();

        let query = crate::matchtype::expand("com,a)/", MatchType::Exact).unwrap();
        let matches = search(&entries, &shard_paths, &query, true).unwrap();
        assert!(matches.is_empty());
    }
}
