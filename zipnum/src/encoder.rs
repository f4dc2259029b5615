//! Split a sorted CDXJ stream into gzip-compressed shards plus a
//! searchable `.idx` summary and `.loc` location map.

use crate::concurrency::map_ordered;
use crate::index::{write_index, write_loc, IndexEntry, LocEntry};
use cdxj_core::io::AtomicFileWriter;
use cdxj_core::record::{self, ParseMode};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("core I/O error")]
    CoreIo(#[from] cdxj_core::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
    #[error("Unsorted input at line {line_no}: {prev:?} > {current:?}")]
    UnsortedInput {
        line_no: usize,
        prev: String,
        current: String,
    },
    #[error("encoding cancelled after {chunks_written} chunks")]
    Cancelled { chunks_written: usize },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub chunk_lines: usize,
    pub shard_size_bytes: u64,
    pub compression_level: u32,
    pub workers: usize,
    pub base_name: String,
    pub idx_name: Option<String>,
    pub loc_name: Option<String>,
    /// Test-only cooperative cancellation hook: abort after this many
    /// chunks have been produced, exercising the temp-and-rename
    /// cleanup path without relying on OS signals.
    pub cancel_after_chunks: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_lines: 3000,
            shard_size_bytes: 100 * 1024 * 1024,
            compression_level: 6,
            workers: 4,
            base_name: "out".to_string(),
            idx_name: None,
            loc_name: None,
            cancel_after_chunks: None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub lines_written: usize,
    pub chunks_written: usize,
    pub shards_written: usize,
}

struct RawChunk {
    index: usize,
    first_key: String,
    lines: usize,
    bytes: Vec<u8>,
}

struct CompressedChunk {
    index: usize,
    first_key: String,
    lines: usize,
    gzip_bytes: Vec<u8>,
}

/// Pulls successive chunks of `chunk_lines` lines from a sorted CDXJ
/// stream, validating the whole-stream sort invariant as it goes.
struct Chunker<R> {
    reader: R,
    chunk_lines: usize,
    next_index: usize,
    line_no: usize,
    last_line: Option<String>,
    eof: bool,
}

impl<R: BufRead> Chunker<R> {
    fn new(reader: R, chunk_lines: usize) -> Self {
        Self {
            reader,
            chunk_lines: chunk_lines.max(1),
            next_index: 0,
            line_no: 0,
            last_line: None,
            eof: false,
        }
    }

    fn next_chunk(&mut self) -> Result<Option<RawChunk>, Error> {
        if self.eof {
            return Ok(None);
        }

        let mut bytes = Vec::new();
        let mut first_key = None;
        let mut lines_in_chunk = 0;
        let mut buf = String::new();

        while lines_in_chunk < self.chunk_lines {
            buf.clear();
            let read = self.reader.read_line(&mut buf)?;
            if read == 0 {
                self.eof = true;
                break;
            }

            let trimmed = buf.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }

            self.line_no += 1;

            if let Some(prev) = &self.last_line {
                if trimmed.as_bytes() < prev.as_bytes() {
                    return Err(Error::UnsortedInput {
                        line_no: self.line_no,
                        prev: prev.clone(),
                        current: trimmed.to_string(),
                    });
                }
            }
            self.last_line = Some(trimmed.to_string());

            if first_key.is_none() {
                let parts = record::split(trimmed, ParseMode::Lenient)?;
                first_key = Some(parts.surt.to_string());
            } else {
                // still validates the line shape even past the first.
                record::split(trimmed, ParseMode::Lenient)?;
            }

            bytes.extend_from_slice(trimmed.as_bytes());
            bytes.push(b'\n');
            lines_in_chunk += 1;
        }

        if lines_in_chunk == 0 {
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;

        Ok(Some(RawChunk {
            index,
            first_key: first_key.expect("chunk with lines has a first key"),
            lines: lines_in_chunk,
            bytes,
        }))
    }
}

fn compress_chunk(chunk: RawChunk, level: u32) -> Result<CompressedChunk, Error> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(chunk.bytes.len() / 2), Compression::new(level));
    encoder.write_all(&chunk.bytes)?;
    let gzip_bytes = encoder.finish()?;

    Ok(CompressedChunk {
        index: chunk.index,
        first_key: chunk.first_key,
        lines: chunk.lines,
        gzip_bytes,
    })
}

fn shard_name(base: &str, shard_num: u32) -> String {
    if shard_num == 0 {
        format!("{base}.cdx.gz")
    } else {
        format!("{base}-{shard_num:02}.cdx.gz")
    }
}

/// Owns the current shard's temp-and-rename writer, switching to a new
/// shard once the configured byte budget would be exceeded. Tracks
/// every shard opened so a cancellation can discard them all.
struct ShardWriter {
    dir: PathBuf,
    base: String,
    shard_size_bytes: u64,
    shard_num: u32,
    offset: u64,
    current: Option<AtomicFileWriter>,
    committed: Vec<(u32, PathBuf)>,
}

impl ShardWriter {
    fn new(dir: &Path, base: &str, shard_size_bytes: u64) -> Self {
        Self {
            dir: dir.to_path_buf(),
            base: base.to_string(),
            shard_size_bytes,
            shard_num: 0,
            offset: 0,
            current: None,
            committed: Vec::new(),
        }
    }

    fn ensure_open(&mut self) -> Result<(), Error> {
        if self.current.is_none() {
            let path = self.dir.join(shard_name(&self.base, self.shard_num));
            self.current = Some(AtomicFileWriter::create(&path)?);
        }
        Ok(())
    }

    /// Writes one already-compressed chunk, returning its index entry.
    /// A chunk larger than `shard_size_bytes` still lands whole in a
    /// single shard: chunk boundaries dominate the size bound.
    fn write_chunk(&mut self, chunk: CompressedChunk) -> Result<IndexEntry, Error> {
        if self.current.is_some() && self.offset > 0 && self.offset + chunk.gzip_bytes.len() as u64 > self.shard_size_bytes {
            self.seal_current()?;
            self.shard_num += 1;
            self.offset = 0;
        }

        self.ensure_open()?;
        let name = shard_name(&self.base, self.shard_num);
        let offset = self.offset;

        self.current
            .as_mut()
            .expect("just opened")
            .write_all(&chunk.gzip_bytes)?;

        self.offset += chunk.gzip_bytes.len() as u64;

        Ok(IndexEntry {
            first_key: chunk.first_key,
            shard_name: name,
            offset,
            length: chunk.gzip_bytes.len() as u64,
            shard_num: self.shard_num,
        })
    }

    fn seal_current(&mut self) -> Result<(), Error> {
        if let Some(writer) = self.current.take() {
            let path = self.dir.join(shard_name(&self.base, self.shard_num));
            writer.commit()?;
            self.committed.push((self.shard_num, path));
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Vec<(u32, PathBuf)>, Error> {
        self.seal_current()?;
        Ok(self.committed)
    }

    /// Drop the in-progress shard writer (its temp file is removed by
    /// `AtomicFileWriter`'s drop) and leave previously-committed shards
    /// in place, matching the cancellation contract.
    fn abort(self) {
        drop(self.current);
    }
}

pub fn encode<R: BufRead>(
    config: &Config,
    dir: &Path,
    input: R,
    cancel: &dyn Fn() -> bool,
) -> Result<Stats, Error> {
    let mut chunker = Chunker::new(input, config.chunk_lines);
    let mut shard_writer = ShardWriter::new(dir, &config.base_name, config.shard_size_bytes);
    let mut index_entries = Vec::new();
    let mut stats = Stats::default();

    loop {
        let mut batch = Vec::with_capacity(config.workers.max(1));
        for _ in 0..config.workers.max(1) {
            match chunker.next_chunk()? {
                Some(chunk) => batch.push(chunk),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }

        let level = config.compression_level;
        let compressed = map_ordered(batch, config.workers, move |chunk| compress_chunk(chunk, level));

        for chunk in compressed {
            let chunk = chunk?;
            stats.lines_written += chunk.lines;
            let entry = shard_writer.write_chunk(chunk)?;
            index_entries.push(entry);
            stats.chunks_written += 1;

            let cancelled = cancel()
                || config
                    .cancel_after_chunks
                    .is_some_and(|limit| stats.chunks_written >= limit);
            if cancelled {
                shard_writer.abort();
                return Err(Error::Cancelled {
                    chunks_written: stats.chunks_written,
                });
            }
        }
    }

    let committed = shard_writer.finish()?;
    stats.shards_written = committed.len();

    let idx_name = config.idx_name.clone().unwrap_or_else(|| format!("{}.idx", config.base_name));
    let loc_name = config.loc_name.clone().unwrap_or_else(|| format!("{}.loc", config.base_name));

    let mut idx_writer = AtomicFileWriter::create(dir.join(&idx_name))?;
    write_index(&index_entries, &mut idx_writer)?;
    idx_writer.commit()?;

    let loc_entries: Vec<LocEntry> = committed
        .iter()
        .map(|(shard_num, path)| LocEntry {
            shard_name: shard_name(&config.base_name, *shard_num),
            path_or_url: path.to_string_lossy().into_owned(),
        })
        .collect();

    let mut loc_writer = AtomicFileWriter::create(dir.join(&loc_name))?;
    write_loc(&loc_entries, &mut loc_writer)?;
    loc_writer.commit()?;

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::read_index;
    use std::io::Cursor;

    fn sample_lines(n: usize) -> String {
        (0..n)
            .map(|i| format!("com,a)/{i:05} 20230101000000 {{\"n\":{i}}}\n"))
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_artifacts_and_no_shards() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            base_name: "out".to_string(),
            ..Default::default()
        };

        let stats = encode(&config, dir.path(), Cursor::new(""), &|| false).unwrap();

        assert_eq!(stats, Stats::default());
        assert!(!dir.path().join("out.cdx.gz").exists());
        assert!(dir.path().join("out.idx").exists());
        assert_eq!(std::fs::read_to_string(dir.path().join("out.idx")).unwrap(), "");
    }

    #[test]
    fn small_chunks_produce_expected_index() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            chunk_lines: 2,
            base_name: "out".to_string(),
            ..Default::default()
        };

        let input = sample_lines(6);
        let stats = encode(&config, dir.path(), Cursor::new(input), &|| false).unwrap();

        assert_eq!(stats.lines_written, 6);
        assert_eq!(stats.chunks_written, 3);

        let idx_bytes = std::fs::read(dir.path().join("out.idx")).unwrap();
        let entries = read_index(Cursor::new(idx_bytes)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].first_key, "com,a)/00000");
        assert_eq!(entries[1].first_key, "com,a)/00002");
        assert_eq!(entries[2].first_key, "com,a)/00004");
    }

    #[test]
    fn rejects_unsorted_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();

        let input = "com,b)/ 20230101000000 {}\ncom,a)/ 20230101000000 {}\n";
        let result = encode(&config, dir.path(), Cursor::new(input), &|| false);

        assert!(matches!(result, Err(Error::UnsortedInput { .. })));
    }

    #[test]
    fn cancellation_leaves_no_artifacts_visible() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            chunk_lines: 1,
            cancel_after_chunks: Some(2),
            base_name: "out".to_string(),
            ..Default::default()
        };

        let input = sample_lines(5);
        let result = encode(&config, dir.path(), Cursor::new(input), &|| false);

        assert!(matches!(result, Err(Error::Cancelled { chunks_written: 2 })));
        assert!(!dir.path().join("out.idx").exists());
        assert!(!dir.path().join("out.loc").exists());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".cdx.gz"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn shard_rollover_on_size_budget() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            chunk_lines: 1,
            shard_size_bytes: 40,
            base_name: "out".to_string(),
            ..Default::default()
        };

        let input = sample_lines(20);
        let stats = encode(&config, dir.path(), Cursor::new(input), &|| false).unwrap();

        assert!(stats.shards_written > 1);
        assert!(dir.path().join("out-01.cdx.gz").exists());
    }
}
