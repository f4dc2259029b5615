//! Read a `.idx` summary (and optional `.loc` map) and emit the
//! original sorted CDXJ stream by decompressing each referenced chunk
//! in index order.

use crate::concurrency::map_ordered;
use crate::index::{self, IndexEntry, LocEntry};
use flate2::read::GzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("index parse error")]
    Index(#[from] index::Error),
    #[error("shard {0:?} could not be located (no .loc entry and no file beside the index)")]
    ShardMissing(String),
    #[error("chunk at {shard_name:?} offset {offset} could not be decompressed: {source}")]
    ShardCorrupt {
        shard_name: String,
        offset: u64,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub workers: usize,
    pub loc_file: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    /// When true, a missing or corrupt shard is logged and skipped
    /// instead of aborting the whole decode.
    pub skip_errors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 4,
            loc_file: None,
            base_dir: None,
            skip_errors: false,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub chunks_read: usize,
    pub lines_written: usize,
    pub chunks_skipped: usize,
}

/// Map each distinct shard name referenced by `entries` to a physical
/// path: the `.loc` mapping takes precedence, falling back to a file
/// of that name beside the index. Exposed for `cdxj-search`'s ZipNum
/// binary search, which needs the same resolution without decoding
/// the whole index.
pub fn resolve_shard_paths(
    entries: &[IndexEntry],
    base_dir: &Path,
    loc: &HashMap<String, String>,
) -> HashMap<String, PathBuf> {
    let mut resolved = HashMap::new();

    for entry in entries {
        if resolved.contains_key(&entry.shard_name) {
            continue;
        }

        let path = match loc.get(&entry.shard_name) {
            Some(location) => PathBuf::from(location),
            None => base_dir.join(&entry.shard_name),
        };

        resolved.insert(entry.shard_name.clone(), path);
    }

    resolved
}

fn read_chunk_bytes(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

fn decompress_chunk(gzip_bytes: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut decoder = GzDecoder::new(gzip_bytes);
    let mut out = Vec::with_capacity(gzip_bytes.len() * 3);
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Fetch and decompress a single chunk by its on-disk location,
/// without going through a whole-index decode. Used both by single-chunk
/// retries (`skip_errors`) and by `cdxj-search`'s candidate-chunk scan.
pub fn read_and_decompress_chunk(path: &Path, offset: u64, length: u64) -> Result<Vec<u8>, std::io::Error> {
    let gzip_bytes = read_chunk_bytes(path, offset, length)?;
    decompress_chunk(&gzip_bytes)
}

struct Job {
    index: usize,
    entry: IndexEntry,
    path: Option<PathBuf>,
}

enum JobResult {
    Lines(Vec<u8>),
    Missing(String),
    Corrupt { shard_name: String, offset: u64, message: String },
}

pub fn decode<R: BufRead, W: Write>(
    config: &Config,
    index_input: R,
    index_dir: &Path,
    output: &mut W,
) -> Result<Stats, Error> {
    let entries = index::read_index(index_input)?;

    let loc: HashMap<String, String> = match &config.loc_file {
        Some(path) => {
            let file = std::fs::File::open(path)?;
            index::read_loc(std::io::BufReader::new(file))?
                .into_iter()
                .map(|LocEntry { shard_name, path_or_url }| (shard_name, path_or_url))
                .collect()
        }
        None => HashMap::new(),
    };

    let base_dir = config.base_dir.clone().unwrap_or_else(|| index_dir.to_path_buf());
    let shard_paths = resolve_shard_paths(&entries, &base_dir, &loc);

    let jobs: Vec<Job> = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| Job {
            index,
            entry: entry.clone(),
            path: shard_paths.get(&entry.shard_name).cloned(),
        })
        .collect();

    let results = map_ordered(jobs, config.workers, |job| -> JobResult {
        let path = match &job.path {
            Some(path) => path,
            None => return JobResult::Missing(job.entry.shard_name.clone()),
        };

        let gzip_bytes = match read_chunk_bytes(path, job.entry.offset, job.entry.length) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return JobResult::Missing(job.entry.shard_name.clone())
            }
            Err(error) => {
                return JobResult::Corrupt {
                    shard_name: job.entry.shard_name.clone(),
                    offset: job.entry.offset,
                    message: error.to_string(),
                }
            }
        };

        match decompress_chunk(&gzip_bytes) {
            Ok(lines) => JobResult::Lines(lines),
            Err(error) => JobResult::Corrupt {
                shard_name: job.entry.shard_name.clone(),
                offset: job.entry.offset,
                message: error.to_string(),
            },
        }
    });

    let mut stats = Stats::default();

    for result in results {
        match result {
            JobResult::Lines(bytes) => {
                output.write_all(&bytes)?;
                stats.chunks_read += 1;
                stats.lines_written += bytes.iter().filter(|b| **b == b'\n').count();
            }
            JobResult::Missing(shard_name) => {
                if config.skip_errors {
                    log::warn!("skipping missing shard {shard_name:?}");
                    stats.chunks_skipped += 1;
                } else {
                    return Err(Error::ShardMissing(shard_name));
                }
            }
            JobResult::Corrupt { shard_name, offset, message } => {
                if config.skip_errors {
                    log::warn!("skipping corrupt chunk in {shard_name:?} at offset {offset}: {message}");
                    stats.chunks_skipped += 1;
                } else {
                    return Err(Error::ShardCorrupt {
                        shard_name,
                        offset,
                        source: std::io::Error::new(std::io::ErrorKind::InvalidData, message),
                    });
                }
            }
        }
    }

    Ok(stats)
}
