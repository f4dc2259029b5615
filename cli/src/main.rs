use cdxj_core::io as cdxj_io;
use cli_helpers::prelude::*;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

mod output;

use output::OutputSink;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts: Opts = Opts::parse();
    opts.verbose.init_logging()?;

    match opts.command {
        Command::Merge { input, exclude, output } => run_merge(&input, &exclude, &output)?,
        Command::FilterBlocklist { input, patterns, output } => {
            run_filter_blocklist(&input, &patterns, &output)?
        }
        Command::FilterExcessiveUrls(command) => run_excessive(command)?,
        Command::Addfield {
            input,
            output,
            constant,
            transform,
            transform_arg,
            lenient,
        } => run_addfield(&input, &output, &constant, transform, &transform_arg, lenient)?,
        Command::ZipnumEncode {
            input,
            dir,
            chunk_lines,
            shard_size_bytes,
            compression_level,
            workers,
            base_name,
            idx_name,
            loc_name,
            cancel_after_chunks,
        } => run_zipnum_encode(ZipnumEncodeArgs {
            input,
            dir,
            chunk_lines,
            shard_size_bytes,
            compression_level,
            workers,
            base_name,
            idx_name,
            loc_name,
            cancel_after_chunks,
        })?,
        Command::ZipnumDecode {
            index,
            loc_file,
            base_dir,
            workers,
            skip_errors,
            output,
        } => run_zipnum_decode(&index, loc_file, base_dir, workers, skip_errors, &output)?,
        Command::Search(args) => run_search(args)?,
    }

    Ok(())
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("CLI argument reading error")]
    Args(#[from] cli_helpers::Error),
    #[error("core I/O error")]
    CoreIo(#[from] cdxj_core::io::Error),
    #[error("file discovery error")]
    Discover(#[from] cdxj_core::discover::Error),
    #[error("merge error")]
    Merge(#[from] cdxj_merge::Error),
    #[error("merge source resolution error")]
    MergeSources(#[from] cdxj_merge::sources::Error),
    #[error("blocklist filter error")]
    Blocklist(#[from] cdxj_filter::blocklist::Error),
    #[error("excessive-URL filter error")]
    Excessive(#[from] cdxj_filter::excessive::Error),
    #[error("addfield error")]
    Addfield(#[from] cdxj_filter::addfield::Error),
    #[error("ZipNum encode error")]
    ZipnumEncode(#[from] cdxj_zipnum::encoder::Error),
    #[error("ZipNum decode error")]
    ZipnumDecode(#[from] cdxj_zipnum::decoder::Error),
    #[error("index error")]
    Index(#[from] cdxj_zipnum::index::Error),
    #[error("match-type expansion error")]
    MatchType(#[from] cdxj_search::matchtype::Error),
    #[error("flat-file search error")]
    FlatSearch(#[from] cdxj_search::flatfile::Error),
    #[error("ZipNum search error")]
    ZipnumSearch(#[from] cdxj_search::zipnumsearch::Error),
    #[error("filter language error")]
    FilterLang(#[from] cdxj_search::filterlang::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Parser)]
#[clap(name = "cdxj", version, author)]
struct Opts {
    #[clap(flatten)]
    verbose: Verbosity,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// K-way merge of sorted CDXJ sources.
    Merge {
        #[clap(long)]
        input: Vec<PathBuf>,
        #[clap(long)]
        exclude: Vec<String>,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
    /// Drop lines matching any pattern in a blocklist file.
    FilterBlocklist {
        #[clap(long, default_value = "-")]
        input: PathBuf,
        #[clap(long)]
        patterns: PathBuf,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
    #[clap(subcommand)]
    FilterExcessiveUrls(ExcessiveCommand),
    /// Insert constant or transform-computed fields into each line.
    Addfield {
        #[clap(long, default_value = "-")]
        input: PathBuf,
        #[clap(long, default_value = "-")]
        output: PathBuf,
        /// `key=value` constant field, repeatable.
        #[clap(long = "set")]
        constant: Vec<String>,
        /// Name of a statically registered transform (e.g. `strip-field`).
        #[clap(long)]
        transform: Option<String>,
        /// `key=value` argument to the named transform, repeatable.
        #[clap(long = "transform-arg")]
        transform_arg: Vec<String>,
        #[clap(long)]
        lenient: bool,
    },
    /// Chunk a sorted CDXJ stream into compressed shards plus an index.
    ZipnumEncode {
        #[clap(long, default_value = "-")]
        input: PathBuf,
        #[clap(long)]
        dir: PathBuf,
        #[clap(long, default_value_t = 3000)]
        chunk_lines: usize,
        #[clap(long, default_value_t = 100 * 1024 * 1024)]
        shard_size_bytes: u64,
        #[clap(long, default_value_t = 6)]
        compression_level: u32,
        #[clap(long, default_value_t = 4)]
        workers: usize,
        #[clap(long)]
        base_name: String,
        #[clap(long)]
        idx_name: Option<String>,
        #[clap(long)]
        loc_name: Option<String>,
        /// Abort (with temp-file cleanup) after writing this many chunks; for testing cancellation.
        #[clap(long)]
        cancel_after_chunks: Option<usize>,
    },
    /// Reconstruct the flat CDXJ stream from a ZipNum index.
    ZipnumDecode {
        #[clap(long)]
        index: PathBuf,
        #[clap(long)]
        loc_file: Option<PathBuf>,
        #[clap(long)]
        base_dir: Option<PathBuf>,
        #[clap(long, default_value_t = 4)]
        workers: usize,
        #[clap(long)]
        skip_errors: bool,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
    #[clap(subcommand)]
    Search(SearchCommand),
}

#[derive(Debug, Parser)]
enum ExcessiveCommand {
    /// Find keys exceeding the cardinality threshold.
    Find {
        #[clap(long, default_value = "-")]
        input: PathBuf,
        #[clap(long, default_value_t = 1000)]
        threshold: u64,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
    /// Drop lines whose SURT is in a preloaded blacklist.
    Remove {
        #[clap(long, default_value = "-")]
        input: PathBuf,
        #[clap(long)]
        blacklist: PathBuf,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
    /// Two-pass find-then-remove over a file (stdin rejected).
    Auto {
        #[clap(long)]
        input: PathBuf,
        #[clap(long, default_value_t = 1000)]
        threshold: u64,
        #[clap(long, default_value = "-")]
        output: PathBuf,
    },
}

#[derive(Debug, Parser)]
enum SearchCommand {
    /// Binary search a single flat, sorted CDXJ file.
    Flat {
        #[clap(long)]
        input: PathBuf,
        #[clap(flatten)]
        query: QueryArgs,
    },
    /// Binary search a ZipNum index and its shards.
    Zipnum {
        #[clap(long)]
        index: PathBuf,
        #[clap(long)]
        loc_file: Option<PathBuf>,
        #[clap(long)]
        base_dir: Option<PathBuf>,
        #[clap(long)]
        skip_errors: bool,
        #[clap(flatten)]
        query: QueryArgs,
    },
}

#[derive(Debug, Parser)]
struct QueryArgs {
    /// URL or SURT to search for.
    #[clap(long)]
    url: String,
    #[clap(long, default_value = "exact")]
    match_type: String,
    #[clap(long)]
    from: Option<String>,
    #[clap(long)]
    to: Option<String>,
    /// `field=value` / `field!=value` / `field~regex` / `field!~regex`, repeatable.
    #[clap(long)]
    filter: Vec<String>,
    #[clap(long)]
    limit: Option<usize>,
    #[clap(long)]
    sort: bool,
    #[clap(long)]
    dedupe: bool,
    #[clap(long, default_value = "-")]
    output: PathBuf,
}

fn open_buffered_input(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let reader = cdxj_io::open_input(path)?;
    Ok(Box::new(BufReader::with_capacity(cdxj_io::DEFAULT_BUFFER_SIZE, reader)))
}

fn run_merge(input: &[PathBuf], exclude: &[String], output: &Path) -> Result<(), Error> {
    let sources = cdxj_merge::sources::open_sources(input, exclude)?;
    let mut sink = OutputSink::open(output)?;
    let stats = cdxj_merge::merge(sources, sink.writer())?;
    sink.commit()?;
    log::info!("merged {} lines from {} sources", stats.lines_written, stats.sources);
    Ok(())
}

fn run_filter_blocklist(input: &Path, patterns: &Path, output: &Path) -> Result<(), Error> {
    let patterns_reader = open_buffered_input(patterns)?;
    let (blocklist, warnings) = cdxj_filter::blocklist::Blocklist::load(patterns_reader)?;
    for warning in &warnings {
        log::warn!("{warning}");
    }

    let input_reader = open_buffered_input(input)?;
    let mut sink = OutputSink::open(output)?;
    let stats = cdxj_filter::blocklist::run(&blocklist, input_reader, sink.writer())?;
    sink.commit()?;

    log::info!("kept {} dropped {}", stats.kept, stats.dropped);
    Ok(())
}

fn run_excessive(command: ExcessiveCommand) -> Result<(), Error> {
    match command {
        ExcessiveCommand::Find { input, threshold, output } => {
            let reader = open_buffered_input(&input)?;
            let mut sink = OutputSink::open(&output)?;
            let found = cdxj_filter::excessive::find(reader, threshold, sink.writer())?;
            sink.commit()?;
            log::info!("found {found} excessive keys");
        }
        ExcessiveCommand::Remove { input, blacklist, output } => {
            let blacklist_reader = open_buffered_input(&blacklist)?;
            let keys = cdxj_filter::excessive::load_blacklist(blacklist_reader)?;

            let input_reader = open_buffered_input(&input)?;
            let mut sink = OutputSink::open(&output)?;
            let stats = cdxj_filter::excessive::remove(&keys, input_reader, sink.writer())?;
            sink.commit()?;
            log::info!("kept {} dropped {}", stats.kept, stats.dropped);
        }
        ExcessiveCommand::Auto { input, threshold, output } => {
            if cdxj_io::is_stdio_marker(&input) {
                return Err(Error::Config(
                    "auto mode requires a file input (two passes); stdin is rejected".to_string(),
                ));
            }

            let first_pass = open_buffered_input(&input)?;
            let second_pass = open_buffered_input(&input)?;
            let mut sink = OutputSink::open(&output)?;
            let stats = cdxj_filter::excessive::auto(first_pass, second_pass, threshold, sink.writer())?;
            sink.commit()?;
            log::info!("kept {} dropped {}", stats.kept, stats.dropped);
        }
    }

    Ok(())
}

fn run_addfield(
    input: &Path,
    output: &Path,
    constants: &[String],
    transform: Option<String>,
    transform_args: &[String],
    lenient: bool,
) -> Result<(), Error> {
    let mode = match (constants.is_empty(), &transform) {
        (false, None) => cdxj_filter::addfield::Mode::constants(parse_key_value_map(constants)?)?,
        (true, Some(name)) => {
            let transform = cdxj_filter::addfield::Transform::by_name(name)
                .ok_or_else(|| Error::Config(format!("unknown transform {name:?}")))?;
            cdxj_filter::addfield::Mode::transform(transform, parse_key_value_map(transform_args)?)
        }
        (true, None) => {
            return Err(Error::Config(
                "addfield requires either --set constants or --transform".to_string(),
            ))
        }
        (false, Some(_)) => {
            return Err(Error::Config(
                "addfield accepts either --set constants or --transform, not both".to_string(),
            ))
        }
    };

    let parse_mode = if lenient {
        cdxj_core::record::ParseMode::Lenient
    } else {
        cdxj_core::record::ParseMode::Strict
    };

    let reader = open_buffered_input(input)?;
    let mut sink = OutputSink::open(output)?;
    let stats = cdxj_filter::addfield::run(&mode, parse_mode, reader, sink.writer())?;
    sink.commit()?;

    log::info!("annotated {} skipped {}", stats.annotated, stats.skipped);
    Ok(())
}

fn parse_key_value_map(pairs: &[String]) -> Result<HashMap<String, String>, Error> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .ok_or_else(|| Error::Config(format!("expected key=value, got {pair:?}")))
        })
        .collect()
}

struct ZipnumEncodeArgs {
    input: PathBuf,
    dir: PathBuf,
    chunk_lines: usize,
    shard_size_bytes: u64,
    compression_level: u32,
    workers: usize,
    base_name: String,
    idx_name: Option<String>,
    loc_name: Option<String>,
    cancel_after_chunks: Option<usize>,
}

fn run_zipnum_encode(args: ZipnumEncodeArgs) -> Result<(), Error> {
    std::fs::create_dir_all(&args.dir)?;

    let config = cdxj_zipnum::encoder::Config {
        chunk_lines: args.chunk_lines,
        shard_size_bytes: args.shard_size_bytes,
        compression_level: args.compression_level,
        workers: args.workers,
        base_name: args.base_name,
        idx_name: args.idx_name,
        loc_name: args.loc_name,
        cancel_after_chunks: args.cancel_after_chunks,
    };

    let reader = open_buffered_input(&args.input)?;
    let stats = cdxj_zipnum::encoder::encode(&config, &args.dir, reader, &|| false)?;

    log::info!(
        "wrote {} lines in {} chunks across {} shards",
        stats.lines_written,
        stats.chunks_written,
        stats.shards_written
    );
    Ok(())
}

fn run_zipnum_decode(
    index: &Path,
    loc_file: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    workers: usize,
    skip_errors: bool,
    output: &Path,
) -> Result<(), Error> {
    let config = cdxj_zipnum::decoder::Config {
        workers,
        loc_file,
        base_dir,
        skip_errors,
    };

    let index_dir = index.parent().unwrap_or_else(|| Path::new("."));
    let index_reader = open_buffered_input(index)?;
    let mut sink = OutputSink::open(output)?;
    let stats = cdxj_zipnum::decoder::decode(&config, index_reader, index_dir, sink.writer())?;
    sink.commit()?;

    log::info!(
        "decoded {} chunks, {} lines, skipped {}",
        stats.chunks_read,
        stats.lines_written,
        stats.chunks_skipped
    );
    Ok(())
}

fn build_query<'a>(args: &'a QueryArgs) -> Result<cdxj_search::filterlang::Query<'a>, Error> {
    let from = args
        .from
        .as_deref()
        .map(cdxj_core::timestamp::PartialTimestamp::parse)
        .transpose()
        .map_err(cdxj_search::filterlang::Error::from)?;
    let to = args
        .to
        .as_deref()
        .map(cdxj_core::timestamp::PartialTimestamp::parse)
        .transpose()
        .map_err(cdxj_search::filterlang::Error::from)?;

    let predicates = args
        .filter
        .iter()
        .map(|expr| cdxj_search::filterlang::FieldPredicate::parse(expr))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(cdxj_search::filterlang::Query {
        from,
        to,
        predicates,
        sort: args.sort,
        dedupe: args.dedupe,
        limit: args.limit,
    })
}

fn run_search(command: SearchCommand) -> Result<(), Error> {
    match command {
        SearchCommand::Flat { input, query: query_args } => {
            let match_type: cdxj_search::matchtype::MatchType = query_args.match_type.parse()?;
            let effective = cdxj_search::matchtype::expand(&query_args.url, match_type)?;
            let lines = cdxj_search::flatfile::search(&input, &effective)?;

            let query = build_query(&query_args)?;
            let results = cdxj_search::filterlang::apply(&query, lines)?;

            let mut sink = OutputSink::open(&query_args.output)?;
            for line in &results {
                writeln!(sink.writer(), "{line}")?;
            }
            sink.commit()?;

            log::info!("{} matches", results.len());
        }
        SearchCommand::Zipnum {
            index,
            loc_file,
            base_dir,
            skip_errors,
            query: query_args,
        } => {
            let index_dir = index.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
            let index_reader = open_buffered_input(&index)?;
            let entries = cdxj_zipnum::index::read_index(index_reader)?;

            let loc: HashMap<String, String> = match &loc_file {
                Some(path) => {
                    let reader = open_buffered_input(path)?;
                    cdxj_zipnum::index::read_loc(reader)?
                        .into_iter()
                        .map(|entry| (entry.shard_name, entry.path_or_url))
                        .collect()
                }
                None => HashMap::new(),
            };

            let effective_base_dir = base_dir.unwrap_or(index_dir);
            let shard_paths = cdxj_zipnum::decoder::resolve_shard_paths(&entries, &effective_base_dir, &loc);

            let match_type: cdxj_search::matchtype::MatchType = query_args.match_type.parse()?;
            let effective = cdxj_search::matchtype::expand(&query_args.url, match_type)?;
            let lines = cdxj_search::zipnumsearch::search(&entries, &shard_paths, &effective, skip_errors)?;

            let query = build_query(&query_args)?;
            let results = cdxj_search::filterlang::apply(&query, lines)?;

            let mut sink = OutputSink::open(&query_args.output)?;
            for line in &results {
                writeln!(sink.writer(), "{line}")?;
            }
            sink.commit()?;

            log::info!("{} matches", results.len());
        }
    }

    Ok(())
}
