//! Resolve merge input arguments (files, directories, `-` for stdin)
//! into open, named readers.

use cdxj_core::{discover, io as cdxj_io};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

fn buffered(reader: Box<dyn Read>) -> Box<dyn BufRead> {
    Box::new(BufReader::with_capacity(cdxj_io::DEFAULT_BUFFER_SIZE, reader))
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] cdxj_io::Error),
    #[error("Discovery error")]
    Discover(#[from] discover::Error),
    #[error("stdin (`-`) cannot be combined with other merge inputs")]
    StdinExclusive,
}

/// Resolve the `merge` command's input arguments into readers, in the
/// order they should be registered with the heap (source index order
/// only affects duplicate-key tiebreaking, not correctness).
pub fn open_sources(
    roots: &[PathBuf],
    exclude_patterns: &[String],
) -> Result<Vec<(String, Box<dyn BufRead>)>, Error> {
    let stdin_count = roots.iter().filter(|p| cdxj_io::is_stdio_marker(p)).count();

    if stdin_count > 0 && roots.len() > 1 {
        return Err(Error::StdinExclusive);
    }

    if stdin_count == 1 {
        let reader = cdxj_io::open_input(Path::new("-"))?;
        return Ok(vec![("-".to_string(), buffered(reader))]);
    }

    let files = discover::resolve_cdxj_inputs(roots, exclude_patterns)?;
    let mut out = Vec::with_capacity(files.len());

    for path in files {
        let reader = cdxj_io::open_input(&path)?;
        let name = path.to_string_lossy().into_owned();
        out.push((name, buffered(reader)));
    }

    Ok(out)
}
