//! Path-or-stream I/O helpers shared by every operation: `-` denotes
//! standard input/output, buffered at a fixed default size.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// Default buffer size for merge/filter/search input and output streams.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Minimum read size for binary-search probes into a flat CDXJ file.
pub const SEARCH_READ_SIZE: usize = 4096;

const STDIN_STDOUT_MARKER: &str = "-";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error at {path}")]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("I/O error")]
    Io(#[from] io::Error),
}

pub fn is_stdio_marker(path: &Path) -> bool {
    path.as_os_str() == STDIN_STDOUT_MARKER
}

/// Open a raw (unbuffered) reader over a path, or standard input when the
/// path is the `-` marker. Callers are expected to wrap the result in a
/// single `BufReader` sized to their own needs.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>, Error> {
    if is_stdio_marker(path) {
        Ok(Box::new(io::stdin()))
    } else {
        let file = File::open(path).map_err(|source| Error::Path {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// Open a buffered writer over a path, or standard output when the path
/// is the `-` marker. Callers that need atomicity should use
/// [`AtomicFileWriter`] instead of writing straight to a path.
pub fn open_output(path: &Path) -> Result<Box<dyn Write>, Error> {
    if is_stdio_marker(path) {
        Ok(Box::new(io::stdout()))
    } else {
        let file = File::create(path).map_err(|source| Error::Path {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Box::new(BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, file)))
    }
}

/// A writer that accumulates into a temporary file beside its destination
/// and is only made visible (via rename) on an explicit, successful
/// `commit`. Dropped without committing, the temporary file is removed:
/// this is the "temp-and-rename" discipline used for merge output,
/// ZipNum artifacts, and anything else that must never leave a partial
/// file visible to callers.
pub struct AtomicFileWriter {
    dest: PathBuf,
    temp: tempfile::NamedTempFile,
}

impl AtomicFileWriter {
    pub fn create(dest: impl AsRef<Path>) -> Result<Self, Error> {
        let dest = dest.as_ref().to_path_buf();
        let dir = dest.parent().filter(|p| !p.as_os_str().is_empty());

        let temp = match dir {
            Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
            None => tempfile::NamedTempFile::new()?,
        };

        Ok(Self { dest, temp })
    }

    pub fn writer(&mut self) -> &mut tempfile::NamedTempFile {
        &mut self.temp
    }

    pub fn commit(self) -> Result<(), Error> {
        self.temp.persist(&self.dest).map_err(|e| e.error)?;
        Ok(())
    }
}

impl Write for AtomicFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn atomic_writer_commits_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        let mut writer = AtomicFileWriter::create(&dest).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.commit().unwrap();

        let mut contents = String::new();
        File::open(&dest).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn atomic_writer_leaves_nothing_if_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.txt");

        {
            let mut writer = AtomicFileWriter::create(&dest).unwrap();
            writer.write_all(b"hello").unwrap();
        }

        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
