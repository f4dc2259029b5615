//! The CLI's output handle: plain standard output for the `-` marker,
//! or a temp-and-rename [`AtomicFileWriter`] for a real path so a
//! killed or failing command never leaves a partial file visible.

use cdxj_core::io::{self as cdxj_io, AtomicFileWriter};
use std::io::{self, Write};
use std::path::Path;

pub enum OutputSink {
    Stdout(io::Stdout),
    Atomic(AtomicFileWriter),
}

impl OutputSink {
    pub fn open(path: &Path) -> Result<Self, cdxj_io::Error> {
        if cdxj_io::is_stdio_marker(path) {
            Ok(Self::Stdout(io::stdout()))
        } else {
            Ok(Self::Atomic(AtomicFileWriter::create(path)?))
        }
    }

    pub fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(stdout) => stdout,
            Self::Atomic(writer) => writer,
        }
    }

    /// No-op for stdout; renames the temp file into place for a real path.
    pub fn commit(self) -> Result<(), cdxj_io::Error> {
        match self {
            Self::Stdout(_) => Ok(()),
            Self::Atomic(writer) => writer.commit(),
        }
    }
}
