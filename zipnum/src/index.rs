//! The `.idx` summary index and `.loc` shard location map: both plain
//! UTF-8 TSV, LF-terminated.

use std::io::{BufRead, Write};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("malformed index line: {0:?}")]
    MalformedIndexLine(String),
    #[error("malformed location line: {0:?}")]
    MalformedLocLine(String),
    #[error("invalid integer field in index line: {0:?}")]
    InvalidInteger(String),
}

/// One row of the `.idx` file: the chunk described by
/// `first_key\tshard_name\toffset\tlength\tshard_num`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexEntry {
    pub first_key: String,
    pub shard_name: String,
    pub offset: u64,
    pub length: u64,
    pub shard_num: u32,
}

impl IndexEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}",
            self.first_key, self.shard_name, self.offset, self.length, self.shard_num
        )
    }

    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut fields = line.split('\t');

        let first_key = fields.next().filter(|s| !s.is_empty());
        let shard_name = fields.next().filter(|s| !s.is_empty());
        let offset = fields.next();
        let length = fields.next();
        let shard_num = fields.next();
        let extra = fields.next();

        match (first_key, shard_name, offset, length, shard_num, extra) {
            (Some(first_key), Some(shard_name), Some(offset), Some(length), Some(shard_num), None) => {
                Ok(Self {
                    first_key: first_key.to_string(),
                    shard_name: shard_name.to_string(),
                    offset: offset
                        .parse()
                        .map_err(|_| Error::InvalidInteger(line.to_string()))?,
                    length: length
                        .parse()
                        .map_err(|_| Error::InvalidInteger(line.to_string()))?,
                    shard_num: shard_num
                        .parse()
                        .map_err(|_| Error::InvalidInteger(line.to_string()))?,
                })
            }
            _ => Err(Error::MalformedIndexLine(line.to_string())),
        }
    }
}

/// Write index entries, already in `first_key` order, as TSV.
pub fn write_index<W: Write>(entries: &[IndexEntry], output: &mut W) -> Result<(), Error> {
    for entry in entries {
        writeln!(output, "{}", entry.to_line())?;
    }
    Ok(())
}

pub fn read_index<R: BufRead>(input: R) -> Result<Vec<IndexEntry>, Error> {
    let mut entries = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        entries.push(IndexEntry::parse(&line)?);
    }
    Ok(entries)
}

/// One row of the `.loc` file: `shard_name\tpath_or_url`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocEntry {
    pub shard_name: String,
    pub path_or_url: String,
}

pub fn write_loc<W: Write>(entries: &[LocEntry], output: &mut W) -> Result<(), Error> {
    for entry in entries {
        writeln!(output, "{}\t{}", entry.shard_name, entry.path_or_url)?;
    }
    Ok(())
}

pub fn read_loc<R: BufRead>(input: R) -> Result<Vec<LocEntry>, Error> {
    let mut entries = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, '\t');
        match (fields.next(), fields.next()) {
            (Some(shard_name), Some(path_or_url)) if !shard_name.is_empty() => {
                entries.push(LocEntry {
                    shard_name: shard_name.to_string(),
                    path_or_url: path_or_url.to_string(),
                });
            }
            _ => return Err(Error::MalformedLocLine(line)),
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn index_entry_round_trips() {
        let entry = IndexEntry {
            first_key: "com,a)/".to_string(),
            shard_name: "base.cdx.gz".to_string(),
            offset: 0,
            length: 128,
            shard_num: 0,
        };
        let line = entry.to_line();
        assert_eq!(IndexEntry::parse(&line).unwrap(), entry);
    }

    #[test]
    fn rejects_malformed_index_line() {
        assert!(IndexEntry::parse("com,a)/\tshard.cdx.gz\t0").is_err());
    }

    #[test]
    fn loc_round_trips() {
        let entries = vec![LocEntry {
            shard_name: "base.cdx.gz".to_string(),
            path_or_url: "/data/base.cdx.gz".to_string(),
        }];

        let mut buf = Vec::new();
        write_loc(&entries, &mut buf).unwrap();

        let parsed = read_loc(Cursor::new(buf)).unwrap();
        assert_eq!(parsed, entries);
    }
}
