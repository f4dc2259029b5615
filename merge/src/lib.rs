//! Sorted k-way merge of CDXJ line streams.
//!
//! A min-heap keyed by raw line bytes drives the merge: each heap entry
//! also carries its source index as a tiebreaker, so the output order for
//! duplicate `(surt, timestamp)` pairs from different sources is
//! deterministic (by source index) even though spec does not mandate any
//! particular preference among them.

use cdxj_core::record::{self, ParseMode};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{BufRead, Write};

pub mod sources;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("Malformed CDXJ line")]
    MalformedLine(#[from] record::Error),
    #[error("Unsorted input: source {source_name} line {line_no}: {prev:?} > {current:?}")]
    UnsortedInput {
        source_name: String,
        line_no: usize,
        prev: String,
        current: String,
    },
}

/// Counters reported once the merge completes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub lines_written: usize,
    pub sources: usize,
}

struct Source<R> {
    name: String,
    reader: R,
    line_no: usize,
    last_line: Option<String>,
}

struct HeapEntry {
    line: String,
    source_idx: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        record::sort_bytes(&self.line) == record::sort_bytes(&other.line)
            && self.source_idx == other.source_idx
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the smallest line surfaces first.
        record::sort_bytes(&self.line)
            .cmp(record::sort_bytes(&other.line))
            .then(self.source_idx.cmp(&other.source_idx))
            .reverse()
    }
}

/// Merge `sources` (each a reader over a sorted CDXJ stream, paired with
/// a name used in error messages) into `output`.
pub fn merge<R: BufRead>(
    sources: Vec<(String, R)>,
    output: &mut dyn Write,
) -> Result<Stats, Error> {
    let mut sources: Vec<Source<R>> = sources
        .into_iter()
        .map(|(name, reader)| Source {
            name,
            reader,
            line_no: 0,
            last_line: None,
        })
        .collect();

    let mut heap = BinaryHeap::with_capacity(sources.len());

    for (idx, source) in sources.iter_mut().enumerate() {
        if let Some(line) = next_validated_line(source)? {
            heap.push(HeapEntry {
                line,
                source_idx: idx,
            });
        }
    }

    let mut stats = Stats {
        lines_written: 0,
        sources: sources.len(),
    };

    while let Some(HeapEntry { line, source_idx }) = heap.pop() {
        writeln!(output, "{}", line)?;
        stats.lines_written += 1;

        if let Some(next_line) = next_validated_line(&mut sources[source_idx])? {
            heap.push(HeapEntry {
                line: next_line,
                source_idx,
            });
        }
    }

    Ok(stats)
}

fn next_validated_line<R: BufRead>(source: &mut Source<R>) -> Result<Option<String>, Error> {
    let mut buf = String::new();

    loop {
        buf.clear();
        let read = source.reader.read_line(&mut buf)?;
        if read == 0 {
            return Ok(None);
        }

        let trimmed = buf.trim_end_matches(['\n', '\r']).to_string();
        if trimmed.is_empty() {
            continue;
        }

        source.line_no += 1;
        record::split(&trimmed, ParseMode::Strict)?;

        if let Some(prev) = &source.last_line {
            if trimmed.as_bytes() < prev.as_bytes() {
                return Err(Error::UnsortedInput {
                    source_name: source.name.clone(),
                    line_no: source.line_no,
                    prev: prev.clone(),
                    current: trimmed,
                });
            }
        }

        source.last_line = Some(trimmed.clone());
        return Ok(Some(trimmed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines(text: &str) -> Cursor<Vec<u8>> {
        Cursor::new(text.as_bytes().to_vec())
    }

    #[test]
    fn merges_two_sorted_streams() {
        let a = r#"com,a)/ 20230101000000 {"s":200}
com,b)/ 20230101000000 {"s":200}
"#;
        let b = r#"com,a)/ 20230201000000 {"s":200}
com,c)/ 20230101000000 {"s":200}
"#;

        let mut output = Vec::new();
        let stats = merge(
            vec![("a".to_string(), lines(a)), ("b".to_string(), lines(b))],
            &mut output,
        )
        .unwrap();

        let expected = "com,a)/ 20230101000000 {\"s\":200}\n\
com,a)/ 20230201000000 {\"s\":200}\n\
com,b)/ 20230101000000 {\"s\":200}\n\
com,c)/ 20230101000000 {\"s\":200}\n";

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(stats.lines_written, 4);
    }

    #[test]
    fn detects_unsorted_input() {
        let a = r#"com,b)/ 20230101000000 {"s":200}
com,a)/ 20230101000000 {"s":200}
"#;

        let mut output = Vec::new();
        let result = merge(vec![("a".to_string(), lines(a))], &mut output);

        assert!(matches!(result, Err(Error::UnsortedInput { .. })));
    }

    #[test]
    fn rejects_malformed_line() {
        let a = "not-a-valid-line\n";

        let mut output = Vec::new();
        let result = merge(vec![("a".to_string(), lines(a))], &mut output);

        assert!(matches!(result, Err(Error::MalformedLine(_))));
    }

    #[test]
    fn stable_duplicate_ordering_by_source_index() {
        let a = r#"com,a)/ 20230101000000 {"src":"a"}
"#;
        let b = r#"com,a)/ 20230101000000 {"src":"b"}
"#;

        let mut output = Vec::new();
        merge(
            vec![("a".to_string(), lines(a)), ("b".to_string(), lines(b))],
            &mut output,
        )
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        let first_line = text.lines().next().unwrap();
        assert!(first_line.contains("\"src\":\"a\""));
    }

    quickcheck::quickcheck! {
        fn sort_preservation(a: Vec<u16>, b: Vec<u16>) -> bool {
            let mut a = a;
            let mut b = b;
            a.sort_unstable();
            b.sort_unstable();
            a.dedup();
            b.dedup();

            let render = |values: &[u16]| -> String {
                values
                    .iter()
                    .map(|v| format!("com,a)/{:05} 20230101000000 {{}}\n", v))
                    .collect()
            };

            let mut output = Vec::new();
            merge(
                vec![
                    ("a".to_string(), lines(&render(&a))),
                    ("b".to_string(), lines(&render(&b))),
                ],
                &mut output,
            )
            .unwrap();

            let output_text = String::from_utf8(output).unwrap();
            let output_lines: Vec<&str> = output_text.lines().collect();

            let mut expected: Vec<u16> = a.iter().chain(b.iter()).copied().collect();
            expected.sort_unstable();

            output_lines.len() == expected.len()
                && output_lines.windows(2).all(|w| w[0] <= w[1])
        }
    }
}
