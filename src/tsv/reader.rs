use crate::error::ReadError;
use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Tokenizer settings for a dump file.
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    pub delimiter: u8,
    /// Honour `"`-quoted fields so embedded delimiters survive.
    pub quoting: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            quoting: true,
        }
    }
}

/// One tokenized line. Field count varies per line and carries no type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    record: StringRecord,
}

impl Row {
    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.record.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.record.iter()
    }
}

impl From<Vec<&str>> for Row {
    fn from(fields: Vec<&str>) -> Self {
        Self {
            record: StringRecord::from(fields),
        }
    }
}

/// Lazy, finite row sequence over a delimited byte stream.
///
/// Input is split on `\n` first (a trailing `\r` is dropped, blank lines are
/// skipped) and every line is tokenized on its own, so a quoting fault can
/// never spill into the next line. A line that cannot be tokenized yields
/// `ReadError::MalformedRow` and the iterator keeps going. An I/O failure is
/// terminal: it is yielded once and the iterator is exhausted afterwards.
/// Re-open the source to start over.
pub struct TabularReader<R: BufRead> {
    inner: R,
    options: ReaderOptions,
    tokenizer: ReaderBuilder,
    line: Vec<u8>,
    line_no: u64,
    records: u64,
    done: bool,
}

impl TabularReader<BufReader<File>> {
    pub fn open(path: &Path, options: ReaderOptions) -> Result<Self, ReadError> {
        let file = File::open(path).map_err(|source| ReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(
            BufReader::with_capacity(8 << 20, file),
            options,
        ))
    }
}

impl<R: BufRead> TabularReader<R> {
    pub fn from_reader(reader: R, options: ReaderOptions) -> Self {
        let mut tokenizer = ReaderBuilder::new();
        tokenizer
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter)
            .quoting(options.quoting)
            .trim(csv::Trim::None)
            .buffer_capacity(4 << 10);
        Self {
            inner: reader,
            options,
            tokenizer,
            line: Vec::with_capacity(1 << 10),
            line_no: 0,
            records: 0,
            done: false,
        }
    }

    /// Number of records pulled so far, malformed ones included.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    fn tokenize(&self, line: &[u8]) -> Result<Row, ReadError> {
        let malformed = |message: String| ReadError::MalformedRow {
            record: self.line_no,
            message,
        };
        if self.options.quoting {
            if let Some(fault) = quote_fault(line, self.options.delimiter) {
                return Err(malformed(fault.to_string()));
            }
        }
        let mut record = StringRecord::new();
        self.tokenizer
            .from_reader(line)
            .read_record(&mut record)
            .map_err(|err| malformed(err.to_string()))?;
        Ok(Row { record })
    }
}

/// Reject a line whose quoting `csv` would otherwise repair silently: a quoted
/// field left open at end of line, or text after a closing quote.
fn quote_fault(line: &[u8], delimiter: u8) -> Option<&'static str> {
    let mut i = 0;
    loop {
        if line.get(i) == Some(&b'"') {
            i += 1;
            loop {
                match line.get(i) {
                    None => return Some("quoted field is not closed before end of line"),
                    Some(b'"') if line.get(i + 1) == Some(&b'"') => i += 2,
                    Some(b'"') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            match line.get(i) {
                None => return None,
                Some(b) if *b == delimiter => i += 1,
                Some(_) => return Some("unexpected characters after closing quote"),
            }
        } else {
            match line[i.min(line.len())..].iter().position(|b| *b == delimiter) {
                Some(offset) => i += offset + 1,
                None => return None,
            }
        }
    }
}

impl<R: BufRead> Iterator for TabularReader<R> {
    type Item = Result<Row, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.inner.read_until(b'\n', &mut self.line) {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.line_no += 1;
                    let mut end = self.line.len();
                    if self.line[..end].ends_with(b"\n") {
                        end -= 1;
                    }
                    if self.line[..end].ends_with(b"\r") {
                        end -= 1;
                    }
                    if end == 0 {
                        continue;
                    }
                    self.records += 1;
                    return Some(self.tokenize(&self.line[..end]));
                }
                Err(source) => {
                    self.done = true;
                    self.records += 1;
                    return Some(Err(ReadError::Io {
                        record: self.line_no + 1,
                        source,
                    }));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(input: &[u8]) -> Vec<Result<Row, ReadError>> {
        TabularReader::from_reader(input, ReaderOptions::default()).collect()
    }

    fn fields(row: &Row) -> Vec<&str> {
        row.iter().collect()
    }

    #[test]
    fn splits_on_tabs_with_variable_field_counts() {
        let out = rows(b"a\tb\tc\n1\tx\ty\n2\tz\n");
        assert_eq!(out.len(), 3);
        let parsed: Vec<Row> = out.into_iter().map(Result::unwrap).collect();
        assert_eq!(fields(&parsed[0]), vec!["a", "b", "c"]);
        assert_eq!(fields(&parsed[1]), vec!["1", "x", "y"]);
        assert_eq!(fields(&parsed[2]), vec!["2", "z"]);
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let parsed: Vec<Row> = rows(b"a\tb\r\n1\t2\r\n")
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(fields(&parsed[1]), vec!["1", "2"]);
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters() {
        let parsed: Vec<Row> = rows(b"k\tv\ntt1\t\"left\tright\"\n")
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(fields(&parsed[1]), vec!["tt1", "left\tright"]);
    }

    #[test]
    fn quoting_can_be_disabled() {
        let options = ReaderOptions {
            quoting: false,
            ..ReaderOptions::default()
        };
        let parsed: Vec<Row> = TabularReader::from_reader(&b"k\tv\ntt1\t\"quoted\"\n"[..], options)
            .map(Result::unwrap)
            .collect();
        assert_eq!(fields(&parsed[1]), vec!["tt1", "\"quoted\""]);
    }

    #[test]
    fn malformed_row_does_not_stop_the_stream() {
        let mut input = b"a\tb\n".to_vec();
        input.extend_from_slice(b"ok\t\xff\xfe\n");
        input.extend_from_slice(b"next\tone\n");
        let out = rows(&input);
        assert_eq!(out.len(), 3);
        assert!(matches!(
            out[1],
            Err(ReadError::MalformedRow { record: 2, .. })
        ));
        let last = out[2].as_ref().unwrap();
        assert_eq!(fields(last), vec!["next", "one"]);
    }

    #[test]
    fn unclosed_quote_fails_only_its_own_line() {
        let out = rows(b"a\tb\n\"x\t1\n2\t3\n4\t5\n");
        assert_eq!(out.len(), 4);
        match &out[1] {
            Err(ReadError::MalformedRow { record, message }) => {
                assert_eq!(*record, 2);
                assert!(message.contains("not closed"), "{message}");
            }
            other => panic!("expected a malformed row, got {other:?}"),
        }
        assert_eq!(fields(out[2].as_ref().unwrap()), vec!["2", "3"]);
        assert_eq!(fields(out[3].as_ref().unwrap()), vec!["4", "5"]);
    }

    #[test]
    fn text_after_closing_quote_is_malformed() {
        let out = rows(b"\"x\"y\t1\nz\t2\n");
        assert!(matches!(
            out[0],
            Err(ReadError::MalformedRow { record: 1, .. })
        ));
        assert_eq!(fields(out[1].as_ref().unwrap()), vec!["z", "2"]);
    }

    #[test]
    fn doubled_quotes_and_inner_quotes_are_accepted() {
        let parsed: Vec<Row> = rows(b"\"say \"\"hi\"\"\"\t5'2\" tall\t\"\"\n")
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(fields(&parsed[0]), vec!["say \"hi\"", "5'2\" tall", ""]);
    }

    #[test]
    fn blank_lines_are_skipped_but_counted_as_lines() {
        let out = rows(b"a\tb\n\n\"bad\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(
            out[1],
            Err(ReadError::MalformedRow { record: 3, .. })
        ));
    }

    #[test]
    fn exhausted_reader_stays_exhausted() {
        let mut reader = TabularReader::from_reader(&b"a\n"[..], ReaderOptions::default());
        assert!(reader.next().is_some());
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
        assert_eq!(reader.records_read(), 1);
    }

    #[test]
    fn open_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TabularReader::open(&dir.path().join("absent.tsv"), ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ReadError::Open { .. }));
    }
}
