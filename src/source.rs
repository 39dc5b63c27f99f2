//! The line source: a header line followed by raw data lines.

use crate::error::{ProfileError, Result};
use crate::io::compression::DynReader;
use crate::tokenize::{Tokenizer, strip_terminator};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Column names from the first line; its length is the expected row width.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    names: Vec<String>,
}

impl Header {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Tokenize a header line.
    pub fn parse(line: &str, tokenizer: &dyn Tokenizer) -> Self {
        Self::new(tokenizer.tokenize(line).into_iter().map(str::to_owned).collect())
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Sequential reader over a delimited text stream.
///
/// Lines are yielded without their terminator; a final line lacking a
/// trailing newline is still yielded. Read errors carry the 1-based line
/// number (the header is line 1).
pub struct LineSource<R> {
    reader: R,
    line_no: u64,
    buf: String,
    newline_only: bool,
}

impl<R: Read> LineSource<BufReader<R>> {
    pub fn from_reader(reader: R) -> Self {
        LineSource::from_buf_read(BufReader::new(reader))
    }
}

impl LineSource<BufReader<DynReader>> {
    /// Open a file, decompressing gzip/zstd input transparently.
    ///
    /// # Errors
    /// Fails if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_reader(crate::io::open_input(path)?))
    }
}

impl<R: BufRead> LineSource<R> {
    pub fn from_buf_read(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            buf: String::new(),
            newline_only: false,
        }
    }

    /// Strip only `\n`, keeping a `\r` that ends the line as part of it.
    /// Column files need this: a value may itself end in `\r`.
    #[must_use]
    pub fn newline_only(mut self) -> Self {
        self.newline_only = true;
        self
    }

    /// Lines consumed so far, header included.
    #[must_use]
    pub fn lines_read(&self) -> u64 {
        self.line_no
    }

    fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        self.buf.clear();
        let n = self
            .reader
            .read_line(&mut self.buf)
            .with_context(|| format!("read line {}", self.line_no + 1))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let line = if self.newline_only {
            self.buf.strip_suffix('\n').unwrap_or(self.buf.as_str())
        } else {
            strip_terminator(&self.buf)
        };
        Ok(Some(line.to_owned()))
    }

    /// Read and tokenize the first line.
    ///
    /// # Errors
    /// [`ProfileError::EmptyInput`] if the stream is empty; I/O errors otherwise.
    pub fn read_header(&mut self, tokenizer: &dyn Tokenizer) -> Result<Header> {
        match self.next_line()? {
            Some(line) => Ok(Header::parse(&line, tokenizer)),
            None => Err(ProfileError::EmptyInput),
        }
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = anyhow::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenize::DelimitedTokenizer;

    #[test]
    fn header_then_lines() -> anyhow::Result<()> {
        let mut src = LineSource::from_reader("a|b\n1|\nfoobar|baz\nx".as_bytes());
        let header = src.read_header(&DelimitedTokenizer::new('|'))?;
        assert_eq!(header.names(), ["a", "b"]);
        let lines = src.by_ref().collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(lines, vec!["1|", "foobar|baz", "x"]);
        assert_eq!(src.lines_read(), 4);
        Ok(())
    }

    #[test]
    fn newline_only_keeps_trailing_carriage_returns() -> anyhow::Result<()> {
        let text = "a\r\nb\n\r\n";
        let plain = LineSource::from_reader(text.as_bytes()).collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(plain, vec!["a", "b", ""]);
        let kept = LineSource::from_reader(text.as_bytes())
            .newline_only()
            .collect::<anyhow::Result<Vec<_>>>()?;
        assert_eq!(kept, vec!["a\r", "b", "\r"]);
        Ok(())
    }

    #[test]
    fn empty_stream_has_no_header() {
        let mut src = LineSource::from_reader(&b""[..]);
        let err = src.read_header(&DelimitedTokenizer::default()).unwrap_err();
        assert!(matches!(err, ProfileError::EmptyInput));
    }

    #[test]
    fn invalid_utf8_reports_line_number() {
        let mut src = LineSource::from_reader(&b"a|b\n\xff\xfe\n"[..]);
        src.read_header(&DelimitedTokenizer::default()).unwrap();
        let err = src.next().unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("read line 2"), "{err:#}");
    }
}
