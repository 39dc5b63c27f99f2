//! Splitting raw lines into fields.
//!
//! The pipelines only need an ordered sequence of fields per line, so the
//! tokenizer sits behind a trait. [`DelimitedTokenizer`] is the naive
//! split-on-delimiter reader: no quoting, no escapes.

/// Turns one raw line into its ordered fields.
pub trait Tokenizer: Send + Sync {
    fn tokenize<'a>(&self, line: &'a str) -> Vec<&'a str>;
}

/// Strip one trailing line terminator (`\n`, `\r\n` or a lone `\r`).
#[must_use]
pub fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelimitedTokenizer {
    delimiter: char,
}

impl DelimitedTokenizer {
    #[must_use]
    pub const fn new(delimiter: char) -> Self {
        Self { delimiter }
    }

    #[must_use]
    pub const fn delimiter(&self) -> char {
        self.delimiter
    }
}

impl Default for DelimitedTokenizer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DELIMITER)
    }
}

impl Tokenizer for DelimitedTokenizer {
    fn tokenize<'a>(&self, line: &'a str) -> Vec<&'a str> {
        strip_terminator(line).split(self.delimiter).collect()
    }
}
