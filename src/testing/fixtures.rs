//! Deterministic inputs for profiling tests.

/// Two columns, three data rows, one of them malformed, no trailing newline.
///
/// Profiled with the default `|` delimiter this yields the histogram
/// `{1: 1, 2: 2}`; splitting it writes `"1\nfoobar\n"` and `"\nbaz\n"`.
#[must_use]
pub const fn toy_input() -> &'static str {
    "a|b\n1|\nfoobar|baz\nx"
}

/// `rows` data lines of `width` `|`-separated fields.
///
/// Field lengths cycle through 0..=8 depending on row and column, so empty
/// values occur. With `malformed_every = Some(k)`, every k-th row (1-based)
/// gets one extra field.
#[must_use]
pub fn generate_rows(rows: usize, width: usize, malformed_every: Option<usize>) -> Vec<String> {
    (0..rows)
        .map(|r| {
            let extra = malformed_every.is_some_and(|k| k > 0 && (r + 1) % k == 0);
            let fields = width + usize::from(extra);
            (0..fields)
                .map(|c| {
                    let len = (r * 31 + c * 7) % 9;
                    let ch = char::from(b'a' + u8::try_from((r + c) % 26).unwrap_or(0));
                    ch.to_string().repeat(len)
                })
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect()
}

/// A header `c0|c1|...` followed by [`generate_rows`], newline-terminated.
#[must_use]
pub fn generate_input(rows: usize, width: usize, malformed_every: Option<usize>) -> String {
    let header = (0..width)
        .map(|c| format!("c{c}"))
        .collect::<Vec<_>>()
        .join("|");
    let mut out = header;
    out.push('\n');
    for line in generate_rows(rows, width, malformed_every) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_rows_have_one_extra_field() {
        let rows = generate_rows(6, 3, Some(3));
        let widths: Vec<usize> = rows.iter().map(|r| r.split('|').count()).collect();
        assert_eq!(widths, vec![3, 3, 4, 3, 3, 4]);
    }
}
