//! Report writers for [`AggregateResult`].
//!
//! JSON Lines: the first line is the row-length histogram (keys ascending),
//! followed by one object per column. CSV (feature `io-csv`): one row per
//! column with the header `index,name,fill_count,min_len,max_len,avg_len`;
//! absent figures are empty cells.

use crate::io::compression::{FinishWrite, codec_for_path};
use crate::stats::AggregateResult;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::Path;

/// Write `result` as JSON Lines.
///
/// # Errors
/// Serialization or write failures.
pub fn write_jsonl<W: Write>(result: &AggregateResult, mut writer: W) -> Result<()> {
    serde_json::to_writer(&mut writer, &result.histogram).context("serialize histogram")?;
    writer.write_all(b"\n")?;
    for column in &result.columns {
        serde_json::to_writer(&mut writer, column)
            .with_context(|| format!("serialize column {}", column.index))?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Write the per-column figures of `result` as CSV.
///
/// # Errors
/// Serialization or write failures.
#[cfg(feature = "io-csv")]
pub fn write_csv_report<W: Write>(result: &AggregateResult, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(writer);
    for column in &result.columns {
        wtr.serialize(column)
            .with_context(|| format!("serialize CSV row for column {}", column.index))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write `result` to `path`, picking the format from the extension
/// (`.jsonl`, or `.csv` with the `io-csv` feature). A trailing codec extension
/// such as `.gz` or `.zst` compresses the report.
///
/// # Errors
/// Unknown extension, file creation or write failures.
pub fn write_report(result: &AggregateResult, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let stem = codec_for_path(path)
        .and_then(|codec| {
            codec
                .extensions()
                .iter()
                .find_map(|ext| name.strip_suffix(ext))
                .map(str::to_owned)
        })
        .unwrap_or_else(|| name.clone());
    if stem.ends_with(".jsonl") {
        let mut writer = crate::io::create_output(path)?;
        write_jsonl(result, &mut writer).with_context(|| format!("write {}", path.display()))?;
        return writer.finish().with_context(|| format!("finish {}", path.display()));
    }
    #[cfg(feature = "io-csv")]
    if stem.ends_with(".csv") {
        let mut writer = crate::io::create_output(path)?;
        write_csv_report(result, &mut writer)
            .with_context(|| format!("write {}", path.display()))?;
        return writer.finish().with_context(|| format!("finish {}", path.display()));
    }
    bail!("no report format for {}", path.display())
}
