//! Transparent compression for input streams and column outputs.
//!
//! Input files are decompressed when their extension (or, failing that, their
//! leading magic bytes) matches a registered [`CompressionCodec`]. Column
//! output sinks are compressed by extension only, so `col-3.txt.gz` is written
//! through gzip while `col-3.txt` is written as plain text.
//!
//! Built-in codecs, each behind a feature flag:
//! - **gzip** (`.gz`, `.gzip`) via `flate2` (feature `compression-gzip`)
//! - **zstd** (`.zst`, `.zstd`) via `zstd` (feature `compression-zstd`)
//!
//! Readers and writers are `Send`: a column sink is opened on the
//! distributor thread and then moved into its writer thread. Writers must be
//! closed with [`FinishWrite::finish`]; dropping one instead loses any error
//! raised while writing the stream trailer.
//!
//! ```no_run
//! use colprofile::io::compression::{FinishWrite, auto_detect_reader, auto_detect_writer};
//! use std::fs::File;
//! use std::io::Write;
//! # fn main() -> anyhow::Result<()> {
//! let input = auto_detect_reader(File::open("dump.psv.gz")?, "dump.psv.gz")?;
//! let mut sink = auto_detect_writer(File::create("col-0.txt.zst")?, "col-0.txt.zst")?;
//! sink.write_all(b"foobar\n")?;
//! sink.finish()?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Boxed decompressing reader.
pub type DynReader = Box<dyn Read + Send>;
/// Boxed (possibly compressing) writer.
pub type DynWriter = Box<dyn FinishWrite>;

/// A writer with an explicit, fallible close.
pub trait FinishWrite: Write + Send {
    /// Write any trailer, then flush through to the underlying file. The
    /// default only flushes, which suffices for uncompressed layers.
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        self.flush()
    }
}

impl<W: Write + Send> FinishWrite for BufWriter<W> {}

/// A pluggable compression format.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions including the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    /// Leading signature of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader>;

    /// Wrap `writer`. The returned writer's [`FinishWrite::finish`] completes
    /// the compressed stream and then finishes `writer`.
    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter>;
}

fn registry() -> &'static RwLock<Vec<Arc<dyn CompressionCodec>>> {
    static CODECS: OnceLock<RwLock<Vec<Arc<dyn CompressionCodec>>>> = OnceLock::new();
    CODECS.get_or_init(|| RwLock::new(builtin_codecs()))
}

fn builtin_codecs() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
    ]
}

fn codecs() -> Vec<Arc<dyn CompressionCodec>> {
    registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Add a codec to the global registry. Later registrations lose ties on
/// extension and magic-byte matches.
pub fn register_codec(codec: Arc<dyn CompressionCodec>) {
    registry()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(codec);
}

/// Codec whose extension ends the (lowercased) path, if any.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let name = path.as_ref().to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|c| c.extensions().iter().any(|ext| name.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    codecs()
        .into_iter()
        .find(|c| c.magic_bytes().is_some_and(|m| head.starts_with(m)))
}

/// Wrap `reader` with the decompressor matching `path_hint`'s extension or
/// the stream's magic bytes; plain buffered passthrough otherwise.
///
/// # Errors
/// Fails if the codec cannot initialize its decoder.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<DynReader> {
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("open {} decoder", codec.name()));
    }
    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered) {
        return codec
            .wrap_reader(Box::new(buffered))
            .with_context(|| format!("open {} decoder", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Wrap `writer` with the compressor matching `path_hint`'s extension, or a
/// plain `BufWriter`.
///
/// # Errors
/// Fails if the codec cannot initialize its encoder.
pub fn auto_detect_writer<W: Write + Send + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> Result<DynWriter> {
    match codec_for_path(&path_hint) {
        Some(codec) => codec
            .wrap_writer(Box::new(BufWriter::new(writer)))
            .with_context(|| format!("open {} encoder", codec.name())),
        None => Ok(Box::new(BufWriter::new(writer))),
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        // Multi-member streams are what `cat a.gz b.gz` and bgzip produce.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        Ok(Box::new(flate2::write::GzEncoder::new(
            writer,
            flate2::Compression::default(),
        )))
    }
}

#[cfg(feature = "compression-gzip")]
impl FinishWrite for flate2::write::GzEncoder<DynWriter> {
    fn finish(self: Box<Self>) -> std::io::Result<()> {
        let inner = flate2::write::GzEncoder::finish(*self)?;
        inner.finish()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: DynReader) -> std::io::Result<DynReader> {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader)?))
    }

    fn wrap_writer(&self, writer: DynWriter) -> std::io::Result<DynWriter> {
        let encoder = zstd::stream::write::Encoder::new(writer, 3)?;
        Ok(Box::new(ZstdSink(Some(encoder))))
    }
}

/// Writes the zstd frame epilogue in [`FinishWrite::finish`], or on drop
/// (ignoring errors) if never finished.
#[cfg(feature = "compression-zstd")]
struct ZstdSink(Option<zstd::stream::write::Encoder<'static, DynWriter>>);

#[cfg(feature = "compression-zstd")]
impl Write for ZstdSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.as_mut() {
            Some(enc) => enc.write(buf),
            None => Err(std::io::Error::other("zstd stream already finished")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.as_mut() {
            Some(enc) => enc.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "compression-zstd")]
impl FinishWrite for ZstdSink {
    fn finish(mut self: Box<Self>) -> std::io::Result<()> {
        match self.0.take() {
            Some(enc) => enc.finish()?.finish(),
            None => Ok(()),
        }
    }
}

#[cfg(feature = "compression-zstd")]
impl Drop for ZstdSink {
    fn drop(&mut self) {
        if let Some(enc) = self.0.take()
            && let Ok(mut inner) = enc.finish()
        {
            let _ = inner.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Truncating;

    impl Write for Truncating {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl FinishWrite for Truncating {
        fn finish(self: Box<Self>) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_finish_reports_inner_failure() -> Result<()> {
        let codec = codec_for_path("x.gz").context("gzip registered")?;
        let mut w = codec.wrap_writer(Box::new(Truncating))?;
        w.write_all(b"abc\n")?;
        assert!(w.finish().is_err());
        Ok(())
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn zstd_finish_reports_inner_failure() -> Result<()> {
        let codec = codec_for_path("x.zst").context("zstd registered")?;
        let mut w = codec.wrap_writer(Box::new(Truncating))?;
        w.write_all(b"abc\n")?;
        assert!(w.finish().is_err());
        Ok(())
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_finish_writes_a_complete_stream() -> Result<()> {
        struct Shared(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().map_err(|_| std::io::Error::other("poisoned"))?.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }
        impl FinishWrite for Shared {}

        let out = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let codec = codec_for_path("x.gz").context("gzip registered")?;
        let mut w = codec.wrap_writer(Box::new(Shared(out.clone())))?;
        w.write_all(b"foobar\n")?;
        w.finish()?;

        let bytes = out.lock().map_err(|_| anyhow::anyhow!("poisoned"))?.clone();
        let mut text = String::new();
        auto_detect_reader(std::io::Cursor::new(bytes), "x.gz")?.read_to_string(&mut text)?;
        assert_eq!(text, "foobar\n");
        Ok(())
    }
}
