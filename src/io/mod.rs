//! File plumbing: opening inputs and creating column outputs.

pub mod compression;

use anyhow::{Context, Result};
use compression::{DynReader, DynWriter, auto_detect_reader, auto_detect_writer};
use std::fs::{File, create_dir_all};
use std::path::Path;

/// Open `path` for reading, decompressing transparently.
///
/// # Errors
/// Fails if the file cannot be opened or its codec cannot start.
pub fn open_input(path: impl AsRef<Path>) -> Result<DynReader> {
    let path = path.as_ref();
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    auto_detect_reader(f, path).with_context(|| format!("setup decompression for {}", path.display()))
}

/// Create (or truncate) `path` for writing, compressing by extension.
/// Parent directories are created as needed.
///
/// # Errors
/// Fails if the directories or the file cannot be created.
pub fn create_output(path: impl AsRef<Path>) -> Result<DynWriter> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
    auto_detect_writer(f, path).with_context(|| format!("setup compression for {}", path.display()))
}
