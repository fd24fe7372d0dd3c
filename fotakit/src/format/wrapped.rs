// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! "Wrapped" MARs, as served by the update server, have every entry
//! individually bzip2-compressed. Since only leaf file contents are transformed,
//! the MAR's internal layout matches the uncompressed tree, which is what the
//! update packaging scripts operate on.
//!
//! Unwrapping and editing a MAR before rewrapping it drops any metadata the
//! original MAR had, such as signatures.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use bzip2::{Compression, read::MultiBzDecoder, write::BzEncoder};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::{format::mar::{self, MarTool}, stream};

const COMPRESSED_SUFFIX: &str = ".bz2";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Source directory doesn't exist: {0:?}")]
    MissingSourceDir(PathBuf),
    #[error("Couldn't create directory: {0:?}")]
    CreateDir(PathBuf, #[source] io::Error),
    #[error("Failed to create temporary directory")]
    TempDir(#[source] io::Error),
    #[error("Failed to list directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Failed to compress entry: {0:?}")]
    Compress(PathBuf, #[source] io::Error),
    #[error("Failed to decompress entry: {0:?}")]
    Decompress(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Mar(#[from] mar::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// List every non-directory path under `dir`.
fn leaf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];

    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::Walk(dir.to_owned(), e))?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn compress_file(input: &Path, output: &Path, cancel_signal: &AtomicBool) -> io::Result<()> {
    let reader = BufReader::new(File::open(input)?);
    let writer = BufWriter::new(File::create(output)?);
    let mut encoder = BzEncoder::new(writer, Compression::best());

    stream::copy(reader, &mut encoder, cancel_signal)?;

    encoder.finish()?.flush()
}

fn decompress_file(input: &Path, output: &Path, cancel_signal: &AtomicBool) -> io::Result<()> {
    let decoder = MultiBzDecoder::new(BufReader::new(File::open(input)?));
    let mut writer = BufWriter::new(File::create(output)?);

    stream::copy(decoder, &mut writer, cancel_signal)?;

    writer.flush()
}

pub struct WrappedArchive {
    path: PathBuf,
    mar_tool: MarTool,
}

impl WrappedArchive {
    pub fn new(path: impl Into<PathBuf>, mar_tool: MarTool) -> Self {
        Self {
            path: path.into(),
            mar_tool,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build the archive from `src_dir`. The tree is compressed into a
    /// temporary directory, which is removed regardless of the outcome.
    pub fn create(&self, src_dir: &Path, cancel_signal: &AtomicBool) -> Result<()> {
        if !src_dir.is_dir() {
            return Err(Error::MissingSourceDir(src_dir.to_owned()));
        }

        let temp_dir = TempDir::new().map_err(Error::TempDir)?;

        for path in leaf_files(src_dir)? {
            let relative = path.strip_prefix(src_dir).unwrap_or(&path);
            let output = temp_dir.path().join(relative);

            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::CreateDir(parent.to_owned(), e))?;
            }

            debug!("Compressing: {relative:?}");
            compress_file(&path, &output, cancel_signal).map_err(|e| Error::Compress(path, e))?;
        }

        self.mar_tool.create(&self.path, temp_dir.path())?;

        Ok(())
    }

    /// Extract the archive into `dest_dir`, creating it if needed, and then
    /// decompress every entry in place. If decompression fails, the partially
    /// decompressed tree is left as-is for inspection.
    pub fn extract(&self, dest_dir: &Path, cancel_signal: &AtomicBool) -> Result<()> {
        fs::create_dir_all(dest_dir).map_err(|e| Error::CreateDir(dest_dir.to_owned(), e))?;

        self.mar_tool.extract(&self.path, dest_dir)?;

        for path in leaf_files(dest_dir)? {
            let mut compressed = path.clone().into_os_string();
            compressed.push(COMPRESSED_SUFFIX);
            let compressed = PathBuf::from(compressed);

            debug!("Decompressing: {path:?}");

            fs::rename(&path, &compressed)
                .and_then(|_| decompress_file(&compressed, &path, cancel_signal))
                .and_then(|_| fs::remove_file(&compressed))
                .map_err(|e| Error::Decompress(path, e))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Read, sync::atomic::AtomicBool};

    use assert_matches::assert_matches;
    use bzip2::read::BzDecoder;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn compression_preserves_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("libxul.so");
        let compressed = temp_dir.path().join("libxul.so.bz2");
        let output = temp_dir.path().join("libxul.so.out");
        let cancel_signal = AtomicBool::new(false);

        let data = (0..100_000u32).flat_map(|i| i.to_le_bytes()).collect::<Vec<_>>();
        fs::write(&input, &data).unwrap();

        compress_file(&input, &compressed, &cancel_signal).unwrap();

        let mut decoded = vec![];
        BzDecoder::new(File::open(&compressed).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, data);

        decompress_file(&compressed, &output, &cancel_signal).unwrap();
        assert_eq!(fs::read(&output).unwrap(), data);
    }

    #[test]
    fn corrupt_entry_fails_to_decompress() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("precomplete.bz2");
        fs::write(&input, b"not bzip2 data").unwrap();

        assert!(
            decompress_file(&input, &temp_dir.path().join("out"), &AtomicBool::new(false))
                .is_err()
        );
    }

    #[test]
    fn missing_source_dir() {
        let temp_dir = TempDir::new().unwrap();
        let fake = temp_dir.path().join("mar");
        fs::write(&fake, b"").unwrap();
        let mar_tool = MarTool::from_tool(crate::tool::Tool::at("mar", fake).unwrap());
        let archive = WrappedArchive::new(temp_dir.path().join("out.mar"), mar_tool);

        assert_matches!(
            archive.create(&temp_dir.path().join("missing"), &AtomicBool::new(false)),
            Err(Error::MissingSourceDir(_))
        );
    }
}
