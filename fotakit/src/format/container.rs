// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Zip-backed recovery update containers (`update.zip`).
//!
//! An unsigned container must contain the recovery `update-binary` and the
//! `updater-script` it interprets. A signed container additionally contains the
//! jar signature files produced by the external signer.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Seek, Write},
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use thiserror::Error;
use zip::{
    CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions,
};

use crate::stream;

pub const PATH_UPDATE_BINARY: &str = "META-INF/com/google/android/update-binary";
pub const PATH_UPDATER_SCRIPT: &str = "META-INF/com/google/android/updater-script";
pub const PATH_MANIFEST_MF: &str = "META-INF/MANIFEST.MF";
pub const PATH_CERT_SF: &str = "META-INF/CERT.SF";

const UNSIGNED_ENTRIES: &[&str] = &[PATH_UPDATE_BINARY, PATH_UPDATER_SCRIPT];
const SIGNED_ENTRIES: &[&str] = &[PATH_MANIFEST_MF, PATH_CERT_SF];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Update zip is missing expected file: {0}")]
    MissingEntry(&'static str),
    #[error("Failed to open update zip: {0:?}")]
    Open(PathBuf, #[source] io::Error),
    #[error("Failed to read update zip")]
    Read(#[source] ZipError),
    #[error("Failed to create update zip: {0:?}")]
    Create(PathBuf, #[source] io::Error),
    #[error("Failed to read input for zip entry {name}: {path:?}")]
    ReadInput {
        name: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to write zip entry: {0}")]
    WriteEntry(String, #[source] io::Error),
    #[error("Failed to start zip entry: {0}")]
    StartEntry(String, #[source] ZipError),
    #[error("Failed to finalize update zip: {0:?}")]
    Finish(PathBuf, #[source] ZipError),
    #[error("Failed to flush update zip: {0:?}")]
    Flush(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Read-only view of an update container.
pub struct ArchiveContainer<R> {
    zip: ZipArchive<R>,
}

impl ArchiveContainer<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Open(path.to_owned(), e))?;

        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ArchiveContainer<R> {
    pub fn new(reader: R) -> Result<Self> {
        let zip = ZipArchive::new(reader).map_err(Error::Read)?;

        Ok(Self { zip })
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.zip.index_for_name(name).is_some()
    }

    /// Read an entry fully into memory.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = self.zip.by_name(name).map_err(Error::Read)?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::Read(e.into()))?;

        Ok(data)
    }

    /// Ensure that every entry required for an unsigned (or, if `signed` is
    /// true, a signed) container is present. The first missing entry is
    /// reported.
    pub fn validate(&self, signed: bool) -> Result<()> {
        let extra = if signed { SIGNED_ENTRIES } else { &[] };

        for &name in UNSIGNED_ENTRIES.iter().chain(extra) {
            if !self.has_entry(name) {
                return Err(Error::MissingEntry(name));
            }
        }

        Ok(())
    }
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;

    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> u32 {
    0o644
}

/// Writer for new update containers. Entries are deflate-compressed.
pub struct ContainerWriter {
    path: PathBuf,
    zip: ZipWriter<BufWriter<File>>,
}

impl ContainerWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::Create(path.to_owned(), e))?;

        Ok(Self {
            path: path.to_owned(),
            zip: ZipWriter::new(BufWriter::new(file)),
        })
    }

    fn options(mode: u32) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode)
    }

    /// Add the contents of the file at `source` as entry `name`. The file's
    /// permission bits are preserved.
    pub fn add_file(&mut self, name: &str, source: &Path, cancel_signal: &AtomicBool) -> Result<()> {
        let read_err = |e| Error::ReadInput {
            name: name.to_owned(),
            path: source.to_owned(),
            source: e,
        };

        let file = File::open(source).map_err(read_err)?;
        let metadata = file.metadata().map_err(read_err)?;

        self.zip
            .start_file(name, Self::options(file_mode(&metadata)))
            .map_err(|e| Error::StartEntry(name.to_owned(), e))?;

        stream::copy(BufReader::new(file), &mut self.zip, cancel_signal)
            .map_err(|e| Error::WriteEntry(name.to_owned(), e))?;

        Ok(())
    }

    /// Add a directory entry. A trailing `/` is added if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_owned()
        } else {
            format!("{name}/")
        };

        self.zip
            .add_directory(name.as_str(), Self::options(0o755))
            .map_err(|e| Error::StartEntry(name, e))?;

        Ok(())
    }

    pub fn add_bytes(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.zip
            .start_file(name, Self::options(0o644))
            .map_err(|e| Error::StartEntry(name.to_owned(), e))?;

        self.zip
            .write_all(data)
            .map_err(|e| Error::WriteEntry(name.to_owned(), e))?;

        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        let writer = self
            .zip
            .finish()
            .map_err(|e| Error::Finish(self.path.clone(), e))?;

        writer
            .into_inner()
            .map_err(|e| Error::Flush(self.path.clone(), e.into_error()))?
            .sync_all()
            .map_err(|e| Error::Flush(self.path, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;
    use zip::{ZipWriter, write::SimpleFileOptions};

    use super::*;

    fn build_zip(entries: &[&str]) -> Cursor<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in entries {
            writer
                .start_file(*entry, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(entry.as_bytes()).unwrap();
        }

        let mut cursor = writer.finish().unwrap();
        cursor.rewind().unwrap();
        cursor
    }

    const ALL: &[&str] = &[
        PATH_UPDATE_BINARY,
        PATH_UPDATER_SCRIPT,
        PATH_MANIFEST_MF,
        PATH_CERT_SF,
    ];

    #[test]
    fn validate_unsigned() {
        let container = ArchiveContainer::new(build_zip(&ALL[..2])).unwrap();
        container.validate(false).unwrap();
        assert_matches!(
            container.validate(true),
            Err(Error::MissingEntry(PATH_MANIFEST_MF))
        );
    }

    #[test]
    fn validate_signed() {
        let container = ArchiveContainer::new(build_zip(ALL)).unwrap();
        container.validate(false).unwrap();
        container.validate(true).unwrap();
    }

    #[test]
    fn validate_names_each_missing_entry() {
        for (i, &missing) in ALL.iter().enumerate() {
            let remaining = ALL
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, e)| *e)
                .collect::<Vec<_>>();
            let container = ArchiveContainer::new(build_zip(&remaining)).unwrap();

            let err = container.validate(true).unwrap_err();
            assert_matches!(err, Error::MissingEntry(name) if name == missing);
            assert!(err.to_string().contains(missing));

            if i < 2 {
                assert_matches!(
                    container.validate(false),
                    Err(Error::MissingEntry(name)) if name == missing
                );
            } else {
                container.validate(false).unwrap();
            }
        }
    }

    #[test]
    fn writer_round_trip() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let input = temp_dir.path().join("input");
        fs::write(&input, b"#!/sbin/sh\n").unwrap();

        let path = temp_dir.path().join("update.zip");
        let mut writer = ContainerWriter::create(&path).unwrap();
        writer
            .add_file(PATH_UPDATE_BINARY, &input, &AtomicBool::new(false))
            .unwrap();
        writer.add_bytes(PATH_UPDATER_SCRIPT, b"ui_print(\"hi\");\n").unwrap();
        writer.finish().unwrap();

        let mut container = ArchiveContainer::open(&path).unwrap();
        container.validate(false).unwrap();
        assert!(!container.has_entry("system/b2g"));
        assert_eq!(container.read_entry(PATH_UPDATE_BINARY).unwrap(), b"#!/sbin/sh\n");
        assert_eq!(
            container.read_entry(PATH_UPDATER_SCRIPT).unwrap(),
            b"ui_print(\"hi\");\n",
        );
    }
}
