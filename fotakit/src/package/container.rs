// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    io,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    config::{Config, ToolKind},
    format::container::{self, ArchiveContainer, ContainerWriter},
    tool,
    util,
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Update directory doesn't exist: {0:?}")]
    MissingUpdateDir(PathBuf),
    #[error("updater-script not found at: {0:?}")]
    MissingUpdaterScript(PathBuf),
    #[error("Key file doesn't exist: {0:?}")]
    MissingKey(PathBuf),
    #[error("Failed to list directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error("Failed to stage path: {0:?}")]
    Stage(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Container(#[from] container::Error),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Add every entry under `root` to `writer`. Entry names are POSIX-style paths
/// relative to `root`, optionally placed under `prefix`. Only entries for
/// which `filter` returns true are written and a filter error aborts the walk.
/// A rejected directory is skipped along with everything below it. Symlinks
/// are followed when their contents are written, but never recursed into.
pub fn write_tree(
    writer: &mut ContainerWriter,
    root: &Path,
    prefix: Option<&str>,
    cancel_signal: &AtomicBool,
    mut filter: impl FnMut(&Path, &str) -> io::Result<bool>,
) -> Result<()> {
    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| Error::Walk(root.to_owned(), e))?;
        let path = entry.path();

        let relative = util::posix_relative_path(root, path)
            .ok_or_else(|| Error::NonUtf8Path(path.to_owned()))?;
        let name = match prefix {
            Some(p) => format!("{p}/{relative}"),
            None => relative,
        };

        if !filter(path, &name).map_err(|e| Error::Stage(path.to_owned(), e))? {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            continue;
        }

        if path.is_dir() {
            writer.add_directory(&name)?;
        } else {
            debug!("Adding {path:?} as {name}");
            writer.add_file(&name, path, cancel_signal)?;
        }
    }

    Ok(())
}

/// Builds recovery update containers and signs them with the external jar
/// signer.
pub struct ContainerBuilder<'a> {
    config: &'a Config,
}

impl<'a> ContainerBuilder<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Build an unsigned container from the staged tree in `update_dir`. The
    /// default `update-binary` is used if the tree does not contain one.
    pub fn build_unsigned(
        &self,
        update_dir: &Path,
        output: &Path,
        cancel_signal: &AtomicBool,
    ) -> Result<()> {
        if !update_dir.is_dir() {
            return Err(Error::MissingUpdateDir(update_dir.to_owned()));
        }

        let updater_script = update_dir.join(container::PATH_UPDATER_SCRIPT);
        if !updater_script.is_file() {
            return Err(Error::MissingUpdaterScript(updater_script));
        }

        let default_binary = if update_dir.join(container::PATH_UPDATE_BINARY).is_file() {
            None
        } else {
            let tool = self.config.tool(ToolKind::UpdateBinary)?;
            warn!("update-binary not found, using default: {:?}", tool.path());
            Some(tool)
        };

        info!("Building unsigned update zip: {output:?}");

        let mut writer = ContainerWriter::create(output)?;

        if let Some(tool) = default_binary {
            writer.add_file(container::PATH_UPDATE_BINARY, tool.path(), cancel_signal)?;
        }

        write_tree(&mut writer, update_dir, None, cancel_signal, |_, _| Ok(true))?;

        writer.finish()?;

        Ok(())
    }

    /// Sign `unsigned` into `output`. The unsigned container and both keys are
    /// checked before the signer is started.
    pub fn sign(
        &self,
        unsigned: &Path,
        public_key: &Path,
        private_key: &Path,
        output: &Path,
    ) -> Result<()> {
        ArchiveContainer::open(unsigned)?.validate(false)?;

        for key in [public_key, private_key] {
            if !key.is_file() {
                return Err(Error::MissingKey(key.to_owned()));
            }
        }

        let java = self.config.tool(ToolKind::Java)?;
        let signapk_jar = self.config.tool(ToolKind::SignapkJar)?;

        info!("Signing update zip: {output:?}");

        let mut command = java.command();
        command
            .arg("-Xmx2048m")
            .arg("-jar")
            .arg(signapk_jar.path())
            .arg("-w")
            .arg(public_key)
            .arg(private_key)
            .arg(unsigned)
            .arg(output);

        tool::run(&mut command, None)?;

        Ok(())
    }
}
