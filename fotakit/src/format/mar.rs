// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Wrapper around gecko's `mar` tool. MAR files are only ever built and read
//! through the tool.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use walkdir::WalkDir;

use crate::{
    config::{Config, ToolKind},
    tool::{self, Tool},
    util,
};

/// Name of the recovery update container inside a FOTA MAR.
pub const FOTA_UPDATE_ZIP: &str = "update.zip";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to resolve path: {0:?}")]
    Path(PathBuf, #[source] io::Error),
    #[error("Failed to list directory: {0:?}")]
    Walk(PathBuf, #[source] walkdir::Error),
    #[error("Path is not valid UTF-8: {0:?}")]
    NonUtf8Path(PathBuf),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Anything that can list the entries of a MAR.
pub trait MarEntries {
    fn list_entries(&self, mar_path: &Path) -> Result<Vec<String>>;

    /// A FOTA MAR wraps a recovery update container instead of gecko files.
    fn is_fota(&self, mar_path: &Path) -> Result<bool> {
        let entries = self.list_entries(mar_path)?;
        Ok(entries.iter().any(|e| e == FOTA_UPDATE_ZIP))
    }
}

/// Parse the table printed by `mar -t`. The header row starts with `SIZE` and
/// the entry name is the third column.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let words = line.split_whitespace().collect::<Vec<_>>();
            if words.len() < 3 || words[0] == "SIZE" {
                None
            } else {
                Some(words[2].to_owned())
            }
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct MarTool {
    tool: Tool,
}

impl MarTool {
    pub fn new(config: &Config) -> tool::Result<Self> {
        Ok(Self {
            tool: config.tool(ToolKind::Mar)?,
        })
    }

    pub fn from_tool(tool: Tool) -> Self {
        Self { tool }
    }

    /// Create `mar_path` from every file under `src_dir`. The tool is run from
    /// inside `src_dir` so that entries are stored with relative paths.
    pub fn create(&self, mar_path: &Path, src_dir: &Path) -> Result<()> {
        let mar_path =
            std::path::absolute(mar_path).map_err(|e| Error::Path(mar_path.to_owned(), e))?;
        let mut files = vec![];

        for entry in WalkDir::new(src_dir).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Walk(src_dir.to_owned(), e))?;
            if entry.file_type().is_dir() {
                continue;
            }

            let relative = util::posix_relative_path(src_dir, entry.path())
                .ok_or_else(|| Error::NonUtf8Path(entry.path().to_owned()))?;
            files.push(relative);
        }

        let mut command = self.tool.command();
        command.arg("-c").arg(&mar_path).args(&files);
        command.current_dir(src_dir);

        tool::run(&mut command, None)?;

        Ok(())
    }

    /// Extract `mar_path` into `dest_dir`, which must already exist.
    pub fn extract(&self, mar_path: &Path, dest_dir: &Path) -> Result<()> {
        let mar_path =
            std::path::absolute(mar_path).map_err(|e| Error::Path(mar_path.to_owned(), e))?;

        let mut command = self.tool.command();
        command.arg("-x").arg(&mar_path);
        command.current_dir(dest_dir);

        tool::run(&mut command, None)?;

        Ok(())
    }
}

impl MarEntries for MarTool {
    fn list_entries(&self, mar_path: &Path) -> Result<Vec<String>> {
        let mut command = self.tool.command();
        command.arg("-t").arg(mar_path);

        let output = tool::run(&mut command, None)?;

        Ok(parse_listing(&String::from_utf8_lossy(&output)))
    }
}
