// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Full and incremental MAR generation through gecko's update packaging
//! scripts. The scripts locate `mar` and `mbsdiff` through the environment.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::{
    config::{Config, ToolKind},
    tool::{self, Tool},
};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Source directory doesn't exist: {0:?}")]
    MissingSourceDir(PathBuf),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug)]
pub struct DeltaPackager {
    mar: Tool,
    mbsdiff: Tool,
    make_full_update: Tool,
    make_incremental_update: Tool,
}

impl DeltaPackager {
    /// Locate every tool needed by either kind of build.
    pub fn new(config: &Config) -> tool::Result<Self> {
        Ok(Self {
            mar: config.tool(ToolKind::Mar)?,
            mbsdiff: config.tool(ToolKind::Mbsdiff)?,
            make_full_update: config.tool(ToolKind::MakeFullUpdate)?,
            make_incremental_update: config.tool(ToolKind::MakeIncrementalUpdate)?,
        })
    }

    fn run(&self, script: &Tool, args: &[&Path]) -> Result<()> {
        let mut command = script.command();
        command.args(args);
        command.env(ToolKind::Mar.env_var(), self.mar.path());
        command.env(ToolKind::Mbsdiff.env_var(), self.mbsdiff.path());

        tool::run(&mut command, None)?;

        Ok(())
    }

    pub fn build_full(&self, src_dir: &Path, output: &Path) -> Result<()> {
        check_dir(src_dir)?;

        info!("Building full update: {output:?}");
        self.run(&self.make_full_update, &[output, src_dir])
    }

    pub fn build_incremental(&self, from_dir: &Path, to_dir: &Path, output: &Path) -> Result<()> {
        check_dir(from_dir)?;
        check_dir(to_dir)?;

        info!("Building incremental update: {output:?}");
        self.run(&self.make_incremental_update, &[output, from_dir, to_dir])
    }

    /// Build an incremental update if `from_dir` is specified. Otherwise, build
    /// a full update.
    pub fn build(&self, src_dir: &Path, output: &Path, from_dir: Option<&Path>) -> Result<()> {
        match from_dir {
            Some(from) => self.build_incremental(from, src_dir, output),
            None => self.build_full(src_dir, output),
        }
    }
}

fn check_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        return Err(Error::MissingSourceDir(path.to_owned()));
    }

    Ok(())
}
