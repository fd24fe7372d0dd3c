// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    env,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tempfile::TempDir;

use crate::{
    cli::status,
    config::Config,
    format::{mar::MarTool, wrapped::WrappedArchive},
    package::delta::DeltaPackager,
};

/// Unwrap a wrapped MAR into a temporary directory that is removed when the
/// returned value is dropped.
fn unwrap_mar(mar_tool: &MarTool, mar: &Path, cancel_signal: &AtomicBool) -> Result<TempDir> {
    status!("Extracting MAR for incremental update: {mar:?}");

    let temp_dir = TempDir::new().context("Failed to create temporary directory")?;
    WrappedArchive::new(mar, mar_tool.clone())
        .extract(temp_dir.path(), cancel_signal)
        .with_context(|| format!("Failed to unwrap {mar:?}"))?;

    Ok(temp_dir)
}

pub fn delta_main(cli: &DeltaCli, config: &Config, cancel_signal: &AtomicBool) -> Result<()> {
    if cli.mar.is_dir() {
        bail!("MAR destination is a directory: {:?}", cli.mar);
    }

    let to_dir = match cli.dir.as_ref().or(cli.to.as_ref()) {
        Some(p) => p.clone(),
        None => env::current_dir().context("Failed to get current directory")?,
    };

    if cli.from.is_none() && !to_dir.is_dir() {
        bail!("Path is not a directory: {to_dir:?}");
    }

    let packager = DeltaPackager::new(config)?;

    // Both must outlive the build.
    let mut to_temp = None;
    let mut from_temp = None;

    let (src_dir, from_dir) = match &cli.from {
        Some(from) => {
            let mar_tool = MarTool::new(config)?;

            let src_dir = if to_dir.is_file() {
                to_temp.insert(unwrap_mar(&mar_tool, &to_dir, cancel_signal)?).path().to_owned()
            } else {
                to_dir
            };

            let from_dir = if from.is_file() {
                from_temp.insert(unwrap_mar(&mar_tool, from, cancel_signal)?).path().to_owned()
            } else {
                from.clone()
            };

            (src_dir, Some(from_dir))
        }
        None => (to_dir, None),
    };

    packager
        .build(&src_dir, &cli.mar, from_dir.as_deref())
        .with_context(|| format!("Failed to build {:?}", cli.mar))?;

    let update_type = if from_dir.is_some() { "incremental" } else { "full" };
    status!("Built {update_type} update MAR: {:?}", cli.mar);

    Ok(())
}

/// Build a full or incremental update MAR with the gecko packaging scripts.
#[derive(Debug, Parser)]
pub struct DeltaCli {
    /// Destination MAR file.
    #[arg(value_name = "MAR", value_parser)]
    pub mar: PathBuf,

    /// Source directory. Defaults to the current directory.
    ///
    /// When building an incremental MAR, this can also be a wrapped MAR.
    #[arg(long, value_name = "DIR", value_parser, conflicts_with = "to")]
    pub dir: Option<PathBuf>,

    /// Synonym for --dir.
    #[arg(long, value_name = "TO", value_parser)]
    pub to: Option<PathBuf>,

    /// Base directory or wrapped MAR for an incremental MAR from FROM to TO.
    #[arg(long, value_name = "FROM", value_parser)]
    pub from: Option<PathBuf>,
}
