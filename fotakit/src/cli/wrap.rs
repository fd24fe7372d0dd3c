// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{path::PathBuf, sync::atomic::AtomicBool};

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::{
    cli::status,
    config::Config,
    format::{mar::MarTool, wrapped::WrappedArchive},
};

pub fn wrap_main(cli: &WrapCli, config: &Config, cancel_signal: &AtomicBool) -> Result<()> {
    if cli.dir.is_file() {
        bail!("Path is not a directory: {:?}", cli.dir);
    }

    let archive = WrappedArchive::new(&cli.mar, MarTool::new(config)?);

    if cli.unwrap {
        archive
            .extract(&cli.dir, cancel_signal)
            .with_context(|| format!("Failed to unwrap {:?}", cli.mar))?;
        status!("Unwrapped MAR to {:?}", cli.dir);
    } else {
        archive
            .create(&cli.dir, cancel_signal)
            .with_context(|| format!("Failed to wrap {:?}", cli.dir))?;
        status!("Wrapped MAR to {:?}", cli.mar);
    }

    Ok(())
}

/// Convert between a directory and a MAR whose entries are individually
/// bzip2-compressed.
#[derive(Debug, Parser)]
pub struct WrapCli {
    /// MAR archive to (un)wrap.
    #[arg(value_name = "MAR", value_parser)]
    pub mar: PathBuf,

    /// Source or destination directory.
    #[arg(value_name = "DIR", value_parser)]
    pub dir: PathBuf,

    /// Unwrap MAR to DIR instead of wrapping DIR into MAR.
    #[arg(short, long)]
    pub unwrap: bool,
}
