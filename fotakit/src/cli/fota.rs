// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;

use crate::{
    cli::status,
    config::Config,
    package::{delta::DeltaPackager, fota::FotaEnvelope},
};

/// Replace `.zip` with `.mar` or fall back to `update.mar`.
fn default_output(update_zip: &Path) -> PathBuf {
    let name = update_zip.to_string_lossy();

    if name.contains(".zip") {
        PathBuf::from(name.replace(".zip", ".mar"))
    } else {
        PathBuf::from("update.mar")
    }
}

pub fn fota_mar_main(cli: &FotaMarCli, config: &Config) -> Result<()> {
    if !cli.update_zip.exists() {
        bail!("update.zip does not exist: {:?}", cli.update_zip);
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.update_zip));

    let packager = DeltaPackager::new(config)?;
    let envelope = FotaEnvelope::new(packager)?;

    envelope
        .build(&cli.update_zip, &output)
        .with_context(|| format!("Failed to wrap {:?}", cli.update_zip))?;

    status!("FOTA Update MAR generated: {output:?}");

    Ok(())
}

/// Wrap a signed update zip in a complete update MAR.
#[derive(Debug, Parser)]
pub struct FotaMarCli {
    /// Signed FOTA update zip.
    #[arg(value_name = "UPDATE_ZIP", value_parser)]
    pub update_zip: PathBuf,

    /// Output MAR path. Defaults to replacing '.zip' with '.mar'.
    #[arg(short, long, value_name = "MAR", value_parser)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name() {
        assert_eq!(default_output(Path::new("out/b2g.zip")), Path::new("out/b2g.mar"));
        assert_eq!(default_output(Path::new("signed")), Path::new("update.mar"));
    }
}
