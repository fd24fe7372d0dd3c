// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser};
use tempfile::TempDir;

use crate::{
    cli::status,
    config::Config,
    package::container::ContainerBuilder,
};

const HEADING_KEY: &str = "Signing key options";

/// Key pair used to sign update containers.
#[derive(Debug, Args)]
pub struct KeyGroup {
    /// Named dev key pair in build/target/product/security.
    ///
    /// Possible keys: media, platform, shared, testkey.
    #[arg(
        short = 'd',
        long,
        value_name = "KEYNAME",
        default_value = "testkey",
        help_heading = HEADING_KEY
    )]
    pub dev_key: String,

    /// Private key for signing. Overrides --dev-key.
    #[arg(short = 'k', long, value_name = "FILE", value_parser, help_heading = HEADING_KEY)]
    pub private_key: Option<PathBuf>,

    /// Public key for signing. Overrides --dev-key.
    #[arg(short = 'K', long, value_name = "FILE", value_parser, help_heading = HEADING_KEY)]
    pub public_key: Option<PathBuf>,
}

impl KeyGroup {
    /// Returns the public and private key paths.
    pub fn resolve(&self, config: &Config) -> (PathBuf, PathBuf) {
        let (dev_public, dev_private) = config.dev_key_pair(&self.dev_key);

        (
            self.public_key.clone().unwrap_or(dev_public),
            self.private_key.clone().unwrap_or(dev_private),
        )
    }
}

/// `DIR` -> `DIR.zip`.
fn default_output(update_dir: &Path) -> PathBuf {
    let mut name = OsString::from(update_dir.as_os_str());
    name.push(".zip");
    PathBuf::from(name)
}

pub fn fota_zip_main(cli: &FotaZipCli, config: &Config, cancel_signal: &AtomicBool) -> Result<()> {
    if !cli.update_dir.is_dir() {
        bail!("update-dir is not a directory: {:?}", cli.update_dir);
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| default_output(&cli.update_dir));
    let (public_key, private_key) = cli.key.resolve(config);

    let builder = ContainerBuilder::new(config);

    let stage_dir = TempDir::new().context("Failed to create staging directory")?;
    let unsigned = stage_dir.path().join("update-unsigned.zip");

    builder
        .build_unsigned(&cli.update_dir, &unsigned, cancel_signal)
        .with_context(|| format!("Failed to build unsigned zip from {:?}", cli.update_dir))?;

    status!("Public key: {public_key:?}");
    status!("Private key: {private_key:?}");

    builder
        .sign(&unsigned, &public_key, &private_key, &output)
        .with_context(|| format!("Failed to sign {output:?}"))?;

    status!("FOTA Update ZIP generated: {output:?}");

    Ok(())
}

/// Build a signed update zip from a staged update directory.
///
/// Note: java is required to be on PATH to sign the zip.
#[derive(Debug, Parser)]
pub struct FotaZipCli {
    /// Directory containing the update's files and updater-script.
    #[arg(value_name = "UPDATE_DIR", value_parser)]
    pub update_dir: PathBuf,

    /// Output zip path. Defaults to <UPDATE_DIR>.zip.
    #[arg(short, long, value_name = "ZIP", value_parser)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub key: KeyGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_and_keys() {
        assert_eq!(default_output(Path::new("out/update")), Path::new("out/update.zip"));

        let config = Config::new("/b2g");
        let cli = FotaZipCli::parse_from(["fota-zip", "dir", "-d", "platform", "-k", "/k.pk8"]);
        assert_eq!(
            cli.key.resolve(&config),
            (
                PathBuf::from("/b2g/build/target/product/security/platform.x509.pem"),
                PathBuf::from("/k.pk8"),
            ),
        );
    }
}
