// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::PathBuf, sync::atomic::AtomicBool};

use anyhow::{Context, Result};
use clap::Parser;

use crate::{
    cli::{status, warning, zip::KeyGroup},
    config::Config,
    format::partition::{FsType, Partition},
    package::{
        flash::{FlashPackageBuilder, FlashPlan, FotaType},
        permissions::FsConfigResolver,
    },
};

const HEADING_SYSTEM: &str = "System options";
const HEADING_DATA: &str = "Data options";
const HEADING_FOTA: &str = "FOTA options";

/// One path per line. Trailing whitespace and blank lines are ignored.
fn parse_file_list(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

pub fn flash_main(cli: &FlashCli, config: &Config, cancel_signal: &AtomicBool) -> Result<()> {
    let wipe_dirs = cli
        .fota_dirs
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_owned)
        .collect::<Vec<_>>();

    let include_files = match &cli.fota_files {
        Some(path) => {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read file list: {path:?}"))?;
            parse_file_list(&data)
        }
        None => vec![],
    };

    if cli.fota_type == FotaType::Full && (!wipe_dirs.is_empty() || !include_files.is_empty()) {
        warning!("--fota-dirs and --fota-files are ignored for full FOTAs");
    }

    let plan = FlashPlan::new(
        cli.fota_type,
        Partition::system(cli.system_fs_type, &cli.system_location),
        Partition::data(cli.data_fs_type, &cli.data_location),
        wipe_dirs,
        include_files,
    )?;

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("flash.zip"));
    let (public_key, private_key) = cli.key.resolve(config);

    let resolver = FsConfigResolver::new(config)?;
    let builder = FlashPackageBuilder::new(config, plan, &resolver);

    builder
        .build(&cli.system_dir, &public_key, &private_key, &output, cancel_signal)
        .with_context(|| format!("Failed to build flash package: {output:?}"))?;

    status!("Flash {} FOTA generated: {output:?}", cli.fota_type);

    Ok(())
}

/// Build a signed package that flashes /system from recovery.
///
/// Note: java is required to be on PATH to sign the zip.
#[derive(Debug, Parser)]
pub struct FlashCli {
    /// Path to the system directory.
    #[arg(long, value_name = "DIR", value_parser, help_heading = HEADING_SYSTEM)]
    pub system_dir: PathBuf,

    /// Filesystem type for /system.
    #[arg(long, value_name = "TYPE", value_parser, help_heading = HEADING_SYSTEM)]
    pub system_fs_type: FsType,

    /// Device location for /system.
    #[arg(long, value_name = "DEVICE", help_heading = HEADING_SYSTEM)]
    pub system_location: String,

    /// Filesystem type for /data.
    #[arg(long, value_name = "TYPE", value_parser, help_heading = HEADING_DATA)]
    pub data_fs_type: FsType,

    /// Device location for /data.
    #[arg(long, value_name = "DEVICE", help_heading = HEADING_DATA)]
    pub data_location: String,

    /// Flash everything or only a listed set of files.
    #[arg(long, value_name = "TYPE", default_value = "full", help_heading = HEADING_FOTA)]
    pub fota_type: FotaType,

    /// Space-separated list of directories to delete before flashing.
    #[arg(long, value_name = "DIRS", help_heading = HEADING_FOTA)]
    pub fota_dirs: Option<String>,

    /// File listing the paths in /system to include.
    #[arg(long, value_name = "FILE", value_parser, help_heading = HEADING_FOTA)]
    pub fota_files: Option<PathBuf>,

    #[command(flatten)]
    pub key: KeyGroup,

    /// Output zip path.
    #[arg(short, long, value_name = "ZIP", value_parser)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_list() {
        assert_eq!(
            parse_file_list("b2g/b2g  \n\nlib/libxul.so\r\n"),
            ["b2g/b2g", "lib/libxul.so"],
        );
    }

    #[test]
    fn fs_type_args() {
        let cli = FlashCli::parse_from([
            "flash",
            "--system-dir",
            "out/system",
            "--system-fs-type",
            "ext4",
            "--system-location",
            "/dev/block/mmcblk0p8",
            "--data-fs-type",
            "yaffs2",
            "--data-location",
            "userdata",
            "--fota-type",
            "partial",
        ]);

        assert_eq!(cli.system_fs_type, FsType::Ext4);
        assert_eq!(cli.data_fs_type, FsType::Yaffs2);
        assert_eq!(cli.fota_type, FotaType::Partial);

        let result = FlashCli::try_parse_from([
            "flash",
            "--system-dir",
            "out/system",
            "--system-fs-type",
            "btrfs",
            "--system-location",
            "a",
            "--data-fs-type",
            "ext4",
            "--data-location",
            "b",
        ]);
        assert!(result.is_err());
    }
}
