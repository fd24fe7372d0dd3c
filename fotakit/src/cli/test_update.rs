// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{path::PathBuf, sync::atomic::AtomicBool};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser};

use crate::{
    cli::{manifest::ManifestGroup, status},
    config::Config,
    device::{AdbDevice, DeviceSelector},
    harness::{HarnessOptions, UpdateTestHarness},
};

const HEADING_DEVICE: &str = "Device options";

#[derive(Debug, Args)]
#[group(multiple = false)]
pub struct DeviceGroup {
    /// Use the device with this serial number.
    #[arg(long, value_name = "SERIAL", help_heading = HEADING_DEVICE)]
    pub serial: Option<String>,

    /// Use the only device connected over USB.
    #[arg(long, help_heading = HEADING_DEVICE)]
    pub usb: bool,

    /// Use the only running emulator.
    #[arg(long, help_heading = HEADING_DEVICE)]
    pub emulator: bool,
}

impl DeviceGroup {
    fn selector(&self) -> DeviceSelector {
        if let Some(serial) = &self.serial {
            DeviceSelector::Serial(serial.clone())
        } else if self.usb {
            DeviceSelector::Usb
        } else if self.emulator {
            DeviceSelector::Emulator
        } else {
            DeviceSelector::Any
        }
    }
}

pub fn test_update_main(
    cli: &TestUpdateCli,
    config: &Config,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let manifest = cli.manifest.build_xml(config, cancel_signal)?;

    let selector = cli.device.selector();
    let device = AdbDevice::new(config, selector.clone())?;

    let online = device
        .online_devices()
        .context("Failed to list connected devices")?;
    match &selector {
        DeviceSelector::Serial(serial) if !online.contains(serial) => {
            bail!("Device {serial:?} is not connected");
        }
        _ if online.is_empty() => bail!("No devices are connected"),
        _ => {}
    }
    let options = HarnessOptions {
        complete_mar: manifest.complete_mar,
        partial_mar: manifest.partial_mar,
        url_template: cli.manifest.url_template(),
        update_dir: cli.update_dir.clone(),
        only_override: cli.only_override,
        prefs_js: cli.prefs_js.clone(),
    };

    let harness = UpdateTestHarness::new(config, &device, manifest.xml, options)?;
    harness
        .run(true, !cli.no_restart)
        .context("Failed to serve update to device")?;

    status!("Update URL: {}", harness.update_url());

    Ok(())
}

/// Serve an update to a device and restart B2G to pick it up.
///
/// By default, busybox is pushed to the device and serves the update from
/// there.
#[derive(Debug, Parser)]
pub struct TestUpdateCli {
    #[command(flatten)]
    pub manifest: ManifestGroup,

    /// Serve from this local HTTP directory instead of from the device.
    ///
    /// Requires --url-template.
    #[arg(long, value_name = "DIR", value_parser)]
    pub update_dir: Option<PathBuf>,

    /// Only write the update URL override preference.
    ///
    /// Requires --url-template.
    #[arg(long)]
    pub only_override: bool,

    /// Device path of prefs.js. Defaults to the one in the default profile.
    #[arg(long, value_name = "PATH")]
    pub prefs_js: Option<String>,

    /// Don't restart B2G afterwards.
    #[arg(long)]
    pub no_restart: bool,

    #[command(flatten)]
    pub device: DeviceGroup,
}
