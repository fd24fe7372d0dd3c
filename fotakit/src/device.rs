// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Access to a device over adb.

use std::{
    collections::BTreeSet,
    ffi::OsString,
    path::Path,
};

use thiserror::Error;

use crate::{
    config::{Config, ToolKind},
    tool::{self, Tool},
};

const DEVICES_HEADER: &str = "List of devices attached";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Command line file for PID {0} not found")]
    MissingCmdline(String),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Operations needed to drive a device. Implementations block until each
/// command completes. A device is a single resource and callers must not use
/// it concurrently.
pub trait Device {
    /// Run a shell command on the device and return its output. The arguments
    /// are joined with spaces by the device's shell.
    fn shell(&self, args: &[&str]) -> Result<String>;

    fn push(&self, local: &Path, remote: &str) -> Result<()>;

    fn file_exists(&self, remote: &str) -> Result<bool> {
        let command = format!("ls {remote} 2>/dev/null 1>/dev/null; echo $?");
        let output = self.shell(&[command.as_str()])?;
        Ok(output.trim() == "0")
    }

    /// PIDs of every process with the given name.
    fn get_pids(&self, process: &str) -> Result<Vec<String>> {
        let command = format!(
            "toolbox ps {process} | (read header; while read user pid rest; do echo $pid; done)"
        );
        let output = self.shell(&[command.as_str()])?;

        Ok(output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn get_cmdline(&self, pid: &str) -> Result<Vec<String>> {
        let path = format!("/proc/{pid}/cmdline");
        if !self.file_exists(&path)? {
            return Err(Error::MissingCmdline(pid.to_owned()));
        }

        let output = self.shell(&["cat", path.as_str()])?;

        // NUL-separated with a trailing NUL.
        let mut args = output.split('\0').map(str::to_owned).collect::<Vec<_>>();
        args.pop();

        Ok(args)
    }
}

/// Which device adb should talk to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum DeviceSelector {
    /// The only connected device.
    #[default]
    Any,
    /// The only device connected over USB.
    Usb,
    /// The only running emulator.
    Emulator,
    Serial(String),
}

impl DeviceSelector {
    fn args(&self) -> Vec<OsString> {
        match self {
            Self::Any => vec![],
            Self::Usb => vec!["-d".into()],
            Self::Emulator => vec!["-e".into()],
            Self::Serial(s) => vec!["-s".into(), s.into()],
        }
    }
}

pub struct AdbDevice {
    adb: Tool,
    selector: DeviceSelector,
}

impl AdbDevice {
    pub fn new(config: &Config, selector: DeviceSelector) -> tool::Result<Self> {
        Ok(Self::from_tool(config.tool(ToolKind::Adb)?, selector))
    }

    pub fn from_tool(adb: Tool, selector: DeviceSelector) -> Self {
        Self { adb, selector }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = self.adb.command();
        command.args(self.selector.args());
        command.args(args);

        let output = tool::run(&mut command, None)?;

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Serials of every device in the `device` state.
    pub fn online_devices(&self) -> Result<BTreeSet<String>> {
        let output = self.run(&["devices"])?;

        Ok(parse_devices(&output))
    }
}

fn parse_devices(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter(|line| !line.starts_with(DEVICES_HEADER))
        .filter_map(|line| match line.trim_end().split('\t').collect::<Vec<_>>()[..] {
            [serial, "device"] => Some(serial.to_owned()),
            _ => None,
        })
        .collect()
}

impl Device for AdbDevice {
    fn shell(&self, args: &[&str]) -> Result<String> {
        let mut full_args = vec!["shell"];
        full_args.extend_from_slice(args);

        self.run(&full_args)
    }

    fn push(&self, local: &Path, remote: &str) -> Result<()> {
        let mut command = self.adb.command();
        command.args(self.selector.args());
        command.arg("push").arg(local).arg(remote);

        tool::run(&mut command, None)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use super::*;

    /// Answers shell commands from a fixed table.
    struct ShellOnly(BTreeMap<&'static str, &'static str>);

    impl Device for ShellOnly {
        fn shell(&self, args: &[&str]) -> Result<String> {
            let command = args.join(" ");
            Ok(self.0.get(command.as_str()).copied().unwrap_or_default().to_owned())
        }

        fn push(&self, _local: &Path, _remote: &str) -> Result<()> {
            Ok(())
        }
    }

    fn device() -> ShellOnly {
        ShellOnly(BTreeMap::from([
            (
                "toolbox ps busybox | (read header; while read user pid rest; do echo $pid; done)",
                "42\n123\n",
            ),
            ("ls /proc/123/cmdline 2>/dev/null 1>/dev/null; echo $?", "0\n"),
            ("ls /proc/7/cmdline 2>/dev/null 1>/dev/null; echo $?", "1\n"),
            ("cat /proc/123/cmdline", "busybox\0httpd\0-h\0/data/local/b2g-updates\0"),
        ]))
    }

    #[test]
    fn process_queries() {
        let device = device();

        assert_eq!(device.get_pids("busybox").unwrap(), ["42", "123"]);
        assert!(device.get_pids("b2g").unwrap().is_empty());

        assert_eq!(
            device.get_cmdline("123").unwrap(),
            ["busybox", "httpd", "-h", "/data/local/b2g-updates"],
        );
        assert_matches!(
            device.get_cmdline("7"),
            Err(Error::MissingCmdline(pid)) if pid == "7"
        );
    }

    #[test]
    fn devices_listing() {
        let output = "List of devices attached\n\
                      full_keon\tdevice\n\
                      emulator-5554\toffline\n\
                      \n\
                      0123456789ABCDEF\tdevice\r\n";

        assert_eq!(
            parse_devices(output),
            BTreeSet::from(["0123456789ABCDEF".to_owned(), "full_keon".to_owned()]),
        );
    }

    #[test]
    fn selector_args() {
        assert!(DeviceSelector::Any.args().is_empty());
        assert_eq!(DeviceSelector::Usb.args(), ["-d"]);
        assert_eq!(DeviceSelector::Serial("abc".to_owned()).args(), ["-s", "abc"]);
    }
}
