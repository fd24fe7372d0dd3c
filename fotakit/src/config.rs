// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    collections::BTreeMap,
    env,
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::tool::{self, Tool};

/// Script in the B2G root that exports the checkout's build variables.
const LOAD_CONFIG_SCRIPT: &str = "load-config.sh";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to run {LOAD_CONFIG_SCRIPT}")]
    LoadConfig(#[source] tool::Error),
    #[error("Wrong number of config vars from {LOAD_CONFIG_SCRIPT}: {0}")]
    WrongVarCount(usize),
    #[error("Failed to read tools config: {0:?}")]
    ReadFile(PathBuf, #[source] io::Error),
    #[error("Failed to parse tools config: {0:?}")]
    Parse(PathBuf, #[source] toml_edit::de::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// External programs and bundled files that the pipeline can be configured to
/// use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// Gecko's MAR archive tool.
    Mar,
    /// Gecko's binary diffing tool.
    Mbsdiff,
    MakeFullUpdate,
    MakeIncrementalUpdate,
    Java,
    SignapkJar,
    /// Prebuilt recovery `update-binary` used when a staging dir lacks one.
    UpdateBinary,
    /// Prebuilt busybox for serving updates from the device.
    Busybox,
    Adb,
    FsConfig,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Mar => "mar",
            Self::Mbsdiff => "mbsdiff",
            Self::MakeFullUpdate => "make_full_update.sh",
            Self::MakeIncrementalUpdate => "make_incremental_update.sh",
            Self::Java => "java",
            Self::SignapkJar => "signapk.jar",
            Self::UpdateBinary => "update-binary",
            Self::Busybox => "busybox",
            Self::Adb => "adb",
            Self::FsConfig => "fs_config",
        }
    }

    /// Environment variable that overrides the tool's default location.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::Mar => "MAR",
            Self::Mbsdiff => "MBSDIFF",
            Self::MakeFullUpdate => "MAKE_FULL_UPDATE",
            Self::MakeIncrementalUpdate => "MAKE_INCREMENTAL_UPDATE",
            Self::Java => "JAVA",
            Self::SignapkJar => "SIGNAPK_JAR",
            Self::UpdateBinary => "UPDATE_BINARY",
            Self::Busybox => "BUSYBOX",
            Self::Adb => "ADB",
            Self::FsConfig => "FS_CONFIG",
        }
    }

    pub const ALL: [Self; 10] = [
        Self::Mar,
        Self::Mbsdiff,
        Self::MakeFullUpdate,
        Self::MakeIncrementalUpdate,
        Self::Java,
        Self::SignapkJar,
        Self::UpdateBinary,
        Self::Busybox,
        Self::Adb,
        Self::FsConfig,
    ];
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ToolsFile {
    #[serde(default)]
    tools: BTreeMap<ToolKind, PathBuf>,
}

/// Host directory name used by the prebuilt and host-built binaries.
pub fn host_dir() -> &'static str {
    if cfg!(target_os = "macos") {
        "darwin-x86"
    } else {
        "linux-x86"
    }
}

/// Locations of the B2G checkout and every external tool. This is built once
/// at startup and passed by reference to every component that needs it.
#[derive(Clone, Debug)]
pub struct Config {
    pub b2g_dir: PathBuf,
    pub gecko_path: PathBuf,
    pub gecko_objdir: PathBuf,
    pub device: Option<String>,
    overrides: BTreeMap<ToolKind, PathBuf>,
}

impl Config {
    /// Create a config for the B2G checkout at `b2g_dir` using only the
    /// default tool locations.
    pub fn new(b2g_dir: impl Into<PathBuf>) -> Self {
        let b2g_dir = b2g_dir.into();
        let gecko_path = b2g_dir.join("gecko");
        let gecko_objdir = gecko_path.join("objdir-gecko");

        Self {
            b2g_dir,
            gecko_path,
            gecko_objdir,
            device: None,
            overrides: BTreeMap::new(),
        }
    }

    /// Build the config from the B2G checkout at `b2g_dir`, the process
    /// environment, and an optional TOML file with tool overrides. Overrides
    /// from the TOML file take precedence over environment variables.
    pub fn load(b2g_dir: &Path, tools_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::new(b2g_dir);

        let mut vars = [
            env::var_os("GECKO_PATH"),
            env::var_os("GECKO_OBJDIR"),
            env::var_os("DEVICE"),
        ];

        if vars[0].is_none() && b2g_dir.join(LOAD_CONFIG_SCRIPT).is_file() {
            vars = Self::run_load_config(b2g_dir)?;
        }

        let [gecko_path, gecko_objdir, device] = vars;
        config.set_gecko(
            gecko_path.filter(|v| !v.is_empty()).map(PathBuf::from),
            gecko_objdir.filter(|v| !v.is_empty()).map(PathBuf::from),
        );
        config.device = device
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string_lossy().into_owned());

        for kind in ToolKind::ALL {
            if let Some(path) = env::var_os(kind.env_var()).filter(|v| !v.is_empty()) {
                config.overrides.insert(kind, PathBuf::from(path));
            }
        }

        if let Some(path) = tools_file {
            let data = fs::read_to_string(path).map_err(|e| Error::ReadFile(path.to_owned(), e))?;
            let file: ToolsFile =
                toml_edit::de::from_str(&data).map_err(|e| Error::Parse(path.to_owned(), e))?;
            config.overrides.extend(file.tools);
        }

        debug!("Loaded config: {config:?}");

        Ok(config)
    }

    /// Source `load-config.sh` in a bash subshell and echo back the gecko
    /// variables it exports.
    fn run_load_config(b2g_dir: &Path) -> Result<[Option<OsString>; 3]> {
        let bash = Tool::on_path("bash").map_err(Error::LoadConfig)?;
        let script =
            format!(". {LOAD_CONFIG_SCRIPT} 1>&2\necho $GECKO_PATH\necho $GECKO_OBJDIR\necho $DEVICE");

        let mut command = bash.command();
        command.arg("-c").arg(script);
        command.current_dir(b2g_dir);
        command.env("B2G_DIR", b2g_dir);

        let output = tool::run(&mut command, None).map_err(Error::LoadConfig)?;
        let output = String::from_utf8_lossy(&output);
        let lines = output.lines().map(str::trim).collect::<Vec<_>>();

        let [gecko_path, gecko_objdir, device] = lines[..] else {
            return Err(Error::WrongVarCount(lines.len()));
        };

        Ok([gecko_path, gecko_objdir, device].map(|v| {
            if v.is_empty() {
                None
            } else {
                Some(OsString::from(v))
            }
        }))
    }

    /// Set the gecko source and object directories. A relative gecko path is
    /// resolved against the B2G root. The object directory defaults to
    /// `objdir-gecko` inside the gecko directory.
    pub fn set_gecko(&mut self, gecko_path: Option<PathBuf>, gecko_objdir: Option<PathBuf>) {
        self.gecko_path = match gecko_path {
            Some(p) if p.is_relative() && !p.exists() => self.b2g_dir.join(p),
            Some(p) => p,
            None => self.b2g_dir.join("gecko"),
        };
        self.gecko_objdir = gecko_objdir.unwrap_or_else(|| self.gecko_path.join("objdir-gecko"));
    }

    /// Override the location of a tool.
    pub fn set_tool(&mut self, kind: ToolKind, path: impl Into<PathBuf>) {
        self.overrides.insert(kind, path.into());
    }

    /// Directory containing this tool suite's bundled binaries.
    pub fn bin_dir(&self) -> PathBuf {
        self.b2g_dir.join("tools").join("update-tools").join("bin")
    }

    /// Directory containing the dev key pairs.
    pub fn security_dir(&self) -> PathBuf {
        self.b2g_dir
            .join("build")
            .join("target")
            .join("product")
            .join("security")
    }

    /// Paths to the public and private halves of the named dev key.
    pub fn dev_key_pair(&self, name: &str) -> (PathBuf, PathBuf) {
        let dir = self.security_dir();
        (
            dir.join(format!("{name}.x509.pem")),
            dir.join(format!("{name}.pk8")),
        )
    }

    fn gecko_host_bin(&self, name: &str) -> PathBuf {
        self.gecko_objdir
            .join("dist")
            .join("host")
            .join("bin")
            .join(name)
    }

    fn packaging_dir(&self) -> PathBuf {
        self.gecko_path.join("tools").join("update-packaging")
    }

    /// Locate a tool. Explicit overrides are used as-is. Otherwise, the tool's
    /// fixed location relative to the B2G checkout is used, falling back to a
    /// `PATH` lookup for programs that are normally installed system-wide.
    pub fn tool(&self, kind: ToolKind) -> tool::Result<Tool> {
        if let Some(path) = self.overrides.get(&kind) {
            return Tool::at(kind.name(), path);
        }

        let default = match kind {
            ToolKind::Mar => self.gecko_host_bin("mar"),
            ToolKind::Mbsdiff => self.gecko_host_bin("mbsdiff"),
            ToolKind::MakeFullUpdate => self.packaging_dir().join("make_full_update.sh"),
            ToolKind::MakeIncrementalUpdate => {
                self.packaging_dir().join("make_incremental_update.sh")
            }
            ToolKind::Java => return Tool::on_path("java"),
            ToolKind::SignapkJar => self.bin_dir().join("signapk.jar"),
            ToolKind::UpdateBinary => self.bin_dir().join("gonk").join("update-binary"),
            ToolKind::Busybox => self.bin_dir().join("gonk").join("busybox-armv6l"),
            ToolKind::Adb => {
                let prebuilt = self.bin_dir().join(host_dir()).join("adb");
                if prebuilt.is_file() {
                    prebuilt
                } else {
                    return Tool::on_path("adb");
                }
            }
            ToolKind::FsConfig => self
                .b2g_dir
                .join("out")
                .join("host")
                .join(host_dir())
                .join("bin")
                .join("fs_config"),
        };

        Tool::at(kind.name(), default)
    }
}
