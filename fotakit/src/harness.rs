// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Serve an update to a device and point its update client at it.

use std::{
    collections::BTreeMap,
    fmt, fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

use crate::{
    config::{Config, ToolKind},
    device::{self, Device},
    package::manifest::{self, UrlTemplate},
    tool::{self, Tool},
};

pub const REMOTE_BIN_DIR: &str = "/data/local/bin";
pub const REMOTE_BUSYBOX: &str = "/data/local/bin/busybox";
pub const REMOTE_HTTP_ROOT: &str = "/data/local/b2g-updates";
pub const REMOTE_PROFILE_DIR: &str = "/data/b2g/mozilla";
pub const UPDATE_URL_PREF: &str = "app.update.url.override";
pub const UPDATE_XML: &str = "update.xml";

#[derive(Debug, Error)]
pub enum Error {
    #[error("At least one of the complete or partial MAR is required")]
    NoMar,
    #[error("Update URL template required {0}")]
    TemplateRequired(&'static str),
    #[error("Invalid MAR path: {0:?}")]
    InvalidMar(PathBuf),
    #[error("Failed to create staging directory")]
    StageDir(#[source] io::Error),
    #[error("Failed to write file: {0:?}")]
    Write(PathBuf, #[source] io::Error),
    #[error("Failed to copy {0:?} to {1:?}")]
    Copy(PathBuf, PathBuf, #[source] io::Error),
    #[error("Unable to find profile dir in {REMOTE_PROFILE_DIR}")]
    ProfileNotFound,
    #[error("Busybox HTTP server PID not running")]
    ServerNotRunning,
    #[error(transparent)]
    Template(#[from] manifest::Error),
    #[error(transparent)]
    Device(#[from] device::Error),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, Default)]
pub struct HarnessOptions {
    pub complete_mar: Option<PathBuf>,
    pub partial_mar: Option<PathBuf>,
    pub url_template: Option<UrlTemplate>,
    /// Serve from this local directory instead of from the device.
    pub update_dir: Option<PathBuf>,
    /// Only write the URL override preference.
    pub only_override: bool,
    /// Device path of `prefs.js`. Discovered from the default profile if
    /// unset.
    pub prefs_js: Option<String>,
}

#[derive(Debug)]
enum StageDir {
    /// Owned by the caller and never removed.
    Local(PathBuf),
    Temp(TempDir),
}

impl StageDir {
    fn path(&self) -> &Path {
        match self {
            Self::Local(p) => p,
            Self::Temp(d) => d.path(),
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

pub struct UpdateTestHarness<'a, D: Device> {
    device: &'a D,
    update_xml: String,
    complete_mar: Option<PathBuf>,
    partial_mar: Option<PathBuf>,
    only_override: bool,
    prefs_js: Option<String>,
    update_url: String,
    stage_dir: StageDir,
    busybox: Option<Tool>,
}

impl<D: Device> fmt::Debug for UpdateTestHarness<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateTestHarness")
            .field("complete_mar", &self.complete_mar)
            .field("partial_mar", &self.partial_mar)
            .field("only_override", &self.only_override)
            .field("update_url", &self.update_url)
            .field("stage_dir", &self.stage_dir)
            .finish_non_exhaustive()
    }
}

impl<'a, D: Device> UpdateTestHarness<'a, D> {
    pub fn new(
        config: &Config,
        device: &'a D,
        update_xml: String,
        options: HarnessOptions,
    ) -> Result<Self> {
        if options.complete_mar.is_none()
            && options.partial_mar.is_none()
            && !options.only_override
        {
            return Err(Error::NoMar);
        }

        if options.only_override && options.url_template.is_none() {
            return Err(Error::TemplateRequired("when only overriding"));
        }
        if options.update_dir.is_some() && options.url_template.is_none() {
            return Err(Error::TemplateRequired("with update dir"));
        }

        let url_template = options.url_template.unwrap_or_default();
        let update_url = url_template.render(&BTreeMap::from([("filename", UPDATE_XML)]))?;

        let (stage_dir, busybox) = match options.update_dir {
            Some(dir) => (StageDir::Local(dir), None),
            None => {
                let busybox = config.tool(ToolKind::Busybox)?;
                let temp_dir = TempDir::new().map_err(Error::StageDir)?;
                (StageDir::Temp(temp_dir), Some(busybox))
            }
        };

        Ok(Self {
            device,
            update_xml,
            complete_mar: options.complete_mar,
            partial_mar: options.partial_mar,
            only_override: options.only_override,
            prefs_js: options.prefs_js,
            update_url,
            stage_dir,
            busybox,
        })
    }

    pub fn update_url(&self) -> &str {
        &self.update_url
    }

    pub fn stage_dir(&self) -> &Path {
        self.stage_dir.path()
    }

    pub fn run(&self, write_url_pref: bool, restart: bool) -> Result<()> {
        let output_xml = self.stage_dir.path().join(UPDATE_XML);
        fs::write(&output_xml, &self.update_xml).map_err(|e| Error::Write(output_xml, e))?;

        let is_local = self.stage_dir.is_local();

        if let Some(busybox) = &self.busybox {
            self.push_busybox(busybox)?;
        }

        if !self.only_override {
            self.push_update_site()?;
        }

        if !is_local {
            self.start_http_server()?;
        }

        if write_url_pref {
            self.override_update_url()?;
        }

        if restart {
            self.restart_b2g()?;
        }

        Ok(())
    }

    fn push_busybox(&self, busybox: &Tool) -> Result<()> {
        if self.device.file_exists(REMOTE_BUSYBOX)? {
            info!("Busybox already found at {REMOTE_BUSYBOX}");
            return Ok(());
        }

        info!("Busybox not found, pushing to {REMOTE_BUSYBOX}");
        self.device.shell(&["mkdir", "-p", REMOTE_BIN_DIR])?;
        self.device.push(busybox.path(), REMOTE_BUSYBOX)?;
        self.device.shell(&["chmod", "755", REMOTE_BUSYBOX])?;

        Ok(())
    }

    fn push_update_site(&self) -> Result<()> {
        let stage_dir = self.stage_dir.path();

        for mar in [&self.complete_mar, &self.partial_mar].into_iter().flatten() {
            let name = mar
                .file_name()
                .ok_or_else(|| Error::InvalidMar(mar.clone()))?;
            let target = stage_dir.join(name);

            if self.stage_dir.is_local() {
                info!("Copying {mar:?} to {stage_dir:?}");
            }
            fs::copy(mar, &target).map_err(|e| Error::Copy(mar.clone(), target, e))?;
        }

        if !self.stage_dir.is_local() {
            self.device.push(stage_dir, REMOTE_HTTP_ROOT)?;
        }

        Ok(())
    }

    fn busybox_httpd_pid(&self) -> Result<Option<String>> {
        for pid in self.device.get_pids("busybox")? {
            let cmdline = self.device.get_cmdline(&pid)?;
            if cmdline.get(1).is_some_and(|a| a == "httpd") {
                return Ok(Some(pid));
            }
        }

        Ok(None)
    }

    fn start_http_server(&self) -> Result<()> {
        if let Some(pid) = self.busybox_httpd_pid()? {
            info!("Busybox HTTP server already running, PID: {pid}");
            return Ok(());
        }

        info!("Starting Busybox HTTP server");
        self.device
            .shell(&[REMOTE_BUSYBOX, "httpd", "-h", REMOTE_HTTP_ROOT])?;

        let pid = self.busybox_httpd_pid()?.ok_or(Error::ServerNotRunning)?;
        info!("Busybox HTTP server now running. Root: {REMOTE_HTTP_ROOT}, PID: {pid}");

        Ok(())
    }

    fn override_update_url(&self) -> Result<()> {
        let prefs_js = match &self.prefs_js {
            Some(p) => p.clone(),
            None => {
                let command = format!("echo -n {REMOTE_PROFILE_DIR}/*.default");
                let profile_dir = self.device.shell(&[command.as_str()])?;
                if profile_dir.contains('*') {
                    return Err(Error::ProfileNotFound);
                }

                format!("{}/prefs.js", profile_dir.trim_end())
            }
        };

        info!("Overriding update URL in {prefs_js} to {}", self.update_url);
        let command = format!(
            "echo 'user_pref(\"{UPDATE_URL_PREF}\", \"{}\");' >> {prefs_js}",
            self.update_url,
        );
        self.device.shell(&[command.as_str()])?;

        Ok(())
    }

    fn restart_b2g(&self) -> Result<()> {
        info!("Restarting B2G");
        self.device.shell(&["stop b2g; start b2g"])?;

        Ok(())
    }
}
