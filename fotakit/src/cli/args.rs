// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    env, io,
    path::PathBuf,
    sync::{Arc, atomic::AtomicBool},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::Level;

use crate::{
    cli::{completion, delta, flash, fota, manifest, test_update, wrap, zip},
    config::Config,
    tool::Tool,
};

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
pub enum Command {
    Completion(completion::CompletionCli),
    Delta(delta::DeltaCli),
    Flash(flash::FlashCli),
    FotaMar(fota::FotaMarCli),
    FotaZip(zip::FotaZipCli),
    TestUpdate(test_update::TestUpdateCli),
    UpdateXml(manifest::UpdateXmlCli),
    Wrap(wrap::WrapCli),
}

/// Options for locating the B2G checkout and the external tools.
#[derive(Debug, Args)]
pub struct ConfigGroup {
    /// Path to the B2G checkout.
    ///
    /// Defaults to $B2G_DIR or the current directory.
    #[arg(long, global = true, value_name = "DIR", value_parser)]
    pub b2g_dir: Option<PathBuf>,

    /// TOML file with tool location overrides.
    #[arg(long, global = true, value_name = "FILE", value_parser)]
    pub tools_config: Option<PathBuf>,
}

impl ConfigGroup {
    pub fn load(&self) -> Result<Config> {
        let b2g_dir = match &self.b2g_dir {
            Some(p) => p.clone(),
            None => match env::var_os("B2G_DIR").filter(|v| !v.is_empty()) {
                Some(p) => PathBuf::from(p),
                None => env::current_dir().context("Failed to get current directory")?,
            },
        };

        Config::load(&b2g_dir, self.tools_config.as_deref())
            .with_context(|| format!("Failed to load config for B2G dir: {b2g_dir:?}"))
    }
}

#[derive(Debug, Args)]
pub struct LogGroup {
    /// Log every external command and archive entry.
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors.
    #[arg(long, global = true)]
    pub quiet: bool,
}

impl LogGroup {
    fn level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else if self.quiet {
            Level::WARN
        } else {
            Level::INFO
        }
    }
}

#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: ConfigGroup,

    #[command(flatten)]
    pub log: LogGroup,
}

fn init_logging(log: &LogGroup) {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(log.level())
        .with_target(false)
        .without_time()
        .init();
}

/// Make sure the host can run the external tools at all.
fn validate_env() -> Result<()> {
    if !cfg!(any(target_os = "linux", target_os = "macos")) {
        bail!("This tool only runs on Linux or macOS");
    }

    Tool::on_path("bash").context("This tool requires bash to be on your PATH")?;

    Ok(())
}

pub fn main(cancel_signal: &Arc<AtomicBool>) -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log);

    // Completions must work outside of a B2G checkout.
    let config = || -> Result<Config> {
        validate_env()?;
        cli.config.load()
    };

    match cli.command {
        Command::Completion(c) => completion::completion_main(&c),
        Command::Delta(c) => delta::delta_main(&c, &config()?, cancel_signal),
        Command::Flash(c) => flash::flash_main(&c, &config()?, cancel_signal),
        Command::FotaMar(c) => fota::fota_mar_main(&c, &config()?),
        Command::FotaZip(c) => zip::fota_zip_main(&c, &config()?, cancel_signal),
        Command::TestUpdate(c) => test_update::test_update_main(&c, &config()?, cancel_signal),
        Command::UpdateXml(c) => manifest::update_xml_main(&c, &config()?, cancel_signal),
        Command::Wrap(c) => wrap::wrap_main(&c, &config()?, cancel_signal),
    }
}
