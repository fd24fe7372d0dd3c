// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::{Context, Result};
use clap::{Args, Parser};

use crate::{
    cli::status,
    config::Config,
    format::mar::{self, MarEntries, MarTool},
    package::manifest::{ManifestBuilder, ManifestOptions, UrlTemplate},
};

const HEADING_MAR: &str = "MAR options";
const HEADING_UPDATE: &str = "Update options";

/// Look up the mar tool only when a MAR actually needs to be probed.
pub struct LazyMarProbe<'a> {
    config: &'a Config,
}

impl<'a> LazyMarProbe<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl MarEntries for LazyMarProbe<'_> {
    fn list_entries(&self, path: &Path) -> mar::Result<Vec<String>> {
        MarTool::new(self.config)?.list_entries(path)
    }
}

/// Options describing the update that a manifest advertises.
#[derive(Debug, Args)]
pub struct ManifestGroup {
    /// Complete update MAR.
    #[arg(value_name = "MAR", value_parser)]
    pub mar: Option<PathBuf>,

    /// Complete update MAR. Takes precedence over the positional argument.
    #[arg(short, long, value_name = "MAR", value_parser, help_heading = HEADING_MAR)]
    pub complete_mar: Option<PathBuf>,

    /// Partial update MAR.
    #[arg(short, long, value_name = "MAR", value_parser, help_heading = HEADING_MAR)]
    pub partial_mar: Option<PathBuf>,

    /// Template for each patch URL.
    ///
    /// %(filename)s is replaced with the MAR's file name. Every other update
    /// option is available by its long name with underscores, for example
    /// %(build_id)s.
    #[arg(short, long, value_name = "URL", help_heading = HEADING_UPDATE)]
    pub url_template: Option<String>,

    /// Update type [default: minor].
    #[arg(short = 't', long, value_name = "TYPE", help_heading = HEADING_UPDATE)]
    pub update_type: Option<String>,

    /// App version [default: 99.0].
    #[arg(short = 'v', long, value_name = "VERSION", help_heading = HEADING_UPDATE)]
    pub app_version: Option<String>,

    /// Platform version [default: 99.0].
    #[arg(short = 'V', long, value_name = "VERSION", help_heading = HEADING_UPDATE)]
    pub platform_version: Option<String>,

    /// Build ID [default: current local time as YYYYmmddHHMMSS].
    #[arg(short = 'i', long, value_name = "ID", help_heading = HEADING_UPDATE)]
    pub build_id: Option<String>,

    /// License URL.
    #[arg(short = 'l', long, value_name = "URL", help_heading = HEADING_UPDATE)]
    pub license_url: Option<String>,

    /// Details URL.
    #[arg(short = 'd', long, value_name = "URL", help_heading = HEADING_UPDATE)]
    pub details_url: Option<String>,

    /// Mark the complete MAR as an OS (FOTA) update instead of detecting it.
    ///
    /// Partial MARs are ignored for OS updates.
    #[arg(short = 'O', long, help_heading = HEADING_UPDATE)]
    pub fota_update: bool,
}

impl ManifestGroup {
    pub fn url_template(&self) -> Option<UrlTemplate> {
        self.url_template.as_deref().map(UrlTemplate::new)
    }

    pub fn options(&self) -> ManifestOptions {
        ManifestOptions {
            complete_mar: self.complete_mar.clone().or_else(|| self.mar.clone()),
            partial_mar: self.partial_mar.clone(),
            url_template: self.url_template(),
            update_type: self.update_type.clone(),
            app_version: self.app_version.clone(),
            platform_version: self.platform_version.clone(),
            build_id: self.build_id.clone(),
            license_url: self.license_url.clone(),
            details_url: self.details_url.clone(),
            fota_update: self.fota_update.then_some(true),
        }
    }

    /// Render the manifest and report which MARs it advertises.
    pub fn build_xml(
        &self,
        config: &Config,
        cancel_signal: &AtomicBool,
    ) -> Result<RenderedManifest> {
        let builder = ManifestBuilder::new(self.options());
        let descriptor = builder
            .build_descriptor(&LazyMarProbe::new(config), cancel_signal)
            .context("Failed to build update descriptor")?;
        let xml = descriptor.render()?;

        let partial_mar = if descriptor.dropped_partial.is_some() {
            None
        } else {
            builder.partial_mar().map(Path::to_owned)
        };

        Ok(RenderedManifest {
            xml,
            complete_mar: builder.complete_mar().map(Path::to_owned),
            partial_mar,
        })
    }
}

pub struct RenderedManifest {
    pub xml: String,
    pub complete_mar: Option<PathBuf>,
    pub partial_mar: Option<PathBuf>,
}

pub fn update_xml_main(
    cli: &UpdateXmlCli,
    config: &Config,
    cancel_signal: &AtomicBool,
) -> Result<()> {
    let xml = cli.manifest.build_xml(config, cancel_signal)?.xml;

    match &cli.output {
        Some(path) => {
            fs::write(path, &xml).with_context(|| format!("Failed to write {path:?}"))?;
            status!("Update XML generated: {path:?}");
        }
        None => print!("{xml}"),
    }

    Ok(())
}

/// Build an update.xml advertising complete and/or partial MARs.
#[derive(Debug, Parser)]
pub struct UpdateXmlCli {
    #[command(flatten)]
    pub manifest: ManifestGroup,

    /// Output file. Defaults to stdout.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub output: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_complete_mar() {
        let cli = UpdateXmlCli::parse_from(["update-xml", "b2g.mar", "-p", "partial.mar", "-O"]);
        let options = cli.manifest.options();

        assert_eq!(options.complete_mar.as_deref(), Some(Path::new("b2g.mar")));
        assert_eq!(options.partial_mar.as_deref(), Some(Path::new("partial.mar")));
        assert_eq!(options.fota_update, Some(true));

        let cli = UpdateXmlCli::parse_from(["update-xml", "b2g.mar", "-c", "other.mar"]);
        let options = cli.manifest.options();

        assert_eq!(options.complete_mar.as_deref(), Some(Path::new("other.mar")));
        assert_eq!(options.fota_update, None);
    }
}
