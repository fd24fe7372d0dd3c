// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::{LazyLock, atomic::AtomicBool},
};

use regex::Regex;
use ring::digest::{Context, SHA512};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    format::{
        mar::{self, MarEntries},
        update_xml::{HASH_FUNCTION_SHA512, Patch, PatchKind, UpdateDescriptor},
    },
    stream::{self, HashingReader},
    util,
};

pub const DEFAULT_URL_TEMPLATE: &str = "http://localhost/%(filename)s";
pub const DEFAULT_UPDATE_TYPE: &str = "minor";
pub const DEFAULT_APP_VERSION: &str = "99.0";
pub const DEFAULT_PLATFORM_VERSION: &str = "99.0";
pub const DEFAULT_LICENSE_URL: &str = "http://www.mozilla.com/test/sample-eula.html";
pub const DEFAULT_DETAILS_URL: &str = "http://www.mozilla.com/test/sample-details.html";

static TEMPLATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%(?:\(([A-Za-z_][A-Za-z0-9_]*)\)s|%)").unwrap());

#[derive(Debug, Error)]
pub enum Error {
    #[error("Either a complete or a partial MAR is required")]
    NoMar,
    #[error("A FOTA update requires a complete MAR")]
    FotaWithoutComplete,
    #[error("MAR doesn't exist: {0:?}")]
    MissingMar(PathBuf),
    #[error("Unknown URL template key: {0:?}")]
    UnknownTemplateKey(String),
    #[error("Invalid URL template: {0:?}")]
    InvalidTemplate(String),
    #[error("Failed to read MAR: {0:?}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Failed to detect MAR type: {0:?}")]
    Probe(PathBuf, #[source] mar::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// URL template with Python-style `%(key)s` placeholders. `%%` is a literal
/// `%`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, vars: &BTreeMap<&str, &str>) -> Result<String> {
        let mut result = String::new();
        let mut last = 0;

        for captures in TEMPLATE_REGEX.captures_iter(&self.0) {
            let Some(m) = captures.get(0) else {
                continue;
            };

            let literal = &self.0[last..m.start()];
            if literal.contains('%') {
                return Err(Error::InvalidTemplate(self.0.clone()));
            }
            result.push_str(literal);

            match captures.get(1) {
                Some(key) => {
                    let value = vars
                        .get(key.as_str())
                        .ok_or_else(|| Error::UnknownTemplateKey(key.as_str().to_owned()))?;
                    result.push_str(value);
                }
                None => result.push('%'),
            }

            last = m.end();
        }

        let literal = &self.0[last..];
        if literal.contains('%') {
            return Err(Error::InvalidTemplate(self.0.clone()));
        }
        result.push_str(literal);

        Ok(result)
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_URL_TEMPLATE)
    }
}

/// Caller-supplied manifest parameters. Unset fields use their defaults.
#[derive(Clone, Debug, Default)]
pub struct ManifestOptions {
    pub complete_mar: Option<PathBuf>,
    pub partial_mar: Option<PathBuf>,
    pub url_template: Option<UrlTemplate>,
    pub update_type: Option<String>,
    pub app_version: Option<String>,
    pub platform_version: Option<String>,
    pub build_id: Option<String>,
    pub license_url: Option<String>,
    pub details_url: Option<String>,
    /// Whether the complete MAR is an OS update. [`None`] means detect.
    pub fota_update: Option<bool>,
}

/// Build ID derived from the current local time.
pub fn generate_build_id() -> String {
    chrono::Local::now().format("%Y%m%d%H%M%S").to_string()
}

#[derive(Clone, Debug)]
pub struct ManifestBuilder {
    complete_mar: Option<PathBuf>,
    partial_mar: Option<PathBuf>,
    fota_update: Option<bool>,
    url_template: UrlTemplate,
    update_type: String,
    app_version: String,
    platform_version: String,
    build_id: String,
    license_url: String,
    details_url: String,
}

impl ManifestBuilder {
    /// Resolve the defaults for every unset option. The build ID is generated
    /// once here so that every URL rendered by this builder agrees.
    pub fn new(options: ManifestOptions) -> Self {
        Self {
            complete_mar: options.complete_mar,
            partial_mar: options.partial_mar,
            fota_update: options.fota_update,
            url_template: options.url_template.unwrap_or_default(),
            update_type: options
                .update_type
                .unwrap_or_else(|| DEFAULT_UPDATE_TYPE.to_owned()),
            app_version: options
                .app_version
                .unwrap_or_else(|| DEFAULT_APP_VERSION.to_owned()),
            platform_version: options
                .platform_version
                .unwrap_or_else(|| DEFAULT_PLATFORM_VERSION.to_owned()),
            build_id: options.build_id.unwrap_or_else(generate_build_id),
            license_url: options
                .license_url
                .unwrap_or_else(|| DEFAULT_LICENSE_URL.to_owned()),
            details_url: options
                .details_url
                .unwrap_or_else(|| DEFAULT_DETAILS_URL.to_owned()),
        }
    }

    pub fn complete_mar(&self) -> Option<&Path> {
        self.complete_mar.as_deref()
    }

    pub fn partial_mar(&self) -> Option<&Path> {
        self.partial_mar.as_deref()
    }

    /// Render the URL template for a file with the given name.
    pub fn url_for(&self, filename: &str) -> Result<String> {
        let vars = BTreeMap::from([
            ("filename", filename),
            ("update_type", self.update_type.as_str()),
            ("app_version", self.app_version.as_str()),
            ("platform_version", self.platform_version.as_str()),
            ("build_id", self.build_id.as_str()),
            ("license_url", self.license_url.as_str()),
            ("details_url", self.details_url.as_str()),
        ]);

        self.url_template.render(&vars)
    }

    /// Determine whether the complete MAR is an OS update, probing the MAR
    /// if the caller did not say.
    fn is_os_update(&self, probe: &dyn MarEntries) -> Result<bool> {
        match (self.fota_update, &self.complete_mar) {
            (Some(true), None) => Err(Error::FotaWithoutComplete),
            (Some(value), _) => Ok(value),
            (None, Some(path)) => {
                if !path.is_file() {
                    return Err(Error::MissingMar(path.clone()));
                }

                probe
                    .is_fota(path)
                    .map_err(|e| Error::Probe(path.clone(), e))
            }
            (None, None) => Ok(false),
        }
    }

    fn build_patch(&self, kind: PatchKind, path: &Path, cancel_signal: &AtomicBool) -> Result<Patch> {
        let read_err = |e| Error::Read(path.to_owned(), e);

        let file = File::open(path).map_err(read_err)?;
        let size = file.metadata().map_err(read_err)?.len();

        let mut reader = HashingReader::new(BufReader::new(file), Context::new(&SHA512));
        stream::copy(&mut reader, io::sink(), cancel_signal).map_err(read_err)?;
        let (_, context) = reader.finish();
        let hash_value = hex::encode(context.finish());

        let url = self.url_for(&util::file_name_lossy(path))?;

        debug!("{kind} patch: {path:?}: {size} bytes, sha512={hash_value}");

        Ok(Patch {
            kind,
            url,
            hash_function: HASH_FUNCTION_SHA512,
            hash_value,
            size,
        })
    }

    pub fn build_descriptor(
        &self,
        probe: &dyn MarEntries,
        cancel_signal: &AtomicBool,
    ) -> Result<UpdateDescriptor> {
        if self.complete_mar.is_none() && self.partial_mar.is_none() {
            return Err(Error::NoMar);
        }

        let is_os_update = self.is_os_update(probe)?;

        let mut partial_mar = self.partial_mar.as_deref();
        let mut dropped_partial = None;

        if is_os_update {
            if let Some(path) = partial_mar.take() {
                warn!("Partial MAR ignored for FOTA updates: {path:?}");
                dropped_partial = Some(path.to_owned());
            }
        }

        let mut patches = vec![];

        for (kind, path) in [
            (PatchKind::Complete, self.complete_mar.as_deref()),
            (PatchKind::Partial, partial_mar),
        ] {
            if let Some(path) = path {
                patches.push(self.build_patch(kind, path, cancel_signal)?);
            }
        }

        Ok(UpdateDescriptor {
            update_type: self.update_type.clone(),
            app_version: self.app_version.clone(),
            platform_version: self.platform_version.clone(),
            build_id: self.build_id.clone(),
            license_url: self.license_url.clone(),
            details_url: self.details_url.clone(),
            is_os_update,
            patches,
            dropped_partial,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;

    struct NeverProbe;

    impl MarEntries for NeverProbe {
        fn list_entries(&self, mar_path: &Path) -> mar::Result<Vec<String>> {
            panic!("Unexpected probe of {mar_path:?}");
        }
    }

    #[test]
    fn template_rendering() {
        let vars = BTreeMap::from([("filename", "update.xml"), ("build_id", "1")]);

        assert_eq!(
            UrlTemplate::default().render(&vars).unwrap(),
            "http://localhost/update.xml",
        );
        assert_eq!(
            UrlTemplate::new("http://h/%(build_id)s/%(filename)s?p=100%%")
                .render(&vars)
                .unwrap(),
            "http://h/1/update.xml?p=100%",
        );
        assert_matches!(
            UrlTemplate::new("http://h/%(nope)s").render(&vars),
            Err(Error::UnknownTemplateKey(k)) if k == "nope"
        );
        assert_matches!(
            UrlTemplate::new("http://h/%d").render(&vars),
            Err(Error::InvalidTemplate(_))
        );
    }

    #[test]
    fn requires_a_mar() {
        let builder = ManifestBuilder::new(ManifestOptions::default());

        assert_matches!(
            builder.build_descriptor(&NeverProbe, &AtomicBool::new(false)),
            Err(Error::NoMar)
        );
    }

    #[test]
    fn fota_requires_complete_mar() {
        let temp_dir = TempDir::new().unwrap();
        let partial = temp_dir.path().join("partial.mar");
        fs::write(&partial, b"partial").unwrap();

        let builder = ManifestBuilder::new(ManifestOptions {
            partial_mar: Some(partial),
            fota_update: Some(true),
            ..Default::default()
        });

        assert_matches!(
            builder.build_descriptor(&NeverProbe, &AtomicBool::new(false)),
            Err(Error::FotaWithoutComplete)
        );
    }

    #[test]
    fn detection_requires_existing_mar() {
        let builder = ManifestBuilder::new(ManifestOptions {
            complete_mar: Some(PathBuf::from("/fotakit-missing.mar")),
            ..Default::default()
        });

        assert_matches!(
            builder.build_descriptor(&NeverProbe, &AtomicBool::new(false)),
            Err(Error::MissingMar(_))
        );
    }

    #[test]
    fn explicit_flag_skips_detection() {
        let temp_dir = TempDir::new().unwrap();
        let complete = temp_dir.path().join("b2g-update.mar");
        let partial = temp_dir.path().join("b2g-partial.mar");
        fs::write(&complete, b"complete").unwrap();
        fs::write(&partial, b"partial!").unwrap();

        let builder = ManifestBuilder::new(ManifestOptions {
            complete_mar: Some(complete),
            partial_mar: Some(partial),
            url_template: Some(UrlTemplate::new("https://updates/%(filename)s")),
            build_id: Some("20260101000000".to_owned()),
            fota_update: Some(false),
            ..Default::default()
        });

        let descriptor = builder
            .build_descriptor(&NeverProbe, &AtomicBool::new(false))
            .unwrap();

        assert!(!descriptor.is_os_update);
        assert_eq!(descriptor.build_id, "20260101000000");
        assert_eq!(descriptor.update_type, DEFAULT_UPDATE_TYPE);
        assert_eq!(descriptor.patches.len(), 2);

        let partial = descriptor.patch(PatchKind::Partial).unwrap();
        assert_eq!(partial.url, "https://updates/b2g-partial.mar");
        assert_eq!(partial.size, 8);
        assert_eq!(partial.hash_value.len(), 128);
    }
}
