// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! The `update.xml` document polled by the update client.

use std::{fmt, path::PathBuf};

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, Event},
};
use thiserror::Error;

pub const HASH_FUNCTION_SHA512: &str = "SHA512";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Update descriptor has no patches")]
    NoPatches,
    #[error("Failed to write update XML")]
    Xml(#[source] quick_xml::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PatchKind {
    Complete,
    Partial,
}

impl PatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub kind: PatchKind,
    pub url: String,
    pub hash_function: &'static str,
    /// Lowercase hex digest.
    pub hash_value: String,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateDescriptor {
    pub update_type: String,
    pub app_version: String,
    pub platform_version: String,
    pub build_id: String,
    pub license_url: String,
    pub details_url: String,
    pub is_os_update: bool,
    pub patches: Vec<Patch>,
    /// Partial MAR that was supplied, but left out because the complete patch
    /// is an OS update.
    pub dropped_partial: Option<PathBuf>,
}

impl UpdateDescriptor {
    pub fn patch(&self, kind: PatchKind) -> Option<&Patch> {
        self.patches.iter().find(|p| p.kind == kind)
    }

    /// Render the descriptor as an indented XML document.
    pub fn render(&self) -> Result<String> {
        if self.patches.is_empty() {
            return Err(Error::NoPatches);
        }

        let xml_err = |e| Error::Xml(quick_xml::Error::from(e));
        let mut writer = Writer::new_with_indent(Vec::new(), b'\t', 1);

        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", None, None)))
            .map_err(xml_err)?;
        writer
            .write_event(Event::Start(BytesStart::new("updates")))
            .map_err(xml_err)?;

        let mut update = BytesStart::new("update");
        update.push_attribute(("type", self.update_type.as_str()));
        update.push_attribute(("appVersion", self.app_version.as_str()));
        update.push_attribute(("version", self.platform_version.as_str()));
        update.push_attribute(("buildID", self.build_id.as_str()));
        update.push_attribute(("licenseURL", self.license_url.as_str()));
        update.push_attribute(("detailsURL", self.details_url.as_str()));
        if self.is_os_update {
            update.push_attribute(("isOSUpdate", "true"));
        }
        writer.write_event(Event::Start(update)).map_err(xml_err)?;

        for patch in &self.patches {
            let size = patch.size.to_string();

            let mut elem = BytesStart::new("patch");
            elem.push_attribute(("type", patch.kind.as_str()));
            elem.push_attribute(("URL", patch.url.as_str()));
            elem.push_attribute(("hashFunction", patch.hash_function));
            elem.push_attribute(("hashValue", patch.hash_value.as_str()));
            elem.push_attribute(("size", size.as_str()));

            writer.write_event(Event::Empty(elem)).map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("update")))
            .map_err(xml_err)?;
        writer
            .write_event(Event::End(BytesEnd::new("updates")))
            .map_err(xml_err)?;

        let mut data = writer.into_inner();
        data.push(b'\n');

        // Only string slices were written.
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}
