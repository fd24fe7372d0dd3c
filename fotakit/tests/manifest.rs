// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use fotakit::{
    format::{
        mar::{self, FOTA_UPDATE_ZIP, MarEntries},
        update_xml::PatchKind,
    },
    package::manifest::{ManifestBuilder, ManifestOptions, UrlTemplate},
};
use ring::digest::{SHA512, digest};
use tempfile::TempDir;

/// Reports every MAR as containing the given entries.
struct FixedEntries(&'static [&'static str]);

impl MarEntries for FixedEntries {
    fn list_entries(&self, _mar_path: &Path) -> mar::Result<Vec<String>> {
        Ok(self.0.iter().map(|e| (*e).to_owned()).collect())
    }
}

fn write_mar(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

fn options() -> ManifestOptions {
    ManifestOptions {
        url_template: Some(UrlTemplate::new("http://update.local/%(build_id)s/%(filename)s")),
        app_version: Some("18.0".to_owned()),
        platform_version: Some("18.0".to_owned()),
        build_id: Some("20130101000000".to_owned()),
        ..Default::default()
    }
}

#[test]
fn complete_patch_hash_and_size() {
    let temp_dir = TempDir::new().unwrap();
    let data = b"complete MAR contents ".repeat(5000);
    let complete_mar = write_mar(temp_dir.path(), "b2g-complete.mar", &data);

    let builder = ManifestBuilder::new(ManifestOptions {
        complete_mar: Some(complete_mar),
        ..options()
    });
    let descriptor = builder
        .build_descriptor(&FixedEntries(&["b2g/b2g", "precomplete"]), &AtomicBool::new(false))
        .unwrap();

    assert!(!descriptor.is_os_update);
    assert_eq!(descriptor.patches.len(), 1);

    let patch = descriptor.patch(PatchKind::Complete).unwrap();
    assert_eq!(patch.hash_value, hex::encode(digest(&SHA512, &data)));
    assert_eq!(patch.size, data.len() as u64);
    assert_eq!(patch.url, "http://update.local/20130101000000/b2g-complete.mar");

    let xml = descriptor.render().unwrap();
    assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
    assert!(xml.contains(r#"<update type="minor" appVersion="18.0" version="18.0""#));
    assert_eq!(xml.matches("<patch ").count(), 1);
    assert!(xml.contains(&format!(r#"hashValue="{}""#, patch.hash_value)));
    assert!(xml.contains(&format!(r#"size="{}""#, data.len())));
    assert!(!xml.contains("isOSUpdate"));
}

#[test]
fn fota_update_drops_partial_patch() {
    let temp_dir = TempDir::new().unwrap();
    let complete_mar = write_mar(temp_dir.path(), "fota-complete.mar", b"fota");
    let partial_mar = write_mar(temp_dir.path(), "b2g-partial.mar", b"partial");

    let builder = ManifestBuilder::new(ManifestOptions {
        complete_mar: Some(complete_mar),
        partial_mar: Some(partial_mar.clone()),
        ..options()
    });
    let descriptor = builder
        .build_descriptor(&FixedEntries(&[FOTA_UPDATE_ZIP, "precomplete"]), &AtomicBool::new(false))
        .unwrap();

    assert!(descriptor.is_os_update);
    assert_eq!(descriptor.dropped_partial, Some(partial_mar));
    assert!(descriptor.patch(PatchKind::Partial).is_none());

    let xml = descriptor.render().unwrap();
    assert!(xml.contains(r#"isOSUpdate="true""#));
    assert!(xml.contains(r#"type="complete""#));
    assert!(!xml.contains(r#"type="partial""#));
}

#[test]
fn gecko_update_keeps_partial_patch() {
    let temp_dir = TempDir::new().unwrap();
    let complete_mar = write_mar(temp_dir.path(), "b2g-complete.mar", b"complete");
    let partial_mar = write_mar(temp_dir.path(), "b2g-partial.mar", b"partial");

    let builder = ManifestBuilder::new(ManifestOptions {
        complete_mar: Some(complete_mar),
        partial_mar: Some(partial_mar),
        ..options()
    });
    let descriptor = builder
        .build_descriptor(&FixedEntries(&["b2g/b2g"]), &AtomicBool::new(false))
        .unwrap();

    assert!(!descriptor.is_os_update);
    assert_eq!(descriptor.dropped_partial, None);
    assert_eq!(
        descriptor.patch(PatchKind::Partial).unwrap().url,
        "http://update.local/20130101000000/b2g-partial.mar",
    );
}
