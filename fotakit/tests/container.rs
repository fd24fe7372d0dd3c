// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fs, path::Path, sync::atomic::AtomicBool};

use assert_matches::assert_matches;
use fotakit::{
    config::{Config, ToolKind},
    format::container::{
        self, ArchiveContainer, ContainerWriter, PATH_CERT_SF, PATH_MANIFEST_MF,
        PATH_UPDATE_BINARY, PATH_UPDATER_SCRIPT,
    },
    package::container::ContainerBuilder,
};
use tempfile::TempDir;

fn write_container(path: &Path, names: &[&str]) {
    let mut writer = ContainerWriter::create(path).unwrap();
    for name in names {
        writer.add_bytes(name, name.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[test]
fn unsigned_container_gets_default_update_binary() {
    let temp_dir = TempDir::new().unwrap();

    let update_dir = temp_dir.path().join("update");
    let script = update_dir.join(PATH_UPDATER_SCRIPT);
    fs::create_dir_all(script.parent().unwrap()).unwrap();
    fs::write(&script, b"ui_print(\"Hello\");\n").unwrap();
    fs::write(update_dir.join("extra.txt"), b"extra").unwrap();

    // Large enough to span several copy buffers.
    let default_binary = temp_dir.path().join("update-binary");
    let binary_data = (0..=255u8).cycle().take(100_000).collect::<Vec<_>>();
    fs::write(&default_binary, &binary_data).unwrap();

    let mut config = Config::new(temp_dir.path());
    config.set_tool(ToolKind::UpdateBinary, &default_binary);

    let output = temp_dir.path().join("u.zip");
    ContainerBuilder::new(&config)
        .build_unsigned(&update_dir, &output, &AtomicBool::new(false))
        .unwrap();

    let mut container = ArchiveContainer::open(&output).unwrap();
    container.validate(false).unwrap();

    assert_eq!(container.read_entry(PATH_UPDATE_BINARY).unwrap(), binary_data);
    assert_eq!(
        container.read_entry(PATH_UPDATER_SCRIPT).unwrap(),
        b"ui_print(\"Hello\");\n",
    );
    assert_eq!(container.read_entry("extra.txt").unwrap(), b"extra");
}

#[test]
fn validation_names_missing_entry() {
    let temp_dir = TempDir::new().unwrap();
    let all = [PATH_UPDATE_BINARY, PATH_UPDATER_SCRIPT, PATH_MANIFEST_MF, PATH_CERT_SF];

    let path = temp_dir.path().join("full.zip");
    write_container(&path, &all);
    let container = ArchiveContainer::open(&path).unwrap();
    container.validate(false).unwrap();
    container.validate(true).unwrap();

    for (i, missing) in all.iter().enumerate() {
        let names = all
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, n)| *n)
            .collect::<Vec<_>>();

        let path = temp_dir.path().join(format!("missing-{i}.zip"));
        write_container(&path, &names);
        let container = ArchiveContainer::open(&path).unwrap();

        assert_matches!(
            container.validate(true),
            Err(container::Error::MissingEntry(name)) if name == *missing
        );

        let unsigned_result = container.validate(false);
        if i < 2 {
            assert_matches!(
                unsigned_result,
                Err(container::Error::MissingEntry(name)) if name == *missing
            );
        } else {
            assert_matches!(unsigned_result, Ok(()));
        }
    }
}
