// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Flashing packages that rewrite `/system` from recovery, either completely
//! (formatting the partitions first) or partially (replacing a listed set of
//! files).

use std::{
    collections::BTreeSet,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
};

use clap::ValueEnum;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::{Config, ToolKind},
    format::{
        container::{self as zip_container, ContainerWriter},
        edify::{EdifyGenerator, ScriptEmitter},
        partition::{MOUNT_POINT_SYSTEM, Partition},
    },
    package::{
        container::{self, ContainerBuilder},
        permissions::{self, ItemTree, PermissionResolver},
    },
    tool,
};

/// Name of the payload directory inside the package and on the device.
const SYSTEM: &str = "system";
const STALE_LIBDMD: &str = "/system/b2g/libdmd.so";
const STALE_UPDATE_DIR: &str = "/system/b2g/updated";
const RESTORE_BACKUP: &str =
    r#"if greater_than_int(run_program("/system/bin/mv", "/system/b2g.bak", "/system/b2g"), 0) then"#;
const RESTORE_BACKUP_ELSE: &str = r#"else ui_print("Restoring previous stale update."); endif;"#;

#[derive(Debug, Error)]
pub enum Error {
    #[error("A partial FOTA requires a non-empty file list")]
    NoIncludeFiles,
    #[error("System directory doesn't exist: {0:?}")]
    MissingSystemDir(PathBuf),
    #[error("Failed to create temporary file")]
    TempFile(#[source] io::Error),
    #[error(transparent)]
    Format(#[from] zip_container::Error),
    #[error(transparent)]
    Container(#[from] container::Error),
    #[error(transparent)]
    Permissions(#[from] permissions::Error),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FotaType {
    Full,
    Partial,
}

impl FotaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for FotaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(path: &str) -> Option<String> {
    let path = path.trim().trim_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_owned())
    }
}

/// What a flashing package should do. Paths are relative to the device root
/// (eg. `system/b2g/libxul.so`).
#[derive(Clone, Debug)]
pub struct FlashPlan {
    mode: FotaType,
    /// System first, then data.
    partitions: Vec<Partition>,
    wipe_dirs: Vec<String>,
    include_files: BTreeSet<String>,
}

impl FlashPlan {
    /// Wipe dirs and included files only apply to partial updates and are
    /// ignored otherwise.
    pub fn new(
        mode: FotaType,
        system: Partition,
        data: Partition,
        wipe_dirs: impl IntoIterator<Item = String>,
        include_files: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let (wipe_dirs, include_files) = match mode {
            FotaType::Full => (vec![], BTreeSet::new()),
            FotaType::Partial => (
                wipe_dirs.into_iter().filter_map(|d| normalize(&d)).collect(),
                include_files
                    .into_iter()
                    .filter_map(|f| normalize(&f))
                    .collect::<BTreeSet<_>>(),
            ),
        };

        if mode == FotaType::Partial && include_files.is_empty() {
            return Err(Error::NoIncludeFiles);
        }

        Ok(Self {
            mode,
            partitions: vec![system, data],
            wipe_dirs,
            include_files,
        })
    }

    /// Whether the staged path should be included in the package.
    pub fn includes(&self, name: &str) -> bool {
        self.mode == FotaType::Full || self.include_files.contains(name)
    }

    /// Partitions that the script needs mounted.
    fn touched_partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(|p| {
            if self.mode == FotaType::Full || p.mount_point() == MOUNT_POINT_SYSTEM {
                return true;
            }

            let name = p.mount_point().trim_start_matches('/');
            self.wipe_dirs
                .iter()
                .chain(&self.include_files)
                .any(|path| path.split('/').next() == Some(name))
        })
    }
}

/// Paths selected from the system directory while writing the package.
#[derive(Debug, Default)]
pub struct StagedPayload {
    pub tree: ItemTree,
    /// `(target, link_path)` pairs. Symlinks are recreated by the script.
    pub symlinks: Vec<(String, String)>,
}

impl StagedPayload {
    /// Decide whether to write the entry at `path` (named `name` inside the
    /// package). Every selected path is registered in the item tree. Symlinks
    /// are recorded instead of written.
    pub fn select(&mut self, plan: &FlashPlan, path: &Path, name: &str) -> io::Result<bool> {
        if !plan.includes(name) {
            return Ok(false);
        }

        let metadata = path.symlink_metadata()?;
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(path)?;
            debug!("Recording symlink: {name} -> {target:?}");

            self.tree.insert(name, false);
            self.symlinks
                .push((target.to_string_lossy().into_owned(), format!("/{name}")));

            return Ok(false);
        }

        self.tree.insert(name, metadata.is_dir());

        Ok(true)
    }
}

/// Emit the flashing script for `plan` into `emitter`. The permissions of the
/// staged paths are resolved through `resolver`.
pub fn build_script(
    plan: &FlashPlan,
    payload: &mut StagedPayload,
    resolver: &dyn PermissionResolver,
    emitter: &mut dyn ScriptEmitter,
) -> Result<()> {
    let partial = plan.mode == FotaType::Partial;

    for dir in &plan.wipe_dirs {
        payload.tree.insert(dir, true);
    }
    payload.tree.insert(SYSTEM, true);

    emitter.print(&format!("Starting B2G FOTA: {}", plan.mode));

    if !partial {
        for partition in &plan.partitions {
            emitter.format(partition);
        }
    }

    for partition in plan.touched_partitions() {
        emitter.assert_mount(partition);
    }

    if partial {
        for dir in &plan.wipe_dirs {
            emitter.print(&format!("Cleaning {dir}"));
            emitter.delete_recursive(&format!("/{dir}"));
        }

        emitter.append_extra(RESTORE_BACKUP);
        emitter.print("No previous stale update.");
    }

    emitter.print("Remove stale libdmd.so");
    emitter.delete_files(&[STALE_LIBDMD]);

    emitter.print("Remove stale update");
    emitter.delete_recursive(STALE_UPDATE_DIR);

    emitter.print("Extracting files to /system");
    emitter.unpack_package_dir(SYSTEM, MOUNT_POINT_SYSTEM);

    emitter.print("Creating symlinks");
    emitter.make_symlinks(&payload.symlinks);

    emitter.print("Setting file permissions");
    payload.tree.resolve(resolver)?;

    if partial {
        for dir in &plan.wipe_dirs {
            payload.tree.emit_permissions(dir, emitter)?;
        }

        // Files outside of the wiped directories still need their own
        // assignments.
        for file in &plan.include_files {
            let covered = plan.wipe_dirs.iter().any(|d| {
                file.strip_prefix(d.as_str())
                    .is_some_and(|r| r.is_empty() || r.starts_with('/'))
            });

            if !covered && payload.tree.contains(file) {
                payload.tree.emit_permissions(file, emitter)?;
            }
        }

        emitter.append_extra(RESTORE_BACKUP_ELSE);
    } else {
        payload.tree.emit_permissions(SYSTEM, emitter)?;
    }

    emitter.print("Unmounting ...");
    emitter.unmount_all();

    Ok(())
}

/// Builds signed flashing packages.
pub struct FlashPackageBuilder<'a> {
    config: &'a Config,
    plan: FlashPlan,
    resolver: &'a dyn PermissionResolver,
}

impl<'a> FlashPackageBuilder<'a> {
    pub fn new(config: &'a Config, plan: FlashPlan, resolver: &'a dyn PermissionResolver) -> Self {
        Self {
            config,
            plan,
            resolver,
        }
    }

    pub fn build(
        &self,
        system_dir: &Path,
        public_key: &Path,
        private_key: &Path,
        output: &Path,
        cancel_signal: &AtomicBool,
    ) -> Result<()> {
        if !system_dir.is_dir() {
            return Err(Error::MissingSystemDir(system_dir.to_owned()));
        }

        let update_binary = self.config.tool(ToolKind::UpdateBinary)?;

        let unsigned = NamedTempFile::new().map_err(Error::TempFile)?;
        let mut writer = ContainerWriter::create(unsigned.path())?;
        let mut payload = StagedPayload::default();

        info!("Staging {} FOTA from {system_dir:?}", self.plan.mode);

        container::write_tree(
            &mut writer,
            system_dir,
            Some(SYSTEM),
            cancel_signal,
            |path, name| payload.select(&self.plan, path, name),
        )?;

        let mut generator = EdifyGenerator::new();
        build_script(&self.plan, &mut payload, self.resolver, &mut generator)?;

        writer.add_bytes(zip_container::PATH_UPDATER_SCRIPT, generator.finish().as_bytes())?;
        writer.add_file(
            zip_container::PATH_UPDATE_BINARY,
            update_binary.path(),
            cancel_signal,
        )?;
        writer.finish()?;

        ContainerBuilder::new(self.config).sign(
            unsigned.path(),
            public_key,
            private_key,
            output,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use crate::{
        format::partition::FsType,
        package::permissions::{FsEntry, Permission},
    };

    use super::*;

    /// Gives every path root ownership.
    struct RootResolver;

    impl PermissionResolver for RootResolver {
        fn resolve(&self, entries: &[FsEntry]) -> permissions::Result<BTreeMap<String, Permission>> {
            Ok(entries
                .iter()
                .map(|e| {
                    let mode = if e.is_dir { 0o755 } else { 0o644 };
                    (e.name.clone(), Permission { uid: 0, gid: 0, mode })
                })
                .collect())
        }
    }

    fn partitions() -> (Partition, Partition) {
        (
            Partition::system(FsType::Ext4, "/dev/block/mmcblk0p1"),
            Partition::data(FsType::Ext4, "/dev/block/mmcblk0p2"),
        )
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn partial_requires_files() {
        let (system, data) = partitions();

        assert_matches!(
            FlashPlan::new(FotaType::Partial, system, data, strings(&["system/b2g"]), vec![]),
            Err(Error::NoIncludeFiles)
        );
    }

    #[test]
    fn full_script_order() {
        let (system, data) = partitions();
        let plan = FlashPlan::new(FotaType::Full, system, data, vec![], vec![]).unwrap();

        let mut payload = StagedPayload::default();
        payload.tree.insert("system/b2g/b2g", false);
        payload
            .symlinks
            .push(("toolbox".to_owned(), "/system/bin/ls".to_owned()));

        let mut generator = EdifyGenerator::new();
        build_script(&plan, &mut payload, &RootResolver, &mut generator).unwrap();

        let lines = generator.lines();
        let position = |needle: &str| {
            lines
                .iter()
                .position(|l| l.starts_with(needle))
                .unwrap_or_else(|| panic!("{needle:?} not found in {lines:#?}"))
        };

        assert_eq!(lines[0], r#"ui_print("Starting B2G FOTA: full");"#);
        assert_eq!(lines[1], r#"format("ext4", "EMMC", "/dev/block/mmcblk0p1", 0);"#);
        assert_eq!(lines[2], r#"format("ext4", "EMMC", "/dev/block/mmcblk0p2", 0);"#);

        let order = [
            r#"ifelse(is_mounted("/system")"#,
            r#"ifelse(is_mounted("/data")"#,
            r#"delete_recursive("/system/b2g/updated");"#,
            r#"package_extract_dir("system", "/system");"#,
            r#"symlink("toolbox", "/system/bin/ls");"#,
            r#"set_perm_recursive(0, 0, 0755, 0644, "/system");"#,
            r#"unmount("/data");"#,
            r#"unmount("/system");"#,
        ]
        .map(position);
        assert!(order.is_sorted(), "Wrong order: {lines:#?}");

        assert!(!lines.iter().any(|l| l.contains("greater_than_int")));
    }

    #[test]
    fn partial_script() {
        let (system, data) = partitions();
        let plan = FlashPlan::new(
            FotaType::Partial,
            system,
            data,
            strings(&["system/b2g", ""]),
            strings(&["system/b2g/libxul.so", "system/etc/hosts", "  "]),
        )
        .unwrap();

        assert!(plan.includes("system/b2g/libxul.so"));
        assert!(!plan.includes("system/b2g/b2g"));

        let mut payload = StagedPayload::default();
        payload.tree.insert("system/b2g/libxul.so", false);
        payload.tree.insert("system/etc/hosts", false);

        let mut generator = EdifyGenerator::new();
        build_script(&plan, &mut payload, &RootResolver, &mut generator).unwrap();
        let script = generator.finish();

        assert!(!script.contains("format("));
        assert!(!script.contains(r#"is_mounted("/data")"#));
        assert!(script.contains(r#"is_mounted("/system")"#));

        let cleaning = script.find(r#"delete_recursive("/system/b2g");"#).unwrap();
        let restore = script.find(RESTORE_BACKUP).unwrap();
        let extract = script.find("package_extract_dir").unwrap();
        let recursive = script
            .find(r#"set_perm_recursive(0, 0, 0755, 0644, "/system/b2g");"#)
            .unwrap();
        let hosts = script.find(r#"set_perm(0, 0, 0644, "/system/etc/hosts");"#).unwrap();
        let restore_else = script.find(RESTORE_BACKUP_ELSE).unwrap();
        let unmount = script.find(r#"unmount("/system");"#).unwrap();

        assert!(cleaning < restore);
        assert!(restore < extract);
        assert!(extract < recursive);
        assert!(recursive < hosts);
        assert!(hosts < restore_else);
        assert!(restore_else < unmount);
        assert!(!script.contains(r#"set_perm_recursive(0, 0, 0755, 0644, "/system");"#));
    }
}
