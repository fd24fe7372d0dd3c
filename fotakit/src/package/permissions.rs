// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! File ownership and mode computation for flashing scripts.
//!
//! The ownership of every staged path is looked up with a
//! [`PermissionResolver`]. The [`ItemTree`] then picks, for each directory,
//! the `(uid, gid, dmode, fmode)` tuple matching the most descendants so that
//! the script can use one recursive assignment per subtree and only list the
//! exceptions individually.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{
    config::{Config, ToolKind},
    format::edify::ScriptEmitter,
    tool::{self, Tool},
};

const DEFAULT_DIR_MODE: u32 = 0o755;
const DEFAULT_FILE_MODE: u32 = 0o644;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid fs_config output line: {0:?}")]
    InvalidLine(String),
    #[error("No permissions were resolved for: {0:?}")]
    MissingMetadata(String),
    #[error("Path was never staged: {0:?}")]
    UnknownItem(String),
    #[error(transparent)]
    Tool(#[from] tool::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FsEntry {
    /// Path relative to the filesystem root, without a leading `/`.
    pub name: String,
    pub is_dir: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permission {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// Computes the ownership and mode that each path should have on the device.
pub trait PermissionResolver {
    fn resolve(&self, entries: &[FsEntry]) -> Result<BTreeMap<String, Permission>>;
}

/// Resolver backed by the host `fs_config` tool from the platform build.
pub struct FsConfigResolver {
    tool: Tool,
}

impl FsConfigResolver {
    pub fn new(config: &Config) -> tool::Result<Self> {
        Ok(Self {
            tool: config.tool(ToolKind::FsConfig)?,
        })
    }

    pub fn from_tool(tool: Tool) -> Self {
        Self { tool }
    }
}

/// Parse `name uid gid mode` lines. The mode is octal.
pub fn parse_fs_config(output: &str) -> Result<BTreeMap<String, Permission>> {
    let mut result = BTreeMap::new();

    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let invalid = || Error::InvalidLine(line.to_owned());

        let fields = line.split_whitespace().collect::<Vec<_>>();
        let [name, uid, gid, mode] = fields[..] else {
            return Err(invalid());
        };

        let permission = Permission {
            uid: uid.parse().map_err(|_| invalid())?,
            gid: gid.parse().map_err(|_| invalid())?,
            mode: u32::from_str_radix(mode, 8).map_err(|_| invalid())? & 0o7777,
        };

        result.insert(name.trim_end_matches('/').to_owned(), permission);
    }

    Ok(result)
}

impl PermissionResolver for FsConfigResolver {
    fn resolve(&self, entries: &[FsEntry]) -> Result<BTreeMap<String, Permission>> {
        let mut input = String::new();

        for entry in entries {
            input.push_str(&entry.name);
            if entry.is_dir {
                input.push('/');
            }
            input.push('\n');
        }

        let mut command = self.tool.command();
        let output = tool::run(&mut command, Some(input.as_bytes()))?;

        parse_fs_config(&String::from_utf8_lossy(&output))
    }
}

#[derive(Debug, Default)]
struct Item {
    is_dir: bool,
    children: BTreeSet<String>,
    permission: Option<Permission>,
}

type Subtree = (u32, u32, u32, u32);
type CountKey = (u32, u32, Option<u32>, Option<u32>);

fn parent_name(name: &str) -> &str {
    name.rsplit_once('/').map_or("", |(parent, _)| parent)
}

/// Every path staged into a flashing package, as a tree.
#[derive(Debug, Default)]
pub struct ItemTree {
    items: BTreeMap<String, Item>,
}

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path along with all of its parent directories.
    pub fn insert(&mut self, name: &str, is_dir: bool) {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return;
        }

        let item = self.items.entry(name.to_owned()).or_default();
        item.is_dir |= is_dir;

        let parent = parent_name(name);
        if !parent.is_empty() {
            self.insert(parent, true);
            if let Some(p) = self.items.get_mut(parent) {
                p.children.insert(name.to_owned());
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn entries(&self) -> Vec<FsEntry> {
        self.items
            .iter()
            .map(|(name, item)| FsEntry {
                name: name.clone(),
                is_dir: item.is_dir,
            })
            .collect()
    }

    /// Assign the resolved permissions. Entries for unknown paths are ignored.
    pub fn apply(&mut self, permissions: &BTreeMap<String, Permission>) {
        for (name, item) in &mut self.items {
            if let Some(p) = permissions.get(name) {
                item.permission = Some(*p);
            }
        }
    }

    pub fn resolve(&mut self, resolver: &dyn PermissionResolver) -> Result<()> {
        let permissions = resolver.resolve(&self.entries())?;
        self.apply(&permissions);
        Ok(())
    }

    fn item(&self, name: &str) -> Result<(&Item, Permission)> {
        let item = self
            .items
            .get(name)
            .ok_or_else(|| Error::UnknownItem(name.to_owned()))?;
        let permission = item
            .permission
            .ok_or_else(|| Error::MissingMetadata(name.to_owned()))?;

        Ok((item, permission))
    }

    /// Count the metadata of `name` and all of its descendants, recording the
    /// most common tuple for every directory in `best`.
    fn count_metadata(
        &self,
        name: &str,
        best: &mut BTreeMap<String, Subtree>,
    ) -> Result<BTreeMap<CountKey, usize>> {
        let (item, permission) = self.item(name)?;

        let mut counts = BTreeMap::new();
        counts.insert((permission.uid, permission.gid, Some(permission.mode), None), 1);

        for child_name in &item.children {
            let (child, child_perm) = self.item(child_name)?;

            if child.is_dir {
                for (key, count) in self.count_metadata(child_name, best)? {
                    *counts.entry(key).or_insert(0) += count;
                }
            } else {
                *counts
                    .entry((child_perm.uid, child_perm.gid, None, Some(child_perm.mode)))
                    .or_insert(0) += 1;
            }
        }

        let mut owners = BTreeMap::<(u32, u32), usize>::new();
        for ((uid, gid, _, _), count) in &counts {
            *owners.entry((*uid, *gid)).or_insert(0) += count;
        }

        // Ties go to the largest owner.
        let owner = owners
            .iter()
            .max_by_key(|(k, v)| (**v, **k))
            .map_or((0, 0), |(k, _)| *k);

        // Ties go to the lowest mode.
        let mut best_dmode = (0, DEFAULT_DIR_MODE);
        let mut best_fmode = (0, DEFAULT_FILE_MODE);

        for (&(uid, gid, dmode, fmode), &count) in &counts {
            if (uid, gid) != owner {
                continue;
            }
            if let Some(mode) = dmode {
                if count > best_dmode.0 {
                    best_dmode = (count, mode);
                }
            }
            if let Some(mode) = fmode {
                if count > best_fmode.0 {
                    best_fmode = (count, mode);
                }
            }
        }

        best.insert(name.to_owned(), (owner.0, owner.1, best_dmode.1, best_fmode.1));

        Ok(counts)
    }

    /// Emit the permission assignments for the tree rooted at `root`.
    pub fn emit_permissions(&self, root: &str, emitter: &mut dyn ScriptEmitter) -> Result<()> {
        let root = root.trim_matches('/');
        let (item, _) = self.item(root)?;

        let mut best = BTreeMap::new();
        if item.is_dir {
            self.count_metadata(root, &mut best)?;
        }

        self.emit_item(root, None, &best, emitter)
    }

    fn emit_item(
        &self,
        name: &str,
        current: Option<Subtree>,
        best: &BTreeMap<String, Subtree>,
        emitter: &mut dyn ScriptEmitter,
    ) -> Result<()> {
        let (item, p) = self.item(name)?;
        let path = format!("/{name}");

        if !item.is_dir {
            if current.is_none_or(|c| (p.uid, p.gid, p.mode) != (c.0, c.1, c.3)) {
                emitter.set_permissions(&path, p.uid, p.gid, p.mode);
            }
            return Ok(());
        }

        let mut current = current;
        if let Some(&subtree) = best.get(name) {
            if current != Some(subtree) {
                let (uid, gid, dmode, fmode) = subtree;
                emitter.set_permissions_recursive(&path, uid, gid, dmode, fmode);
                current = Some(subtree);
            }
        }

        if current.is_none_or(|c| (p.uid, p.gid, p.mode) != (c.0, c.1, c.2)) {
            emitter.set_permissions(&path, p.uid, p.gid, p.mode);
        }

        for child in &item.children {
            self.emit_item(child, current, best, emitter)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use crate::format::edify::EdifyGenerator;

    use super::*;

    struct FixedResolver(&'static str);

    impl PermissionResolver for FixedResolver {
        fn resolve(&self, _entries: &[FsEntry]) -> Result<BTreeMap<String, Permission>> {
            parse_fs_config(self.0)
        }
    }

    fn tree() -> ItemTree {
        let mut tree = ItemTree::new();
        tree.insert("system/bin/sh", false);
        tree.insert("system/bin/ls", false);
        tree.insert("system/bin/su", false);
        tree.insert("system/b2g/b2g", false);
        tree.insert("system/build.prop", false);
        tree
    }

    #[test]
    fn parents_are_registered() {
        let tree = tree();

        assert_eq!(
            tree.entries(),
            [
                ("system", true),
                ("system/b2g", true),
                ("system/b2g/b2g", false),
                ("system/bin", true),
                ("system/bin/ls", false),
                ("system/bin/sh", false),
                ("system/bin/su", false),
                ("system/build.prop", false),
            ]
            .map(|(name, is_dir)| FsEntry {
                name: name.to_owned(),
                is_dir,
            }),
        );
    }

    #[test]
    fn parse_output() {
        let parsed = parse_fs_config("system/bin/ 0 2000 755\nsystem/bin/sh 0 2000 0755\n\n").unwrap();

        assert_eq!(
            parsed["system/bin"],
            Permission {
                uid: 0,
                gid: 2000,
                mode: 0o755
            },
        );
        assert!(parsed.contains_key("system/bin/sh"));

        assert_matches!(parse_fs_config("system 0 0\n"), Err(Error::InvalidLine(_)));
        assert_matches!(parse_fs_config("system 0 0 999\n"), Err(Error::InvalidLine(_)));
    }

    #[test]
    fn recursive_with_exceptions() {
        let mut tree = tree();
        tree.resolve(&FixedResolver(
            "system 0 0 755\n\
             system/b2g 0 0 755\n\
             system/b2g/b2g 0 0 755\n\
             system/bin 0 2000 755\n\
             system/bin/ls 0 2000 755\n\
             system/bin/sh 0 2000 755\n\
             system/bin/su 0 0 6755\n\
             system/build.prop 0 0 644\n",
        ))
        .unwrap();

        let mut generator = EdifyGenerator::new();
        tree.emit_permissions("system", &mut generator).unwrap();

        assert_eq!(
            generator.lines(),
            [
                r#"set_perm_recursive(0, 0, 0755, 0644, "/system");"#,
                r#"set_perm_recursive(0, 0, 0755, 0755, "/system/b2g");"#,
                r#"set_perm_recursive(0, 2000, 0755, 0755, "/system/bin");"#,
                r#"set_perm(0, 0, 06755, "/system/bin/su");"#,
            ],
        );
    }

    #[test]
    fn unresolved_items_are_errors() {
        let mut tree = tree();
        tree.resolve(&FixedResolver("system 0 0 755\n")).unwrap();

        let mut generator = EdifyGenerator::new();
        assert_matches!(
            tree.emit_permissions("system", &mut generator),
            Err(Error::MissingMetadata(_))
        );
        assert_matches!(
            tree.emit_permissions("data", &mut generator),
            Err(Error::UnknownItem(n)) if n == "data"
        );
    }
}
