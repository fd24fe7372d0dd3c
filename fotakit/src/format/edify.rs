// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Emitter for the edify dialect interpreted by the recovery `update-binary`.

use std::collections::{BTreeMap, BTreeSet};

use crate::format::partition::Partition;

/// Maximum width of a generated line before call arguments are wrapped.
const LINE_LENGTH: usize = 80;

/// Low-level script primitives needed to build a flashing script. Paths are
/// device paths.
pub trait ScriptEmitter {
    fn print(&mut self, message: &str);

    fn format(&mut self, partition: &Partition);

    /// Mount the partition unless it is already mounted. The mount is
    /// remembered so that [`Self::unmount_all`] can undo it.
    fn assert_mount(&mut self, partition: &Partition);

    fn delete_files(&mut self, paths: &[&str]);

    fn delete_recursive(&mut self, path: &str);

    fn unpack_package_dir(&mut self, src: &str, dest: &str);

    /// Create symlinks. Each item is a `(target, link_path)` pair.
    fn make_symlinks(&mut self, symlinks: &[(String, String)]);

    fn set_permissions(&mut self, path: &str, uid: u32, gid: u32, mode: u32);

    fn set_permissions_recursive(&mut self, path: &str, uid: u32, gid: u32, dmode: u32, fmode: u32);

    /// Append a raw line to the script.
    fn append_extra(&mut self, line: &str);

    fn unmount_all(&mut self);
}

fn quote(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for c in s.chars() {
        if c == '"' || c == '\\' {
            result.push('\\');
        }
        result.push(c);
    }

    result.push('"');
    result
}

/// Render a function call statement. Arguments are packed greedily onto each
/// line and continuation lines are aligned with the first argument.
pub fn word_wrap(name: &str, args: &[String]) -> String {
    let indent = name.len() + 1;
    let mut out = format!("{name}(");
    let mut line_len = indent;

    if args.is_empty() {
        out.push_str(");");
        return out;
    }

    for (i, arg) in args.iter().enumerate() {
        let terminator = if i + 1 == args.len() { ");" } else { "," };
        let piece_len = arg.len() + terminator.len();

        if i > 0 {
            if line_len + 1 + piece_len > LINE_LENGTH {
                out.push('\n');
                out.push_str(&" ".repeat(indent));
                line_len = indent;
            } else {
                out.push(' ');
                line_len += 1;
            }
        }

        out.push_str(arg);
        out.push_str(terminator);
        line_len += piece_len;
    }

    out
}

#[derive(Debug, Default)]
pub struct EdifyGenerator {
    script: Vec<String>,
    mounts: BTreeSet<&'static str>,
}

impl EdifyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[String] {
        &self.script
    }

    /// Render the script. The output always ends with a newline.
    pub fn finish(self) -> String {
        let mut result = self.script.join("\n");
        result.push('\n');
        result
    }
}

impl ScriptEmitter for EdifyGenerator {
    fn print(&mut self, message: &str) {
        self.script.push(format!("ui_print({});", quote(message)));
    }

    fn format(&mut self, partition: &Partition) {
        let args = [
            quote(partition.fs_type().as_str()),
            quote(partition.fs_type().partition_type()),
            quote(partition.device()),
            partition.fs_size().to_string(),
        ];
        self.script.push(word_wrap("format", &args));
    }

    fn assert_mount(&mut self, partition: &Partition) {
        let mount_point = partition.mount_point();
        let fs_type = partition.fs_type();

        self.print(&format!("Mounting {mount_point}"));
        self.script.push(format!(
            "ifelse(is_mounted({mp}),ui_print(\"Already mounted.\"),assert(mount({}, {}, {}, {mp})));",
            quote(fs_type.as_str()),
            quote(fs_type.partition_type()),
            quote(partition.device()),
            mp = quote(mount_point),
        ));
        self.mounts.insert(mount_point);
    }

    fn delete_files(&mut self, paths: &[&str]) {
        if paths.is_empty() {
            return;
        }

        let args = paths.iter().map(|p| quote(p)).collect::<Vec<_>>();
        self.script.push(word_wrap("delete", &args));
    }

    fn delete_recursive(&mut self, path: &str) {
        self.script.push(word_wrap("delete_recursive", &[quote(path)]));
    }

    fn unpack_package_dir(&mut self, src: &str, dest: &str) {
        self.script
            .push(word_wrap("package_extract_dir", &[quote(src), quote(dest)]));
    }

    fn make_symlinks(&mut self, symlinks: &[(String, String)]) {
        let mut by_target = BTreeMap::<&str, Vec<&str>>::new();

        for (target, link) in symlinks {
            by_target.entry(target.as_str()).or_default().push(link.as_str());
        }

        for (target, mut links) in by_target {
            links.sort_unstable();

            let args = [target]
                .into_iter()
                .chain(links)
                .map(quote)
                .collect::<Vec<_>>();
            self.script.push(word_wrap("symlink", &args));
        }
    }

    fn set_permissions(&mut self, path: &str, uid: u32, gid: u32, mode: u32) {
        self.script
            .push(format!("set_perm({uid}, {gid}, 0{mode:o}, {});", quote(path)));
    }

    fn set_permissions_recursive(&mut self, path: &str, uid: u32, gid: u32, dmode: u32, fmode: u32) {
        self.script.push(format!(
            "set_perm_recursive({uid}, {gid}, 0{dmode:o}, 0{fmode:o}, {});",
            quote(path),
        ));
    }

    fn append_extra(&mut self, line: &str) {
        self.script.push(line.to_owned());
    }

    fn unmount_all(&mut self) {
        for mount_point in &self.mounts {
            self.script.push(format!("unmount({});", quote(mount_point)));
        }
    }
}
