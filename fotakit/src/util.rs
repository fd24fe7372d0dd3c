// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    path::{Component, Path},
};

/// A value that is displayed via its [`fmt::Debug`] representation, captured
/// at construction time. This is mainly used for storing [`std::process::Command`]
/// instances in error types without keeping the command alive.
#[derive(Clone)]
pub struct DebugString(String);

impl DebugString {
    pub fn new<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        Self(format!("{value:?}"))
    }
}

impl fmt::Debug for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for DebugString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Convert `path`, which must be inside `base`, to a relative path that always
/// uses `/` as the separator, regardless of the host's conventions. Returns
/// [`None`] if `path` is not inside `base`, if `path` is `base` itself, or if
/// any component is not valid UTF-8.
pub fn posix_relative_path(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut result = String::new();

    for component in relative.components() {
        match component {
            Component::Normal(c) => {
                if !result.is_empty() {
                    result.push('/');
                }
                result.push_str(c.to_str()?);
            }
            Component::CurDir => {}
            _ => return None,
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

/// Get the final component of a path as a string, falling back to a lossy
/// conversion for non-UTF-8 names.
pub fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
