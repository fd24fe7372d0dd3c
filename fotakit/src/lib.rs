// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Since fotakit is primarily an application and not a library, the semver
//! versioning covers the CLI only. All Rust APIs can change at any time, even
//! in patch releases.
//!
//! The CLI source files use concrete types wherever possible for simplicity,
//! while the "library"-style source files are written against the trait seams
//! in [`device`], [`format::edify`], [`format::mar`], and
//! [`package::permissions`].

pub mod cli;
pub mod config;
pub mod device;
pub mod format;
pub mod harness;
pub mod package;
pub mod stream;
pub mod tool;
pub mod util;
