// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

pub mod container;
pub mod delta;
pub mod flash;
pub mod fota;
pub mod manifest;
pub mod permissions;
