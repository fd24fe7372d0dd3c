// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

pub mod container;
pub mod edify;
pub mod mar;
pub mod partition;
pub mod update_xml;
pub mod wrapped;
