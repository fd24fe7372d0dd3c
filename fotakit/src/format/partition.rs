// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{fmt, str::FromStr};

use thiserror::Error;

pub const MOUNT_POINT_SYSTEM: &str = "/system";
pub const MOUNT_POINT_DATA: &str = "/data";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unsupported filesystem type: {0:?}")]
    UnknownFsType(String),
}

/// Filesystem types understood by the recovery environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FsType {
    Yaffs2,
    Mtd,
    Ext4,
    Emmc,
    Vfat,
}

impl FsType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yaffs2 => "yaffs2",
            Self::Mtd => "mtd",
            Self::Ext4 => "ext4",
            Self::Emmc => "emmc",
            Self::Vfat => "vfat",
        }
    }

    /// The recovery partition type backing this filesystem.
    pub fn partition_type(self) -> &'static str {
        match self {
            Self::Yaffs2 | Self::Mtd => "MTD",
            Self::Ext4 | Self::Emmc | Self::Vfat => "EMMC",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaffs2" => Ok(Self::Yaffs2),
            "mtd" => Ok(Self::Mtd),
            "ext4" => Ok(Self::Ext4),
            "emmc" => Ok(Self::Emmc),
            "vfat" => Ok(Self::Vfat),
            _ => Err(Error::UnknownFsType(s.to_owned())),
        }
    }
}

/// A mountable target on the device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    fs_type: FsType,
    mount_point: &'static str,
    device: String,
    /// 0 means the size is left to the formatter.
    fs_size: u64,
}

impl Partition {
    pub fn system(fs_type: FsType, device: impl Into<String>) -> Self {
        Self {
            fs_type,
            mount_point: MOUNT_POINT_SYSTEM,
            device: device.into(),
            fs_size: 0,
        }
    }

    pub fn data(fs_type: FsType, device: impl Into<String>) -> Self {
        Self {
            fs_type,
            mount_point: MOUNT_POINT_DATA,
            device: device.into(),
            fs_size: 0,
        }
    }

    pub fn with_fs_size(self, fs_size: u64) -> Self {
        Self { fs_size, ..self }
    }

    pub fn fs_type(&self) -> FsType {
        self.fs_type
    }

    pub fn mount_point(&self) -> &'static str {
        self.mount_point
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn fs_size(&self) -> u64 {
        self.fs_size
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn fs_types() {
        assert_eq!("ext4".parse::<FsType>().unwrap().partition_type(), "EMMC");
        assert_eq!("yaffs2".parse::<FsType>().unwrap().partition_type(), "MTD");
        assert_matches!("btrfs".parse::<FsType>(), Err(Error::UnknownFsType(s)) if s == "btrfs");
    }

    #[test]
    fn factories() {
        let system = Partition::system(FsType::Ext4, "/dev/block/mmcblk0p1");
        assert_eq!(system.mount_point(), "/system");
        assert_eq!(system.fs_size(), 0);

        let data = Partition::data(FsType::Ext4, "/dev/block/mmcblk0p2").with_fs_size(4096);
        assert_eq!(data.mount_point(), "/data");
        assert_eq!(data.fs_size(), 4096);
    }
}
