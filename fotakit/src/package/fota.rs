// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

use crate::{
    format::{
        container::{self, ArchiveContainer},
        mar::FOTA_UPDATE_ZIP,
    },
    package::delta::{self, DeltaPackager},
};

/// Empty marker that tells the update client that the MAR is a complete
/// update.
pub const PRECOMPLETE: &str = "precomplete";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to create staging directory")]
    StageDir(#[source] io::Error),
    #[error("Failed to stage file: {0:?}")]
    Stage(PathBuf, #[source] io::Error),
    #[error(transparent)]
    Container(#[from] container::Error),
    #[error(transparent)]
    Delta(#[from] delta::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Wraps a signed recovery update container in a complete MAR so that it can
/// be delivered through the regular update client. The staging directory is
/// removed when this is dropped.
pub struct FotaEnvelope {
    packager: DeltaPackager,
    stage_dir: TempDir,
}

impl FotaEnvelope {
    pub fn new(packager: DeltaPackager) -> Result<Self> {
        let stage_dir = TempDir::new().map_err(Error::StageDir)?;

        Ok(Self {
            packager,
            stage_dir,
        })
    }

    pub fn build(&self, signed_zip: &Path, output: &Path) -> Result<()> {
        ArchiveContainer::open(signed_zip)?.validate(true)?;

        let mar_dir = self.stage_dir.path().join("mar");
        fs::create_dir_all(&mar_dir).map_err(|e| Error::Stage(mar_dir.clone(), e))?;

        let update_zip = mar_dir.join(FOTA_UPDATE_ZIP);
        fs::copy(signed_zip, &update_zip).map_err(|e| Error::Stage(update_zip, e))?;

        let precomplete = mar_dir.join(PRECOMPLETE);
        File::create(&precomplete).map_err(|e| Error::Stage(precomplete, e))?;

        info!("Wrapping {signed_zip:?} in FOTA MAR: {output:?}");
        self.packager.build_full(&mar_dir, output)?;

        Ok(())
    }
}
