//! Storage locations for uploaded inputs and produced artifacts.

use std::path::PathBuf;

use crate::error::Result;

const DATA_DIR_VAR: &str = "DECLARA_DATA_DIR";

#[derive(Debug, Clone)]
pub struct StoragePaths {
    pub uploads_dir: PathBuf,
    pub downloads_dir: PathBuf,
}

impl StoragePaths {
    /// Resolves the storage root from `DECLARA_DATA_DIR`, defaulting to
    /// `./data` next to the process.
    pub fn from_env() -> Self {
        let root = std::env::var(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        Self::under(root)
    }

    pub fn under(root: PathBuf) -> Self {
        Self {
            uploads_dir: root.join("uploads"),
            downloads_dir: root.join("downloads"),
        }
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.uploads_dir)?;
        std::fs::create_dir_all(&self.downloads_dir)?;
        Ok(())
    }
}
