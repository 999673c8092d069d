use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Where per-request staging directories are created. Unset means the
/// system temporary directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn normalize_paths(&mut self, base_dir: &Path) {
        if let Some(dir) = self.staging_dir.as_mut().filter(|dir| dir.is_relative()) {
            *dir = base_dir.join(&*dir);
        }
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        if let Some(dir) = &self.staging_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
