use std::path::PathBuf;
use std::fs;
use crate::common::error::Result;

/// Keeps all runtime state under `./dev_data` instead of system paths.
#[derive(Debug, Clone)]
pub struct DevMode {
    enabled: bool,
    base_dir: PathBuf,
}

impl DevMode {
    pub fn new(enabled: bool) -> Result<Self> {
        Self::with_base_dir(enabled, PathBuf::from("./dev_data"))
    }

    pub fn with_base_dir(enabled: bool, base_dir: PathBuf) -> Result<Self> {
        if enabled {
            fs::create_dir_all(&base_dir)?;
            fs::create_dir_all(base_dir.join("data"))?;
            fs::create_dir_all(base_dir.join("config"))?;

            tracing::info!("Development mode enabled - data will be saved to: {}",
                           base_dir.display());
        }

        Ok(Self { enabled, base_dir })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("data"))
    }

    pub fn config_file(&self) -> Option<PathBuf> {
        self.enabled.then(|| self.base_dir.join("config").join(super::paths::CONFIG_FILE_NAME))
    }
}
