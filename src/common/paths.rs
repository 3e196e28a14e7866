use std::path::{Path, PathBuf};
use directories::ProjectDirs;
use crate::common::{Config, DevMode, DoorError, Result};

pub const CONFIG_FILE_NAME: &str = "door-lock.toml";

pub fn system_config_file() -> PathBuf {
    PathBuf::from("/etc/doorsup").join(CONFIG_FILE_NAME)
}

pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("doorsup").join(CONFIG_FILE_NAME))
}

/// Explicit path, then dev dir, then the user's config, then /etc.
pub fn resolve_config_file(explicit: Option<&Path>, dev_mode: &DevMode) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = dev_mode.config_file() {
        return path;
    }
    if let Some(path) = user_config_file() {
        if path.exists() {
            return path;
        }
    }
    system_config_file()
}

/// Relative PIN and user files live next to the config file.
pub fn resolve_store_file(config_file: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        return file.to_path_buf();
    }
    match config_file.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(file),
        _ => file.to_path_buf(),
    }
}

pub fn resolve_data_dir(config: &Config, dev_mode: &DevMode) -> Result<PathBuf> {
    if let Some(dir) = &config.storage.data_dir {
        return Ok(dir.clone());
    }
    if let Some(dir) = dev_mode.data_dir() {
        return Ok(dir);
    }
    let dirs = ProjectDirs::from("com", "doorsup", "DoorSup")
        .ok_or_else(|| DoorError::Storage("Failed to get project dirs".into()))?;
    Ok(dirs.data_dir().to_path_buf())
}
