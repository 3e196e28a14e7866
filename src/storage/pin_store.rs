use crate::common::{DoorError, Result};
use crate::core::access::PinValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default)]
struct AuthConfigFile {
    #[serde(default)]
    authorized_pins: Vec<String>,
}

/// Authorized PINs backed by `auth_config.json`.
pub struct PinStore {
    path: PathBuf,
    pins: BTreeSet<String>,
}

impl PinStore {
    /// Missing file yields an empty set; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("PIN file {} not found - no PINs authorized", path.display());
            return Ok(Self::empty(path));
        }

        let contents = fs::read_to_string(path)?;
        let file: AuthConfigFile = serde_json::from_str(&contents).map_err(|e| {
            DoorError::Config(format!("Invalid PIN file {}: {}", path.display(), e))
        })?;

        let mut pins = BTreeSet::new();
        for pin in file.authorized_pins {
            if Self::is_well_formed(&pin) {
                pins.insert(pin);
            } else {
                tracing::warn!("Ignoring malformed PIN entry in {}", path.display());
            }
        }

        tracing::info!("Loaded {} authorized pins", pins.len());
        Ok(Self { path: path.to_path_buf(), pins })
    }

    /// Like `load`, but a broken file is only a warning.
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("{} - continuing with no authorized PINs", e);
            Self::empty(path)
        })
    }

    pub fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), pins: BTreeSet::new() }
    }

    pub fn is_well_formed(pin: &str) -> bool {
        !pin.is_empty() && pin.chars().all(|c| c.is_ascii_digit())
    }

    /// Returns false if the PIN was already present.
    pub fn add(&mut self, pin: &str) -> Result<bool> {
        if !Self::is_well_formed(pin) {
            return Err(DoorError::InvalidCommand(format!(
                "PIN must be digits only, got '{}'",
                pin
            )));
        }
        let added = self.pins.insert(pin.to_string());
        if !added {
            tracing::warn!("PIN already exists");
        }
        Ok(added)
    }

    pub fn remove(&mut self, pin: &str) -> bool {
        self.pins.remove(pin)
    }

    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.pins.iter().map(String::as_str)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = AuthConfigFile { authorized_pins: self.pins.iter().cloned().collect() };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl PinValidator for PinStore {
    fn is_valid_pin(&self, pin: &str) -> bool {
        self.pins.contains(pin)
    }

    fn len(&self) -> usize {
        self.pins.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_auth_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth_config.json");
        fs::write(&path, r#"{"authorized_pins": ["1234", "9876", "12a4"]}"#).unwrap();

        let store = PinStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.is_valid_pin("1234"));
        assert!(!store.is_valid_pin("12a4"));
        assert!(!store.is_valid_pin("0000"));
    }

    #[test]
    fn test_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = PinStore::load(&temp_dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
        assert!(!store.is_valid_pin("1234"));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auth_config.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(PinStore::load(&path), Err(DoorError::Config(_))));
        assert!(PinStore::load_or_empty(&path).is_empty());
    }

    #[test]
    fn test_add_remove_save() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("auth_config.json");

        let mut store = PinStore::load(&path).unwrap();
        assert!(store.add("4321").unwrap());
        assert!(!store.add("4321").unwrap());
        assert!(store.add("x1").is_err());
        store.save().unwrap();

        let mut reloaded = PinStore::load(&path).unwrap();
        assert_eq!(reloaded.list().collect::<Vec<_>>(), vec!["4321"]);
        assert!(reloaded.remove("4321"));
        assert!(!reloaded.remove("4321"));
    }
}
