use crate::common::{DoorError, Result};
use crate::core::access::UserValidator;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Default)]
struct UsersFile {
    #[serde(default)]
    authorized_users: Vec<String>,
}

/// Names the face service may recognize that are also allowed in.
pub struct UserStore {
    path: PathBuf,
    users: BTreeSet<String>,
}

impl UserStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("User list {} not found - no users authorized", path.display());
            return Ok(Self::empty(path));
        }

        let contents = fs::read_to_string(path)?;
        let file: UsersFile = serde_json::from_str(&contents).map_err(|e| {
            DoorError::Config(format!("Invalid user list {}: {}", path.display(), e))
        })?;

        let users: BTreeSet<String> = file
            .authorized_users
            .into_iter()
            .filter(|name| {
                let ok = Self::is_well_formed(name);
                if !ok {
                    tracing::warn!(
                        "Ignoring malformed user entry {:?} in {}",
                        name,
                        path.display()
                    );
                }
                ok
            })
            .collect();

        tracing::info!("Loaded {} authorized users", users.len());
        Ok(Self { path: path.to_path_buf(), users })
    }

    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("{} - continuing with no authorized users", e);
            Self::empty(path)
        })
    }

    pub fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), users: BTreeSet::new() }
    }

    /// Non-empty, no surrounding whitespace, no control characters.
    pub fn is_well_formed(name: &str) -> bool {
        !name.is_empty() && name.trim() == name && !name.chars().any(char::is_control)
    }

    pub fn add(&mut self, name: &str) -> Result<bool> {
        if !Self::is_well_formed(name) {
            return Err(DoorError::InvalidCommand(format!("Invalid user name {:?}", name)));
        }
        let added = self.users.insert(name.to_string());
        if !added {
            tracing::warn!("User {} already authorized", name);
        }
        Ok(added)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.users.remove(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = UsersFile { authorized_users: self.users.iter().cloned().collect() };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }
}

impl UserValidator for UserStore {
    fn is_authorized_user(&self, identity: &str) -> bool {
        self.users.contains(identity)
    }

    fn len(&self) -> usize {
        self.users.len()
    }
}
