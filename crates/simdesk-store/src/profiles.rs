use crate::StoreError;
use serde::{Deserialize, Serialize};
use simdesk_core::{Endpoint, EndpointError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Saved launch settings: where the record files live and which endpoint
/// the simulator binds to. The port is kept as entered, as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub data_dir: PathBuf,
    pub ip: String,
    pub port: String,
}

impl Profile {
    /// Composes and validates the supervisor's bind endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        let port: u16 = self
            .port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(self.port.clone()))?;
        Endpoint::new(&self.ip, port)
    }
}

/// Named profiles persisted as a single JSON document (`profiles.json`).
pub struct ProfileStore {
    path: PathBuf,
    profiles: BTreeMap<String, Profile>,
}

impl ProfileStore {
    /// Missing or corrupt profile files degrade to an empty set.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let profiles = match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(path = %path.display(), %err, "ignoring unreadable profiles file");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self { path, profiles }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn save_profile(&mut self, name: &str, profile: Profile) -> Result<(), StoreError> {
        self.profiles.insert(name.to_string(), profile);
        self.persist()
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<(), StoreError> {
        if self.profiles.remove(name).is_none() {
            return Err(StoreError::ProfileNotFound(name.to_string()));
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&self.profiles)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn lab_profile() -> Profile {
        Profile {
            data_dir: PathBuf::from("/srv/snmp-lab"),
            ip: "127.0.0.1".to_string(),
            port: "1161".to_string(),
        }
    }

    #[test]
    fn save_and_reload_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let mut store = ProfileStore::open(&path);
        store.save_profile("lab", lab_profile()).unwrap();

        let reloaded = ProfileStore::open(&path);
        assert_eq!(reloaded.names(), vec!["lab".to_string()]);
        assert_eq!(reloaded.get("lab"), Some(&lab_profile()));
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        fs::write(&path, "][").unwrap();
        let store = ProfileStore::open(&path);
        assert!(store.names().is_empty());
    }

    #[test]
    fn remove_requires_existing_profile() {
        let dir = tempdir().unwrap();
        let mut store = ProfileStore::open(dir.path().join("profiles.json"));
        assert!(matches!(
            store.remove_profile("ghost"),
            Err(StoreError::ProfileNotFound(_))
        ));
    }

    #[test]
    fn endpoint_composition_validates_both_halves() {
        let mut profile = lab_profile();
        assert_eq!(profile.endpoint().unwrap().to_string(), "127.0.0.1:1161");
        profile.port = "banana".to_string();
        assert!(profile.endpoint().is_err());
        profile.port = "1161".to_string();
        profile.ip = "999.0.0.1".to_string();
        assert!(profile.endpoint().is_err());
    }
}
