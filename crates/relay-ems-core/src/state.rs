//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence of discovered device state."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relay_ems_common::StateConfig;
use tracing::{debug, warn};

use crate::provider::DiscoveredState;

/// One JSON document per device holding its discovered fields and catalog.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("unable to create state directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn from_config(config: &StateConfig) -> Result<Self> {
        Self::new(config.directory.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, device_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", device_id))
    }

    /// Load persisted state. A missing or unreadable document means the device
    /// has not been discovered.
    pub fn load(&self, device_id: &str) -> Option<DiscoveredState> {
        let path = self.path_for(device_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(device = device_id, path = %path.display(), error = %err, "unable to read device state");
                return None;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(state) => {
                debug!(device = device_id, path = %path.display(), "device state restored");
                Some(state)
            }
            Err(err) => {
                warn!(device = device_id, path = %path.display(), error = %err, "ignoring corrupt device state");
                None
            }
        }
    }

    /// Persist state, replacing any previous document atomically.
    pub fn save(&self, device_id: &str, state: &DiscoveredState) -> Result<PathBuf> {
        let path = self.path_for(device_id);
        let tmp = path.with_extension("json.tmp");
        let body =
            serde_json::to_vec_pretty(state).with_context(|| "failed to serialize device state")?;
        {
            let mut file = fs::File::create(&tmp)
                .with_context(|| format!("unable to create {}", tmp.display()))?;
            file.write_all(&body)
                .with_context(|| format!("unable to write {}", tmp.display()))?;
            file.sync_all()
                .with_context(|| format!("unable to sync {}", tmp.display()))?;
        }
        fs::rename(&tmp, &path)
            .with_context(|| format!("unable to move state into {}", path.display()))?;
        debug!(device = device_id, path = %path.display(), "device state persisted");
        Ok(path)
    }

    /// Remove persisted state so the next start rediscovers the device.
    pub fn clear(&self, device_id: &str) -> Result<bool> {
        let path = self.path_for(device_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("unable to remove {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderProperty, PROPERTY_NAME, STATUS_COMMAND};
    use chrono::Utc;
    use relay_ems_discovery::{discover, infer, synthesize, GROUP_ID};
    use tempfile::tempdir;

    fn sample_state() -> DiscoveredState {
        let fields = discover(r#"{"StatusSTS_POWER1":"ON","StatusSTS_POWER2":"OFF"}"#, PROPERTY_NAME)
            .unwrap();
        let commands = synthesize(GROUP_ID, &infer(&fields));
        DiscoveredState {
            property: ProviderProperty {
                name: PROPERTY_NAME.into(),
                command: STATUS_COMMAND.into(),
                fields: fields.into_iter().collect(),
            },
            commands,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn save_then_load_restores_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        let state = sample_state();
        store.save("plug", &state).unwrap();
        assert_eq!(store.load("plug"), Some(state));
        assert!(!store.path_for("plug").with_extension("json.tmp").exists());
    }

    #[test]
    fn missing_or_corrupt_state_is_uninitialised() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        assert_eq!(store.load("plug"), None);
        fs::write(store.path_for("plug"), "{not json").unwrap();
        assert_eq!(store.load("plug"), None);
    }

    #[test]
    fn clear_removes_state() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path()).unwrap();
        store.save("plug", &sample_state()).unwrap();
        assert!(store.clear("plug").unwrap());
        assert!(!store.clear("plug").unwrap());
        assert_eq!(store.load("plug"), None);
    }
}
