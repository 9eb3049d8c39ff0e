//! Calibration profile persistence boundary.
//!
//! The core treats storage as an opaque key-value store keyed by user id.
//! Two backends are provided: an in-memory store for tests and short-lived
//! sessions, and a directory of YAML documents for simple local persistence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::calibration::profile::CalibrationProfile;
use crate::{Error, Result};

/// Opaque profile store keyed by user id
pub trait ProfileStore {
    /// Persist a profile under its user id, overwriting any previous one
    fn save(&mut self, profile: &CalibrationProfile) -> Result<()>;

    /// Load the profile for a user, `None` if absent
    fn load(&self, user_id: &str) -> Result<Option<CalibrationProfile>>;

    /// Remove a stored profile; absent profiles are not an error
    fn delete(&mut self, user_id: &str) -> Result<()>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: HashMap<String, CalibrationProfile>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn save(&mut self, profile: &CalibrationProfile) -> Result<()> {
        self.profiles
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<CalibrationProfile>> {
        Ok(self.profiles.get(user_id).cloned())
    }

    fn delete(&mut self, user_id: &str) -> Result<()> {
        self.profiles.remove(user_id);
        Ok(())
    }
}

/// One YAML document per user id under a base directory
pub struct FileProfileStore {
    base_dir: PathBuf,
}

impl FileProfileStore {
    /// Create a store rooted at `base_dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        // Sanitize the id so it cannot escape the base directory
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_dir.join(format!("{safe}.yaml"))
    }
}

impl ProfileStore for FileProfileStore {
    fn save(&mut self, profile: &CalibrationProfile) -> Result<()> {
        let content = serde_yaml::to_string(profile)
            .map_err(|e| Error::StorageError(format!("failed to serialize profile: {e}")))?;
        std::fs::write(self.path_for(&profile.user_id), content)?;
        log::debug!("profile saved for user {}", profile.user_id);
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<CalibrationProfile>> {
        let path = self.path_for(user_id);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let profile = serde_yaml::from_str(&content)
            .map_err(|e| Error::StorageError(format!("failed to parse profile: {e}")))?;
        Ok(Some(profile))
    }

    fn delete(&mut self, user_id: &str) -> Result<()> {
        let path = self.path_for(user_id);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
