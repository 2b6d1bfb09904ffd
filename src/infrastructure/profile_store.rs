//! Profile Store
//!
//! Persists one calibration profile per device as pretty JSON, keyed by the
//! device name.

use crate::domain::profile::{DeviceIdentity, DeviceProfile};
use crate::domain::settings::APP_DIR_NAME;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("profile I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("malformed profile: {0}")]
    Json(#[from] serde_json::Error),
    #[error("could not determine config directory")]
    NoConfigDir,
}

pub trait ProfileStore {
    /// Stored profile for `identity`, or `None` if the device was never saved
    fn load_profile(&self, identity: &DeviceIdentity) -> Result<Option<DeviceProfile>, StoreError>;

    fn save_profile(&self, profile: &DeviceProfile) -> Result<(), StoreError>;

    /// Stored profile, or a fresh one for a device seen for the first time
    fn load_or_default(&self, identity: &DeviceIdentity) -> Result<DeviceProfile, StoreError> {
        Ok(self
            .load_profile(identity)?
            .unwrap_or_else(|| DeviceProfile::for_device(identity.clone())))
    }

    /// Save `edited` if it differs from `original`. Returns whether it saved.
    fn commit(&self, original: &DeviceProfile, edited: &DeviceProfile) -> Result<bool, StoreError> {
        if !edited.differs_from(original) {
            return Ok(false);
        }
        self.save_profile(edited)?;
        Ok(true)
    }
}

pub struct JsonProfileStore {
    dir: PathBuf,
}

impl JsonProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config_dir>/BcoreDriver/profiles`
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        let mut path = dirs::config_dir().ok_or(StoreError::NoConfigDir)?;
        path.push(APP_DIR_NAME);
        path.push("profiles");
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, device_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(device_name)))
    }
}

impl ProfileStore for JsonProfileStore {
    fn load_profile(&self, identity: &DeviceIdentity) -> Result<Option<DeviceProfile>, StoreError> {
        let path = self.file_path(&identity.name);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No stored profile for {}", identity.name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let mut profile: DeviceProfile = serde_json::from_str(&contents)?;
        profile.identity = identity.clone();
        debug!("Loaded profile {}", path.display());
        Ok(Some(profile))
    }

    fn save_profile(&self, profile: &DeviceProfile) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_path(&profile.identity.name);
        let json = serde_json::to_string_pretty(profile)?;
        fs::write(&path, json)?;
        info!("Saved profile {}", path.display());
        Ok(())
    }
}

/// Device names come from advertisements; keep them to safe file characters
fn file_stem(device_name: &str) -> String {
    device_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
