//! services/wakeup/src/adapters/alarm_file.rs
//!
//! This module contains the JSON file adapter for alarm persistence.
//! It implements the `AlarmStore` port from the `core` crate.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use wakeup_core::ports::{AlarmStore, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// Stores the encoded alarm collection in a single file.
///
/// Saves go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous collection intact.
#[derive(Clone, Debug)]
pub struct JsonFileAlarmStore {
    path: PathBuf,
}

impl JsonFileAlarmStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("alarms.json"));
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

//=========================================================================================
// `AlarmStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AlarmStore for JsonFileAlarmStore {
    async fn load(&self) -> PortResult<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Alarms file {} does not exist yet.", self.path.display());
                Ok(None)
            }
            Err(e) => Err(PortError::Unavailable(format!(
                "could not read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn save(&self, data: &[u8]) -> PortResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, data)
            .await
            .map_err(|e| {
                PortError::Unexpected(format!("could not write {}: {}", temp.display(), e))
            })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            PortError::Unexpected(format!(
                "could not replace {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("Wrote {} bytes to {}.", data.len(), self.path.display());
        Ok(())
    }
}
