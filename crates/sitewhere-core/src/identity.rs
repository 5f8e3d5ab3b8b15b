//! Stable per-device identity.
//!
//! The hardware id a device registers under must not change between runs.
//! Hosts either supply one explicitly or fall back to the machine id that the
//! operating system already keeps stable.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors raised when no device identity can be determined.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No identity source produced a usable id.
    #[error("no unique device id available ({reason}); supply a hardware id override")]
    Unavailable { reason: String },
}

/// Source of the unique id a device registers under.
pub trait IdentityProvider {
    /// Returns the id. It must be stable for the lifetime of the device.
    fn unique_device_id(&self) -> Result<String, IdentityError>;
}

/// An explicitly configured identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticIdentity(String);

impl StaticIdentity {
    /// Creates an identity from a fixed id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl IdentityProvider for StaticIdentity {
    fn unique_device_id(&self) -> Result<String, IdentityError> {
        let id = self.0.trim();
        if id.is_empty() {
            return Err(IdentityError::Unavailable {
                reason: "configured id is empty".into(),
            });
        }
        Ok(id.to_string())
    }
}

/// Identity read from the operating system's machine id files.
#[derive(Debug, Clone)]
pub struct MachineIdentity {
    candidates: Vec<PathBuf>,
}

impl Default for MachineIdentity {
    fn default() -> Self {
        Self {
            candidates: vec![
                PathBuf::from("/etc/machine-id"),
                PathBuf::from("/var/lib/dbus/machine-id"),
            ],
        }
    }
}

impl MachineIdentity {
    /// Reads the id from the given files, first match wins.
    pub fn from_paths(candidates: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            candidates: candidates.into_iter().map(Into::into).collect(),
        }
    }

    fn read(path: &Path) -> Option<String> {
        let content = std::fs::read_to_string(path).ok()?;
        let id = content.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }
}

impl IdentityProvider for MachineIdentity {
    fn unique_device_id(&self) -> Result<String, IdentityError> {
        for path in &self.candidates {
            if let Some(id) = Self::read(path) {
                debug!(path = %path.display(), "resolved machine identity");
                return Ok(id);
            }
        }
        Err(IdentityError::Unavailable {
            reason: format!("none of {} machine id files readable", self.candidates.len()),
        })
    }
}
