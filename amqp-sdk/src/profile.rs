//! Named connection profiles
//!
//! Profiles are stored as JSON:
//!
//! ```json
//! {
//!   "default": "local",
//!   "connections": [
//!     { "name": "local", "host": "localhost" },
//!     { "name": "staging", "host": "mq.staging.internal", "virtual_host": "apps" }
//!   ]
//! }
//! ```
//!
//! Omitted connection fields take their [`ConnectionConfig`] defaults.

use std::path::{Path, PathBuf};

use amqp_client::ConnectionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdkError};

/// File name of the default profile file inside the config directory
pub const PROFILES_FILE_NAME: &str = "connections.json";

/// Ordered list of named broker connections with an optional default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProfiles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<String>,
    #[serde(default)]
    connections: Vec<ConnectionConfig>,
}

impl ConnectionProfiles {
    /// Build profiles from a list of connections; the first one is the default.
    pub fn new(connections: Vec<ConnectionConfig>) -> Result<Self> {
        let profiles = Self {
            default: None,
            connections,
        };
        profiles.validate()?;
        Ok(profiles)
    }

    /// A single profile, used as the default.
    pub fn single(connection: ConnectionConfig) -> Result<Self> {
        Self::new(vec![connection])
    }

    /// Parse profiles from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let profiles: Self = serde_json::from_str(json)?;
        profiles.validate()?;
        Ok(profiles)
    }

    /// Load profiles from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SdkError::ProfileIo {
            path: path.to_path_buf(),
            source,
        })?;

        let profiles = Self::from_json(&json)?;
        tracing::debug!(
            "Loaded {} connection profiles from {}",
            profiles.len(),
            path.display()
        );
        Ok(profiles)
    }

    /// Load profiles from [`default_path`](Self::default_path).
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path()?)
    }

    /// `<config dir>/amqp-sdk/connections.json`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("amqp-sdk").join(PROFILES_FILE_NAME))
            .ok_or(SdkError::NoConfigDir)
    }

    /// Serialize the profiles as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Select the default profile by name.
    pub fn with_default(mut self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if self.get(&name).is_none() {
            return Err(SdkError::ProfileNotFound(name));
        }
        self.default = Some(name);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Like [`get`](Self::get) but a miss is an error.
    pub fn require(&self, name: &str) -> Result<&ConnectionConfig> {
        self.get(name)
            .ok_or_else(|| SdkError::ProfileNotFound(name.to_string()))
    }

    /// The selected default, or the first profile when none is selected.
    pub fn default_profile(&self) -> Option<&ConnectionConfig> {
        match &self.default {
            Some(name) => self.get(name),
            None => self.connections.first(),
        }
    }

    /// Profile names in file order
    pub fn names(&self) -> Vec<String> {
        self.connections.iter().map(|c| c.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionConfig> {
        self.connections.iter()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();

        for connection in &self.connections {
            connection
                .validate()
                .map_err(|e| SdkError::InvalidProfile {
                    name: connection.name.clone(),
                    reason: e.to_string(),
                })?;

            if !seen.insert(connection.name.as_str()) {
                return Err(SdkError::DuplicateProfile(connection.name.clone()));
            }
        }

        if let Some(default) = &self.default {
            if !seen.contains(default.as_str()) {
                return Err(SdkError::ProfileNotFound(default.clone()));
            }
        }

        Ok(())
    }
}
