//! Device profiles
//!
//! Per-client interface and peer directives, kept as reference data rather
//! than code. The renderer only picks the profile for the requested device
//! type and copies its directives.

use crate::types::DeviceType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const BUNDLED_PROFILES: &str = include_str!("../data/profiles.toml");

/// One `Key = Value` line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub key: String,
    pub value: String,
}

/// Directive set for one client application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub description: String,
    pub dns: String,
    /// Extra `[Interface]` directives, in output order
    #[serde(default)]
    pub interface: Vec<Directive>,
    /// Extra `[Peer]` directives, in output order
    #[serde(default)]
    pub peer: Vec<Directive>,
}

#[derive(Debug, Deserialize)]
struct ProfilesFile {
    profiles: BTreeMap<String, DeviceProfile>,
}

/// All known profiles, keyed by device type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfiles {
    profiles: BTreeMap<DeviceType, DeviceProfile>,
}

impl DeviceProfiles {
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ProfilesFile = toml::from_str(content)?;

        let mut profiles = BTreeMap::new();
        for (name, profile) in file.profiles {
            let device_type: DeviceType = name
                .parse()
                .map_err(|_| Error::InvalidConfig(format!("unknown device profile: {}", name)))?;
            check_profile(&name, &profile)?;
            profiles.insert(device_type, profile);
        }

        Ok(Self { profiles })
    }

    /// Profiles shipped with the crate
    pub fn bundled() -> Result<Self> {
        Self::from_toml(BUNDLED_PROFILES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::bundled(),
        }
    }

    pub fn get(&self, device_type: DeviceType) -> Option<&DeviceProfile> {
        self.profiles.get(&device_type)
    }

    /// Device types that have no profile
    pub fn missing(&self) -> Vec<DeviceType> {
        DeviceType::ALL
            .into_iter()
            .filter(|d| !self.profiles.contains_key(d))
            .collect()
    }
}

// Values end up verbatim in a line-oriented file.
fn check_profile(name: &str, profile: &DeviceProfile) -> Result<()> {
    let single_line = |s: &str| !s.contains('\n') && !s.contains('\r');

    if !single_line(&profile.dns) || profile.dns.trim().is_empty() {
        return Err(Error::InvalidConfig(format!(
            "profile {} has an invalid DNS value",
            name
        )));
    }

    for directive in profile.interface.iter().chain(profile.peer.iter()) {
        let key_ok = !directive.key.is_empty()
            && directive.key.chars().all(|c| c.is_ascii_alphanumeric());
        if !key_ok || !single_line(&directive.value) {
            return Err(Error::InvalidConfig(format!(
                "profile {} has an invalid directive {:?}",
                name, directive.key
            )));
        }
    }

    Ok(())
}
