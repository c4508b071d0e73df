//! Service reference data
//!
//! Two read-only tables, built once at startup and shared by reference:
//! - [`ServiceCatalog`]: service key -> raw comma-separated CIDR list
//! - [`ServiceDirectory`]: display metadata for the same services

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const BUNDLED_IP_RANGES: &str = include_str!("../data/ip-ranges.json");
const BUNDLED_SERVICES: &str = include_str!("../data/services.json");

/// Service key -> raw CIDR list string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceCatalog {
    ranges: BTreeMap<String, String>,
}

impl ServiceCatalog {
    /// Build a catalog from an in-memory map
    pub fn from_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            ranges: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a JSON object of `{"service": "cidr, cidr, ..."}`
    pub fn from_json(json: &str) -> Result<Self> {
        let ranges: BTreeMap<String, String> = serde_json::from_str(json)?;
        Ok(Self { ranges })
    }

    /// The catalog shipped with the crate
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_IP_RANGES)
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&content)?;
        debug!(
            "Loaded {} service ranges from {}",
            catalog.len(),
            path.as_ref().display()
        );
        Ok(catalog)
    }

    /// Load from `path` if given, otherwise use the bundled data
    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::bundled(),
        }
    }

    /// Raw CIDR list for a service
    pub fn get(&self, key: &str) -> Option<&str> {
        self.ranges.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ranges.contains_key(key)
    }

    /// All service keys, sorted
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Display metadata for a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub key: String,
    pub name: String,
    pub icon: String,
    pub icon_library: String,
    /// Marked "new" in the source data
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ServiceInfo {
    pub fn is_new(&self) -> bool {
        self.kind.as_deref() == Some("new")
    }
}

#[derive(Debug, Deserialize)]
struct ServicesFile {
    services: Vec<ServiceInfo>,
}

/// Ordered list of services with display metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceDirectory {
    services: Vec<ServiceInfo>,
}

impl ServiceDirectory {
    pub fn new(services: Vec<ServiceInfo>) -> Self {
        Self { services }
    }

    /// Parse a JSON document of the form `{"services": [...]}`
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ServicesFile = serde_json::from_str(json)?;
        Ok(Self::new(file.services))
    }

    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_SERVICES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn load_or_bundled(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Self::bundled(),
        }
    }

    pub fn all(&self) -> &[ServiceInfo] {
        &self.services
    }

    pub fn get(&self, key: &str) -> Option<&ServiceInfo> {
        self.services.iter().find(|s| s.key == key)
    }

    /// Services flagged as recently added
    pub fn new_services(&self) -> impl Iterator<Item = &ServiceInfo> {
        self.services.iter().filter(|s| s.is_new())
    }
}
