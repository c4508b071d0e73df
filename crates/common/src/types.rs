//! Core types for warpgen

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Allowed-IPs value that routes every destination through the tunnel.
pub const FULL_TUNNEL: &str = "0.0.0.0/0, ::/0";

/// Endpoint used when a request does not name one.
pub const DEFAULT_ENDPOINT: &str = "162.159.195.1:500";

/// Which destinations the tunnel should carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteMode {
    All,
    Specific,
}

impl Default for SiteMode {
    fn default() -> Self {
        Self::All
    }
}

impl std::fmt::Display for SiteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteMode::All => write!(f, "all"),
            SiteMode::Specific => write!(f, "specific"),
        }
    }
}

impl FromStr for SiteMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SiteMode::All),
            "specific" => Ok(SiteMode::Specific),
            other => Err(Error::Validation(format!("Invalid site mode: {}", other))),
        }
    }
}

/// Client application the config is generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Computer,
    Phone,
    /// AmneziaWG 1.5 with traffic obfuscation directives
    Awg15,
}

impl DeviceType {
    pub const ALL: [DeviceType; 3] = [DeviceType::Computer, DeviceType::Phone, DeviceType::Awg15];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Computer => "computer",
            DeviceType::Phone => "phone",
            DeviceType::Awg15 => "awg15",
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        Self::Computer
    }
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "computer" => Ok(DeviceType::Computer),
            "phone" => Ok(DeviceType::Phone),
            "awg15" => Ok(DeviceType::Awg15),
            other => Err(Error::Validation(format!("Invalid device type: {}", other))),
        }
    }
}

/// Ephemeral credential issued by the registration endpoint.
///
/// Consumed by value when the tunnel is enabled, so it never outlives the
/// request that created it.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistrationSession {
    pub client_id: String,
    pub bearer_token: String,
}

impl std::fmt::Debug for RegistrationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationSession")
            .field("client_id", &self.client_id)
            .field("bearer_token", &"<redacted>")
            .finish()
    }
}

/// Peer definition and tunnel addresses assigned by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    pub peer_public_key: String,
    pub endpoint_host: String,
    pub client_ipv4: String,
    pub client_ipv6: String,
}

/// Caller input, as received on the wire.
///
/// Mode and device type stay strings here so that unknown values surface as
/// validation errors rather than decode errors. A field that is missing,
/// `null` or `""` takes its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default, deserialize_with = "services_or_default")]
    pub selected_services: Vec<String>,
    #[serde(default = "default_site_mode", deserialize_with = "site_mode_or_default")]
    pub site_mode: String,
    #[serde(default = "default_device_type", deserialize_with = "device_type_or_default")]
    pub device_type: String,
    #[serde(default = "default_endpoint", deserialize_with = "endpoint_or_default")]
    pub endpoint: String,
}

fn string_or<'de, D>(deserializer: D, default: fn() -> String) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).unwrap_or_else(default))
}

fn services_or_default<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn site_mode_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or(deserializer, default_site_mode)
}

fn device_type_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or(deserializer, default_device_type)
}

fn endpoint_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    string_or(deserializer, default_endpoint)
}

fn default_site_mode() -> String {
    SiteMode::default().to_string()
}

fn default_device_type() -> String {
    DeviceType::default().to_string()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for GenerationRequest {
    fn default() -> Self {
        Self {
            selected_services: Vec::new(),
            site_mode: default_site_mode(),
            device_type: default_device_type(),
            endpoint: default_endpoint(),
        }
    }
}

impl GenerationRequest {
    /// Check the request and convert it to its typed form.
    ///
    /// Unknown service keys are not rejected here; they are reported as
    /// warnings during aggregation.
    pub fn validate(&self) -> Result<ValidatedRequest> {
        let site_mode: SiteMode = self.site_mode.parse()?;
        let device_type: DeviceType = self.device_type.parse()?;

        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(Error::Validation("Endpoint is required".to_string()));
        }
        if endpoint.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::Validation(
                "Endpoint must not contain whitespace".to_string(),
            ));
        }

        if site_mode == SiteMode::Specific && self.selected_services.is_empty() {
            return Err(Error::Validation(
                "Services must be selected for specific mode".to_string(),
            ));
        }

        Ok(ValidatedRequest {
            selected_services: self.selected_services.clone(),
            site_mode,
            device_type,
            endpoint: endpoint.to_string(),
        })
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub selected_services: Vec<String>,
    pub site_mode: SiteMode,
    pub device_type: DeviceType,
    pub endpoint: String,
}

/// Destinations routed through the tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedIps {
    /// Route everything (`0.0.0.0/0, ::/0`)
    FullTunnel,
    /// Non-empty, deduplicated, lexicographically sorted CIDR list
    Ranges(Vec<String>),
}

impl AllowedIps {
    pub fn is_full_tunnel(&self) -> bool {
        matches!(self, AllowedIps::FullTunnel)
    }

    pub fn len(&self) -> usize {
        match self {
            AllowedIps::FullTunnel => 2,
            AllowedIps::Ranges(ranges) => ranges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for AllowedIps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllowedIps::FullTunnel => f.write_str(FULL_TUNNEL),
            AllowedIps::Ranges(ranges) => f.write_str(&ranges.join(", ")),
        }
    }
}

/// Everything both renderers need, assembled once per request.
///
/// The file and QR renderings read only from this struct, which keeps them
/// semantically identical.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigParams {
    pub private_key: String,
    pub peer_public_key: String,
    pub client_ipv4: String,
    pub client_ipv6: String,
    pub allowed_ips: AllowedIps,
    pub endpoint: String,
    pub device_type: DeviceType,
}

impl std::fmt::Debug for ConfigParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigParams")
            .field("peer_public_key", &self.peer_public_key)
            .field("client_ipv4", &self.client_ipv4)
            .field("client_ipv6", &self.client_ipv6)
            .field("allowed_ips", &self.allowed_ips.to_string())
            .field("endpoint", &self.endpoint)
            .field("device_type", &self.device_type)
            .finish()
    }
}

/// The two textual forms of one config
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    /// Downloadable `.conf` text
    pub file_text: String,
    /// Compact text encoded into the QR image
    pub qr_text: String,
}

/// Wire-level generation output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub config_base64: String,
    pub qr_code_base64: String,
}

/// Generation output plus non-fatal warnings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub result: GenerationResult,
    /// Selected service keys that the catalog does not know
    pub warnings: Vec<String>,
}
