//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use warpgen_common::{Error, Result};

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpgenConfig {
    /// HTTP listen address
    pub listen: String,

    /// Upper bound for one whole generation request
    pub request_deadline_secs: u64,

    /// WARP registration API
    pub registration: RegistrationConfig,

    /// QR image rendering
    pub qr: QrConfig,

    /// Reference data overrides
    pub data: DataConfig,
}

impl Default for WarpgenConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            request_deadline_secs: 60,
            registration: RegistrationConfig::default(),
            qr: QrConfig::default(),
            data: DataConfig::default(),
        }
    }
}

/// Registration API configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    pub api_base: String,
    pub api_version: String,
    pub user_agent: String,
    /// Per-call timeout
    pub timeout_secs: u64,
    /// Retry policy for the first (register) call only
    pub retry: RetryConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.cloudflareclient.com".to_string(),
            api_version: "v0i1909051800".to_string(),
            user_agent: "okhttp/3.12.1".to_string(),
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

impl RegistrationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{api_base}/{api_version}` without a trailing slash
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            self.api_version.trim_matches('/')
        )
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first. `1` disables retry.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Where QR images come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QrBackend {
    /// Remote rendering service
    Remote,
    /// In-process SVG rendering
    Local,
}

impl Default for QrBackend {
    fn default() -> Self {
        Self::Remote
    }
}

impl std::str::FromStr for QrBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            other => Err(Error::InvalidConfig(format!("unknown QR backend: {}", other))),
        }
    }
}

/// QR configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub backend: QrBackend,
    pub api_url: String,
    pub timeout_secs: u64,
    /// Edge length in pixels
    pub size: u32,
    /// Image format requested from the remote service (png, svg, ...)
    pub format: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            backend: QrBackend::Remote,
            api_url: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            timeout_secs: 10,
            size: 200,
            format: "png".to_string(),
        }
    }
}

impl QrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Optional reference data files; bundled data is used when unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub ip_ranges_path: Option<PathBuf>,
    pub services_path: Option<PathBuf>,
    pub profiles_path: Option<PathBuf>,
}

impl WarpgenConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `WARPGEN_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(listen) = non_empty("WARPGEN_LISTEN") {
            self.listen = listen;
        }
        if let Some(api_base) = non_empty("WARPGEN_API_BASE") {
            self.registration.api_base = api_base;
        }
        if let Some(backend) = non_empty("WARPGEN_QR_BACKEND") {
            self.qr.backend = backend.parse()?;
        }
        if let Some(api_url) = non_empty("WARPGEN_QR_API_URL") {
            self.qr.api_url = api_url;
        }
        Ok(())
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.registration.timeout_secs == 0 || self.qr.timeout_secs == 0 {
            return Err(Error::InvalidConfig("timeouts must be non-zero".to_string()));
        }
        if self.request_deadline_secs == 0 {
            return Err(Error::InvalidConfig(
                "request_deadline_secs must be non-zero".to_string(),
            ));
        }
        if self.registration.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.qr.size == 0 || self.qr.size > 1000 {
            return Err(Error::InvalidConfig(format!(
                "qr.size must be between 1 and 1000, got {}",
                self.qr.size
            )));
        }
        if !self.qr.format.chars().all(|c| c.is_ascii_alphanumeric()) || self.qr.format.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "invalid qr.format: {:?}",
                self.qr.format
            )));
        }
        Ok(())
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }
}
