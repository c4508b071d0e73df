//! Generate Command

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;
use warpgen_common::{DeviceType, GenerationRequest, SiteMode, DEFAULT_ENDPOINT};

use crate::client::WarpgenClient;
use crate::output::{print_success, print_warning};

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Service key to route through the tunnel (repeatable)
    #[arg(short, long = "service")]
    pub services: Vec<String>,

    /// Site mode (all, specific)
    #[arg(short, long, default_value = "all")]
    pub mode: String,

    /// Device profile (computer, phone, awg15)
    #[arg(short, long, default_value = "computer")]
    pub device: String,

    /// Peer endpoint as host:port
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// Write the config here instead of stdout
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Write the QR image here
    #[arg(long)]
    pub qr_out: Option<PathBuf>,
}

impl GenerateArgs {
    /// Build the request, rejecting unknown mode and device values early
    pub fn to_request(&self) -> Result<GenerationRequest> {
        let mode: SiteMode = self.mode.parse()?;
        let device: DeviceType = self.device.parse()?;
        Ok(GenerationRequest {
            selected_services: self.services.clone(),
            site_mode: mode.to_string(),
            device_type: device.to_string(),
            endpoint: self.endpoint.clone(),
        })
    }
}

/// An image extracted from a `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUri {
    /// Parse the base64 and percent-encoded forms produced by the service
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("not a data URI"))?;
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| anyhow!("data URI has no payload"))?;
        let (mime, encoding) = meta.split_once(';').unwrap_or((meta, ""));

        let bytes = match encoding {
            "base64" => STANDARD.decode(payload).context("invalid base64 payload")?,
            "utf8" | "" => urlencoding::decode(payload)
                .context("invalid percent-encoded payload")?
                .into_owned()
                .into_bytes(),
            other => bail!("unsupported data URI encoding: {}", other),
        };

        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// True for the service's "QR code unavailable" placeholder
    pub fn is_placeholder(&self) -> bool {
        self.mime == "image/svg+xml"
            && String::from_utf8_lossy(&self.bytes).contains("QR code unavailable")
    }
}

pub async fn execute(args: GenerateArgs, client: &WarpgenClient) -> Result<()> {
    let request = args.to_request()?;
    debug!(?request, "Requesting configuration from {}", client.base_url());

    let (result, warnings) = client.generate(&request).await?;
    for key in &warnings {
        print_warning(&format!("Unknown service ignored: {}", key));
    }

    let config = STANDARD
        .decode(&result.config_base64)
        .context("service returned invalid base64 config")?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, &config)
                .with_context(|| format!("cannot write {}", path.display()))?;
            print_success(&format!("Config written to {}", path.display()));
        }
        None => {
            std::io::stdout().write_all(&config)?;
        }
    }

    if let Some(path) = &args.qr_out {
        let image = DataUri::parse(&result.qr_code_base64)?;
        if image.is_placeholder() {
            print_warning("QR service unavailable; writing placeholder image");
        }
        std::fs::write(path, &image.bytes)
            .with_context(|| format!("cannot write {}", path.display()))?;
        print_success(&format!("QR image ({}) written to {}", image.mime, path.display()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> GenerateArgs {
        GenerateArgs {
            services: vec!["discord".into()],
            mode: "specific".into(),
            device: "awg15".into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            out: None,
            qr_out: None,
        }
    }

    #[test]
    fn test_to_request() {
        let request = args().to_request().unwrap();
        assert_eq!(request.site_mode, "specific");
        assert_eq!(request.device_type, "awg15");
        assert_eq!(request.selected_services, vec!["discord".to_string()]);
    }

    #[test]
    fn test_to_request_rejects_unknown_device() {
        let mut args = args();
        args.device = "toaster".into();
        assert!(args.to_request().is_err());
    }

    #[test]
    fn test_parse_base64_data_uri() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(b"PNGDATA"));
        let image = DataUri::parse(&uri).unwrap();
        assert_eq!(image.mime, "image/png");
        assert_eq!(image.bytes, b"PNGDATA");
        assert!(!image.is_placeholder());
    }

    #[test]
    fn test_parse_percent_encoded_placeholder() {
        let svg = "<svg><text>QR code unavailable</text></svg>";
        let uri = format!("data:image/svg+xml;utf8,{}", urlencoding::encode(svg));
        let image = DataUri::parse(&uri).unwrap();
        assert_eq!(image.bytes, svg.as_bytes());
        assert!(image.is_placeholder());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DataUri::parse("https://example.com/qr.png").is_err());
        assert!(DataUri::parse("data:image/png;base64").is_err());
        assert!(DataUri::parse("data:image/png;gzip,abc").is_err());
    }
}
