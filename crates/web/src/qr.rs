//! QR image encoding
//!
//! Produces a `data:` URI for the compact config text. Encoding never fails
//! from the caller's point of view: any problem with the selected backend is
//! replaced by a placeholder image.

use crate::config::{QrBackend, QrConfig};
use crate::pipeline::GenerationStats;
use base64::{engine::general_purpose::STANDARD, Engine};
use qrcode::render::svg;
use qrcode::QrCode;
use std::sync::Arc;
use tracing::{debug, warn};
use warpgen_common::{Error, Result};

const QR_USER_AGENT: &str = "Mozilla/5.0 (compatible; WarpGenerator/1.0)";

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Placeholder artwork, drawn on a 200x200 canvas and scaled by the outer element
const FALLBACK_BODY: &str = concat!(
    r##"<rect width="200" height="200" fill="#f8f9fa"/>"##,
    r##"<circle cx="100" cy="80" r="40" fill="none" stroke="#6c757d" stroke-width="4"/>"##,
    r##"<circle cx="86" cy="70" r="4" fill="#6c757d"/>"##,
    r##"<circle cx="114" cy="70" r="4" fill="#6c757d"/>"##,
    r##"<path d="M82 100 Q100 86 118 100" fill="none" stroke="#6c757d" stroke-width="4"/>"##,
    r##"<text x="100" y="160" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#6c757d">QR code unavailable</text>"##,
);

/// Per-call rendering options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrOptions {
    /// Edge length in pixels
    pub size: u32,
    pub format: String,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self::from(&QrConfig::default())
    }
}

impl From<&QrConfig> for QrOptions {
    fn from(config: &QrConfig) -> Self {
        Self {
            size: config.size,
            format: config.format.clone(),
        }
    }
}

/// Placeholder returned whenever a real QR image cannot be produced
pub fn fallback_image(size: u32) -> String {
    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{0}" height="{0}" viewBox="0 0 200 200">{1}</svg>"#,
        size, FALLBACK_BODY
    );
    format!("data:image/svg+xml;utf8,{}", urlencoding::encode(&svg))
}

/// Encodes text as a QR image data URI
#[derive(Debug, Clone)]
pub struct QrEncoder {
    http: reqwest::Client,
    backend: QrBackend,
    api_url: String,
    stats: Option<Arc<GenerationStats>>,
}

impl QrEncoder {
    pub fn new(config: &QrConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(QR_USER_AGENT)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build QR client: {}", e)))?;

        Ok(Self {
            http,
            backend: config.backend,
            api_url: config.api_url.clone(),
            stats: None,
        })
    }

    /// Count placeholder substitutions in `stats`
    pub fn with_stats(mut self, stats: Arc<GenerationStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn backend(&self) -> QrBackend {
        self.backend
    }

    /// Encode `text`, substituting the placeholder on any failure
    pub async fn generate(&self, text: &str, options: &QrOptions) -> String {
        match self.try_generate(text, options).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("QR encoding failed, using placeholder: {}", e);
                if let Some(stats) = &self.stats {
                    stats.record_qr_fallback();
                }
                fallback_image(options.size)
            }
        }
    }

    /// Encode `text` with the configured backend, reporting failures
    pub async fn try_generate(&self, text: &str, options: &QrOptions) -> Result<String> {
        match self.backend {
            QrBackend::Remote => self.remote(text, options).await,
            QrBackend::Local => render_svg(text, options.size),
        }
    }

    async fn remote(&self, text: &str, options: &QrOptions) -> Result<String> {
        let size = format!("{0}x{0}", options.size);
        debug!(size = %size, format = %options.format, "Requesting QR image");

        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("size", size.as_str()),
                ("format", options.format.as_str()),
                ("data", text),
            ])
            .send()
            .await
            .map_err(|e| Error::Transport(format!("QR request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!("QR service returned HTTP {}", status)));
        }
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("QR body read failed: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::Protocol("QR service returned an empty body".to_string()));
        }

        check_image(&mime, &options.format, &bytes)?;

        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&bytes)))
    }
}

/// Reject bodies that are not an image in the requested format
fn check_image(mime: &str, format: &str, bytes: &[u8]) -> Result<()> {
    if !mime.starts_with("image/") {
        return Err(Error::Protocol(format!(
            "QR service returned {:?} instead of an image",
            mime
        )));
    }

    let matches_format = match format {
        "png" => bytes.starts_with(PNG_SIGNATURE),
        "svg" => {
            let head = &bytes[..bytes.len().min(1024)];
            String::from_utf8_lossy(head).contains("<svg")
        }
        _ => true,
    };
    if !matches_format {
        return Err(Error::Protocol(format!(
            "QR service body is not a {} image",
            format
        )));
    }
    Ok(())
}

/// In-process SVG rendering
fn render_svg(text: &str, size: u32) -> Result<String> {
    let code = QrCode::new(text.as_bytes())
        .map_err(|e| Error::Internal(format!("cannot encode QR symbol: {}", e)))?;
    let image = code
        .render::<svg::Color>()
        .min_dimensions(size, size)
        .build();
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}
