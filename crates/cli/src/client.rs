//! HTTP client for the warpgen web service

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warpgen_common::{GenerationRequest, GenerationResult, ServiceInfo};

/// Body of `POST /api/warp`, success or failure
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(default)]
    pub content: Option<GenerationResult>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// One entry of `GET /api/services`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceListing {
    #[serde(flatten)]
    pub info: ServiceInfo,
    #[serde(default)]
    pub has_ranges: bool,
}

#[derive(Debug, Deserialize)]
struct ServicesResponse {
    services: Vec<ServiceListing>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub service: String,
}

/// Client for the warpgen web service
pub struct WarpgenClient {
    http: reqwest::Client,
    base_url: String,
}

impl WarpgenClient {
    pub fn new(base_url: &str) -> Result<Self> {
        // Generation makes three upstream calls, each with its own timeout
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a configuration
    pub async fn generate(&self, request: &GenerationRequest) -> Result<(GenerationResult, Vec<String>)> {
        let url = format!("{}/api/warp", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("cannot reach {}", url))?;

        let status = response.status();
        let body: GenerateResponse = response
            .json()
            .await
            .with_context(|| format!("unexpected response from {} (HTTP {})", url, status))?;

        match body {
            GenerateResponse {
                success: true,
                content: Some(content),
                warnings,
                ..
            } => Ok((content, warnings)),
            GenerateResponse { message, .. } => Err(anyhow!(
                "{} (HTTP {})",
                message.unwrap_or_else(|| "generation failed".to_string()),
                status
            )),
        }
    }

    /// List the service directory, optionally only recently added services
    pub async fn services(&self, new_only: bool) -> Result<Vec<ServiceListing>> {
        let url = format!("{}/api/services", self.base_url);
        let mut request = self.http.get(&url);
        if new_only {
            request = request.query(&[("new", "true")]);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("cannot reach {}", url))?
            .error_for_status()?;
        let body: ServicesResponse = response.json().await?;
        Ok(body.services)
    }

    /// Check service health
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = format!("{}/api/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("cannot reach {}", url))?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}
