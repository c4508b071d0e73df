//! Generation pipeline
//!
//! `Validate → GenerateKeys → Register → Enable → AggregateAllowedIPs →
//! Render → EncodeQR → Assemble`. Any failure after validation aborts the
//! run; QR failures and unknown service keys are absorbed.

use crate::config::WarpgenConfig;
use crate::qr::{QrEncoder, QrOptions};
use crate::registration::{Provisioner, RegistrationClient};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;
use warpgen_common::{
    ConfigParams, ConfigRenderer, DeviceProfiles, Error, Generation, GenerationRequest,
    GenerationResult, IpRangeAggregator, KeyPair, Result, ServiceCatalog, ValidatedRequest,
};

/// Request counters, updated without locks
#[derive(Debug, Default)]
pub struct GenerationStats {
    requests: AtomicU64,
    succeeded: AtomicU64,
    validation_failed: AtomicU64,
    upstream_failed: AtomicU64,
    qr_fallbacks: AtomicU64,
    unsupported_keys: AtomicU64,
}

/// Point-in-time copy of [`GenerationStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub requests: u64,
    pub succeeded: u64,
    pub validation_failed: u64,
    pub upstream_failed: u64,
    pub qr_fallbacks: u64,
    pub unsupported_keys: u64,
}

impl GenerationStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            validation_failed: self.validation_failed.load(Ordering::Relaxed),
            upstream_failed: self.upstream_failed.load(Ordering::Relaxed),
            qr_fallbacks: self.qr_fallbacks.load(Ordering::Relaxed),
            unsupported_keys: self.unsupported_keys.load(Ordering::Relaxed),
        }
    }

    /// Count a request whose body could not be decoded
    pub fn record_malformed(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.validation_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_qr_fallback(&self) {
        self.qr_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: &Result<Generation>) {
        match outcome {
            Ok(_) => self.succeeded.fetch_add(1, Ordering::Relaxed),
            Err(Error::Validation(_)) => self.validation_failed.fetch_add(1, Ordering::Relaxed),
            Err(e) if e.is_upstream() => self.upstream_failed.fetch_add(1, Ordering::Relaxed),
            Err(_) => 0,
        };
    }
}

/// Runs the generation pipeline against shared, immutable reference data
pub struct Generator {
    catalog: Arc<ServiceCatalog>,
    renderer: Arc<ConfigRenderer>,
    provisioner: Arc<dyn Provisioner>,
    qr: QrEncoder,
    qr_options: QrOptions,
    deadline: Duration,
    stats: Arc<GenerationStats>,
}

impl Generator {
    pub fn new(
        catalog: Arc<ServiceCatalog>,
        renderer: Arc<ConfigRenderer>,
        provisioner: Arc<dyn Provisioner>,
        qr: QrEncoder,
    ) -> Self {
        let stats = Arc::new(GenerationStats::default());
        Self {
            catalog,
            renderer,
            provisioner,
            qr: qr.with_stats(stats.clone()),
            qr_options: QrOptions::default(),
            deadline: Duration::from_secs(60),
            stats,
        }
    }

    /// Build the production pipeline: bundled or configured reference data,
    /// the WARP registration client and the configured QR backend.
    pub fn from_config(config: &WarpgenConfig) -> Result<Self> {
        let catalog = ServiceCatalog::load_or_bundled(config.data.ip_ranges_path.as_deref())?;
        let profiles = DeviceProfiles::load_or_bundled(config.data.profiles_path.as_deref())?;
        let missing = profiles.missing();
        if !missing.is_empty() {
            warn!("No device profile for {:?}; those requests will fail", missing);
        }

        let provisioner = RegistrationClient::new(&config.registration)?;
        let qr = QrEncoder::new(&config.qr)?;

        info!(
            services = catalog.len(),
            qr_backend = ?qr.backend(),
            "Generator ready"
        );

        Ok(Self::new(
            Arc::new(catalog),
            Arc::new(ConfigRenderer::new(profiles)),
            Arc::new(provisioner),
            qr,
        )
        .with_deadline(config.request_deadline())
        .with_qr_options(QrOptions::from(&config.qr)))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_qr_options(mut self, options: QrOptions) -> Self {
        self.qr_options = options;
        self
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    /// Run one request end to end.
    ///
    /// Dropping the returned future cancels whichever outbound call is in
    /// flight.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Generation> {
        let request_id = Uuid::new_v4();
        let span = info_span!("generate", %request_id);

        async {
            self.stats.requests.fetch_add(1, Ordering::Relaxed);

            let outcome = match request.validate() {
                Ok(validated) => {
                    debug!(
                        site_mode = %validated.site_mode,
                        device_type = %validated.device_type,
                        services = validated.selected_services.len(),
                        "Request validated"
                    );
                    match tokio::time::timeout(self.deadline, self.run(validated)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(Error::Transport(format!(
                            "request deadline of {:?} exceeded",
                            self.deadline
                        ))),
                    }
                }
                Err(e) => Err(e),
            };

            self.stats.record_outcome(&outcome);
            match &outcome {
                Ok(generation) => info!(warnings = generation.warnings.len(), "Configuration generated"),
                Err(e) => warn!(kind = e.kind(), "Generation failed: {}", e),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, request: ValidatedRequest) -> Result<Generation> {
        let keys = KeyPair::generate()?;
        debug!("Key pair generated");

        let peer = self.provisioner.provision(&keys.public_key).await?;
        debug!(endpoint_host = %peer.endpoint_host, "Peer provisioned");

        let aggregation = IpRangeAggregator::new(&self.catalog)
            .aggregate(request.site_mode, &request.selected_services);
        if !aggregation.unsupported.is_empty() {
            self.stats
                .unsupported_keys
                .fetch_add(aggregation.unsupported.len() as u64, Ordering::Relaxed);
            warn!(unsupported = ?aggregation.unsupported, "Ignoring unknown services");
        }
        debug!(
            full_tunnel = aggregation.allowed_ips.is_full_tunnel(),
            ranges = aggregation.allowed_ips.len(),
            "Allowed IPs resolved"
        );

        let params = ConfigParams {
            private_key: keys.private_key,
            peer_public_key: peer.peer_public_key,
            client_ipv4: peer.client_ipv4,
            client_ipv6: peer.client_ipv6,
            allowed_ips: aggregation.allowed_ips,
            endpoint: request.endpoint,
            device_type: request.device_type,
        };
        let rendered = self.renderer.render(&params)?;

        let qr_code = self.qr.generate(&rendered.qr_text, &self.qr_options).await;

        Ok(Generation {
            result: GenerationResult {
                config_base64: STANDARD.encode(rendered.file_text.as_bytes()),
                qr_code_base64: qr_code,
            },
            warnings: aggregation.unsupported,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{QrBackend, QrConfig};
    use crate::qr::fallback_image;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use warpgen_common::PeerConfig;

    pub(crate) const PEER_KEY: &str = "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=";

    /// Provisioner that answers from memory
    #[derive(Default)]
    pub(crate) struct FakeProvisioner {
        pub(crate) calls: AtomicU32,
        pub(crate) fail_with: Option<fn() -> Error>,
        pub(crate) delay: Option<Duration>,
        pub(crate) peer_public_key: Option<&'static str>,
    }

    #[async_trait]
    impl Provisioner for FakeProvisioner {
        async fn provision(&self, public_key: &str) -> Result<PeerConfig> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(STANDARD.decode(public_key).unwrap().len(), 32);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(make_err) = self.fail_with {
                return Err(make_err());
            }
            Ok(PeerConfig {
                peer_public_key: self.peer_public_key.unwrap_or(PEER_KEY).to_string(),
                endpoint_host: "engage.cloudflareclient.com:2408".to_string(),
                client_ipv4: "172.16.0.2".to_string(),
                client_ipv6: "2606:4700:110:8a36::2".to_string(),
            })
        }
    }

    pub(crate) fn local_qr() -> QrEncoder {
        QrEncoder::new(&QrConfig {
            backend: QrBackend::Local,
            ..Default::default()
        })
        .unwrap()
    }

    pub(crate) fn generator(provisioner: Arc<FakeProvisioner>) -> Generator {
        Generator::new(
            Arc::new(ServiceCatalog::bundled().unwrap()),
            Arc::new(ConfigRenderer::new(DeviceProfiles::bundled().unwrap())),
            provisioner,
            local_qr(),
        )
    }

    fn request(mode: &str, services: &[&str], device: &str) -> GenerationRequest {
        GenerationRequest {
            selected_services: services.iter().map(|s| s.to_string()).collect(),
            site_mode: mode.to_string(),
            device_type: device.to_string(),
            ..Default::default()
        }
    }

    fn no_peers() -> Error {
        Error::Protocol("no peers".into())
    }

    fn decoded_config(generation: &Generation) -> String {
        String::from_utf8(STANDARD.decode(&generation.result.config_base64).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_specific_mode_discord() {
        let provisioner = Arc::new(FakeProvisioner::default());
        let generator = generator(provisioner.clone());

        let generation = generator
            .generate(&request("specific", &["discord"], "computer"))
            .await
            .unwrap();
        let config = decoded_config(&generation);

        assert!(config.contains("162.159.130.0/24"));
        assert!(!config.contains("0.0.0.0/0"));
        assert!(config.contains(&format!("PublicKey = {}\n", PEER_KEY)));
        assert!(config.contains("Endpoint = 162.159.195.1:500\n"));
        assert!(generation.warnings.is_empty());
        assert!(generation
            .result
            .qr_code_base64
            .starts_with("data:image/svg+xml;base64,"));
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);

        let stats = generator.stats().snapshot();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.succeeded, 1);
    }

    #[tokio::test]
    async fn test_all_mode_is_full_tunnel() {
        let generator = generator(Arc::new(FakeProvisioner::default()));
        let generation = generator
            .generate(&request("all", &["discord", "youtube"], "phone"))
            .await
            .unwrap();
        let config = decoded_config(&generation);
        assert!(config.contains("AllowedIPs = 0.0.0.0/0, ::/0\n"));
        assert!(!config.contains("162.159.130.0/24"));
    }

    #[tokio::test]
    async fn test_unknown_keys_become_warnings() {
        let generator = generator(Arc::new(FakeProvisioner::default()));
        let generation = generator
            .generate(&request("specific", &["nope", "discord"], "awg15"))
            .await
            .unwrap();
        assert_eq!(generation.warnings, vec!["nope".to_string()]);
        assert_eq!(generator.stats().snapshot().unsupported_keys, 1);
        assert!(decoded_config(&generation).contains("Jc = 4"));
    }

    #[tokio::test]
    async fn test_validation_runs_before_network() {
        let provisioner = Arc::new(FakeProvisioner::default());
        let generator = generator(provisioner.clone());

        let err = generator
            .generate(&request("specific", &[], "computer"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 0);
        assert_eq!(generator.stats().snapshot().validation_failed, 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts() {
        let provisioner = Arc::new(FakeProvisioner {
            fail_with: Some(no_peers as fn() -> Error),
            ..Default::default()
        });
        let generator = generator(provisioner);

        let err = generator
            .generate(&request("all", &[], "computer"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        let stats = generator.stats().snapshot();
        assert_eq!(stats.upstream_failed, 1);
        assert_eq!(stats.succeeded, 0);
    }

    #[tokio::test]
    async fn test_deadline_is_transport_error() {
        let provisioner = Arc::new(FakeProvisioner {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let generator = generator(provisioner).with_deadline(Duration::from_millis(50));

        let err = generator
            .generate(&request("all", &[], "computer"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_dropped_request_records_no_outcome() {
        let provisioner = Arc::new(FakeProvisioner {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let generator = generator(provisioner.clone());

        let request = request("all", &[], "computer");
        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), generator.generate(&request)).await;
        assert!(cancelled.is_err());
        assert_eq!(provisioner.calls.load(Ordering::SeqCst), 1);

        let stats = generator.stats().snapshot();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.upstream_failed, 0);
    }

    #[tokio::test]
    async fn test_line_break_from_provider_is_protocol_error() {
        let generator = generator(Arc::new(FakeProvisioner {
            peer_public_key: Some("bmXOC+F1FxEMF9dy\nPostUp = id"),
            ..Default::default()
        }));
        let err = generator
            .generate(&request("all", &[], "computer"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(generator.stats().snapshot().upstream_failed, 1);
    }

    #[tokio::test]
    async fn test_qr_failure_uses_placeholder() {
        // Nothing listens on the discard port
        let qr = QrEncoder::new(&QrConfig {
            api_url: "http://127.0.0.1:9/".to_string(),
            timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();
        let generator = Generator::new(
            Arc::new(ServiceCatalog::bundled().unwrap()),
            Arc::new(ConfigRenderer::new(DeviceProfiles::bundled().unwrap())),
            Arc::new(FakeProvisioner::default()),
            qr,
        );

        let generation = generator
            .generate(&request("all", &[], "computer"))
            .await
            .unwrap();
        assert_eq!(
            generation.result.qr_code_base64,
            fallback_image(QrOptions::default().size)
        );
        assert_eq!(generator.stats().snapshot().qr_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_each_request_gets_fresh_keys() {
        let generator = generator(Arc::new(FakeProvisioner::default()));
        let a = generator.generate(&GenerationRequest::default()).await.unwrap();
        let b = generator.generate(&GenerationRequest::default()).await.unwrap();
        assert_ne!(a.result.config_base64, b.result.config_base64);
    }
}
