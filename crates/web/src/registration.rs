//! WARP device registration
//!
//! Two calls against the provider API: `POST /reg` announces the client's
//! public key and yields a short-lived [`RegistrationSession`], then
//! `PATCH /reg/{id}` enables the tunnel and returns the peer definition.

use crate::config::{RegistrationConfig, RetryConfig};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};
use warpgen_common::{Error, PeerConfig, RegistrationSession, Result};

/// Turns a client public key into a provisioned peer
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, public_key: &str) -> Result<PeerConfig>;
}

/// Body of the register call
#[derive(Debug, Serialize)]
struct RegisterRequest<'a> {
    install_id: &'a str,
    tos: String,
    key: &'a str,
    fcm_token: &'a str,
    #[serde(rename = "type")]
    device_type: &'a str,
    locale: &'a str,
}

impl<'a> RegisterRequest<'a> {
    fn new(key: &'a str) -> Self {
        Self {
            install_id: "",
            tos: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            key,
            fcm_token: "",
            device_type: "ios",
            locale: "en_US",
        }
    }
}

#[derive(Debug, Serialize)]
struct EnableRequest {
    warp_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    #[serde(default)]
    id: String,
    #[serde(default)]
    token: String,
}

#[derive(Debug, Deserialize)]
struct EnableResult {
    config: Option<TunnelConfig>,
}

#[derive(Debug, Deserialize)]
struct TunnelConfig {
    #[serde(default)]
    peers: Vec<PeerEntry>,
    interface: Option<InterfaceEntry>,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    #[serde(default)]
    public_key: String,
    endpoint: Option<PeerEndpoint>,
}

#[derive(Debug, Deserialize)]
struct PeerEndpoint {
    #[serde(default)]
    host: String,
}

#[derive(Debug, Deserialize)]
struct InterfaceEntry {
    addresses: Option<Addresses>,
}

#[derive(Debug, Deserialize)]
struct Addresses {
    #[serde(default)]
    v4: String,
    #[serde(default)]
    v6: String,
}

/// HTTP client for the WARP registration API
#[derive(Debug, Clone)]
pub struct RegistrationClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl RegistrationClient {
    pub fn new(config: &RegistrationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            retry: config.retry.clone(),
        })
    }

    /// Phase 1: register the public key
    pub async fn register(&self, public_key: &str) -> Result<RegistrationSession> {
        let url = format!("{}/reg", self.base_url);
        debug!("Registering device at {}", url);

        let response = self
            .http
            .post(&url)
            .json(&RegisterRequest::new(public_key))
            .send()
            .await
            .map_err(|e| transport("register", e))?;

        let result: RegisterResult = read_result("register", response).await?;
        if result.id.is_empty() || result.token.is_empty() {
            return Err(Error::Protocol(
                "register response is missing id or token".to_string(),
            ));
        }

        info!(client_id = %result.id, "Device registered");
        Ok(RegistrationSession {
            client_id: result.id,
            bearer_token: result.token,
        })
    }

    /// Phase 1 with the configured backoff; only transport errors are retried
    pub async fn register_with_retry(&self, public_key: &str) -> Result<RegistrationSession> {
        let mut attempt = 1;
        loop {
            match self.register(public_key).await {
                Err(e) if e.is_recoverable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        "Register failed ({}), retrying in {:?}",
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Phase 2: enable the tunnel. Consumes the session.
    pub async fn enable(&self, session: RegistrationSession) -> Result<PeerConfig> {
        let url = format!("{}/reg/{}", self.base_url, session.client_id);
        debug!(client_id = %session.client_id, "Enabling tunnel");

        let response = self
            .http
            .patch(&url)
            .bearer_auth(&session.bearer_token)
            .json(&EnableRequest { warp_enabled: true })
            .send()
            .await
            .map_err(|e| transport("enable", e))?;

        let result: EnableResult = read_result("enable", response).await?;
        let peer = peer_config(result)?;

        info!(
            client_id = %session.client_id,
            endpoint_host = %peer.endpoint_host,
            "Tunnel enabled"
        );
        Ok(peer)
    }
}

#[async_trait]
impl Provisioner for RegistrationClient {
    async fn provision(&self, public_key: &str) -> Result<PeerConfig> {
        let session = self.register_with_retry(public_key).await?;
        self.enable(session).await
    }
}

fn transport(phase: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("{} request timed out", phase))
    } else {
        Error::Transport(format!("{} request failed: {}", phase, e))
    }
}

/// Check the status, then decode `{result: T}`
async fn read_result<T: DeserializeOwned>(phase: &str, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport(format!("{} returned HTTP {}", phase, status)));
    }

    let body = response.bytes().await.map_err(|e| transport(phase, e))?;
    let envelope: Envelope<T> = serde_json::from_slice(&body)
        .map_err(|e| Error::Protocol(format!("{} response is not valid JSON: {}", phase, e)))?;

    envelope
        .result
        .ok_or_else(|| Error::Protocol(format!("{} response has no result", phase)))
}

fn peer_config(result: EnableResult) -> Result<PeerConfig> {
    let config = result
        .config
        .ok_or_else(|| Error::Protocol("enable response has no config".to_string()))?;

    let peer = config
        .peers
        .into_iter()
        .next()
        .ok_or_else(|| Error::Protocol("enable response has no peers".to_string()))?;
    if peer.public_key.is_empty() {
        return Err(Error::Protocol("peer public key is empty".to_string()));
    }
    let endpoint_host = peer.endpoint.map(|e| e.host).unwrap_or_default();

    let addresses = config
        .interface
        .and_then(|i| i.addresses)
        .ok_or_else(|| Error::Protocol("enable response has no interface addresses".to_string()))?;
    if addresses.v4.is_empty() || addresses.v6.is_empty() {
        return Err(Error::Protocol("interface addresses are empty".to_string()));
    }

    Ok(PeerConfig {
        peer_public_key: peer.public_key,
        endpoint_host,
        client_ipv4: addresses.v4,
        client_ipv6: addresses.v6,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{patch, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const API_VERSION: &str = "v0i1909051800";

    #[derive(Default)]
    struct Mock {
        register_calls: AtomicU32,
        enable_calls: AtomicU32,
        /// Register calls that fail with 500 before one succeeds
        register_failures: u32,
        register_body: Mutex<Option<Value>>,
        register_response: Option<Value>,
        enable_response: Option<Value>,
        enable_status: Option<StatusCode>,
        register_delay: Option<Duration>,
    }

    fn default_enable_response() -> Value {
        json!({
            "result": {
                "config": {
                    "peers": [{
                        "public_key": "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=",
                        "endpoint": {"host": "engage.cloudflareclient.com:2408"}
                    }],
                    "interface": {"addresses": {"v4": "172.16.0.2", "v6": "2606:4700:110:8a36::2"}}
                }
            }
        })
    }

    async fn register_handler(State(mock): State<Arc<Mock>>, Json(body): Json<Value>) -> impl IntoResponse {
        let n = mock.register_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *mock.register_body.lock().unwrap() = Some(body);
        if let Some(delay) = mock.register_delay {
            tokio::time::sleep(delay).await;
        }
        if n <= mock.register_failures {
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"})));
        }
        let body = mock
            .register_response
            .clone()
            .unwrap_or_else(|| json!({"result": {"id": "dev-123", "token": "tok-abc"}}));
        (StatusCode::OK, Json(body))
    }

    async fn enable_handler(
        State(mock): State<Arc<Mock>>,
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> impl IntoResponse {
        mock.enable_calls.fetch_add(1, Ordering::SeqCst);
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if id != "dev-123" || auth != "Bearer tok-abc" || body != json!({"warp_enabled": true}) {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad session"})));
        }
        if let Some(status) = mock.enable_status {
            return (status, Json(json!({"error": "nope"})));
        }
        let body = mock
            .enable_response
            .clone()
            .unwrap_or_else(default_enable_response);
        (StatusCode::OK, Json(body))
    }

    async fn spawn_mock(mock: Arc<Mock>) -> String {
        let app = Router::new()
            .route(&format!("/{}/reg", API_VERSION), post(register_handler))
            .route(&format!("/{}/reg/:id", API_VERSION), patch(enable_handler))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(api_base: String, retry: RetryConfig) -> RegistrationClient {
        let config = RegistrationConfig {
            api_base,
            timeout_secs: 1,
            retry,
            ..Default::default()
        };
        RegistrationClient::new(&config).unwrap()
    }

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_provision_success() {
        let mock = Arc::new(Mock::default());
        let base = spawn_mock(mock.clone()).await;
        let client = client(base, RetryConfig::default());

        let peer = client.provision("Y2xpZW50LXB1YmxpYy1rZXk=").await.unwrap();
        assert_eq!(peer.peer_public_key, "bmXOC+F1FxEMF9dyiK2H5/1SUtzH0JuVo51h2wPfgyo=");
        assert_eq!(peer.endpoint_host, "engage.cloudflareclient.com:2408");
        assert_eq!(peer.client_ipv4, "172.16.0.2");
        assert_eq!(peer.client_ipv6, "2606:4700:110:8a36::2");

        let body = mock.register_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["key"], "Y2xpZW50LXB1YmxpYy1rZXk=");
        assert_eq!(body["type"], "ios");
        assert_eq!(body["locale"], "en_US");
        assert_eq!(body["install_id"], "");
        assert!(body["tos"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_register_missing_token_is_protocol_error() {
        let mock = Arc::new(Mock {
            register_response: Some(json!({"result": {"id": "dev-123"}})),
            ..Default::default()
        });
        let base = spawn_mock(mock.clone()).await;

        let err = client(base, RetryConfig::default())
            .provision("key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(mock.enable_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_peers_is_protocol_error() {
        let mock = Arc::new(Mock {
            enable_response: Some(json!({
                "result": {"config": {"peers": [], "interface": {"addresses": {"v4": "a", "v6": "b"}}}}
            })),
            ..Default::default()
        });
        let base = spawn_mock(mock).await;

        let err = client(base, RetryConfig::default())
            .provision("key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_missing_interface_is_protocol_error() {
        let mock = Arc::new(Mock {
            enable_response: Some(json!({
                "result": {"config": {"peers": [{"public_key": "pk", "endpoint": {"host": "h:1"}}]}}
            })),
            ..Default::default()
        });
        let base = spawn_mock(mock).await;

        let err = client(base, RetryConfig::default())
            .provision("key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let mock = Arc::new(Mock {
            register_failures: 1,
            ..Default::default()
        });
        let base = spawn_mock(mock.clone()).await;

        let err = client(base, RetryConfig::default())
            .provision("key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(mock.register_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_is_not_retried() {
        let mock = Arc::new(Mock {
            enable_status: Some(StatusCode::BAD_GATEWAY),
            ..Default::default()
        });
        let base = spawn_mock(mock.clone()).await;

        let err = client(base, fast_retry(3)).provision("key").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(mock.register_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.enable_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_retried_on_transport_error() {
        let mock = Arc::new(Mock {
            register_failures: 2,
            ..Default::default()
        });
        let base = spawn_mock(mock.clone()).await;

        let peer = client(base, fast_retry(3)).provision("key").await.unwrap();
        assert_eq!(peer.client_ipv4, "172.16.0.2");
        assert_eq!(mock.register_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_protocol_error_not_retried() {
        let mock = Arc::new(Mock {
            register_response: Some(json!({"unexpected": true})),
            ..Default::default()
        });
        let base = spawn_mock(mock.clone()).await;

        let err = client(base, fast_retry(3)).provision("key").await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert_eq!(mock.register_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let mock = Arc::new(Mock {
            register_delay: Some(Duration::from_secs(3)),
            ..Default::default()
        });
        let base = spawn_mock(mock).await;

        let err = client(base, RetryConfig::default())
            .provision("key")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(format!("http://{}", addr), RetryConfig::default())
            .register("key")
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_register_request_shape() {
        let value = serde_json::to_value(RegisterRequest::new("pub")).unwrap();
        assert_eq!(value["key"], "pub");
        assert_eq!(value["fcm_token"], "");
        assert_eq!(value["type"], "ios");
        assert!(value.get("device_type").is_none());
    }
}
