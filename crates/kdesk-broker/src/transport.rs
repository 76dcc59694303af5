//! Transports for broker REST calls.
//!
//! A transport turns a [`BrokerRequest`] into one HTTP exchange and reports
//! either the raw response or a transport-level failure. Classifying the
//! response (success, broker error, unusable) is the gateway's job.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Default timeout for broker requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Broker API version header value.
pub const DEFAULT_KITE_VERSION: &str = "3";

/// Production broker API host.
pub const DEFAULT_API_BASE_URL: &str = "https://api.kite.trade";

// ============================================================================
// Request / response
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// A broker call, independent of how it reaches the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRequest {
    pub method: HttpMethod,
    /// Path below the broker host, e.g. `/user/profile`.
    pub endpoint: String,
    /// Form fields for POST bodies, in submission order.
    pub form: Vec<(String, String)>,
}

impl BrokerRequest {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            endpoint: endpoint.into(),
            form: Vec::new(),
        }
    }

    pub fn post(endpoint: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: HttpMethod::Post,
            endpoint: endpoint.into(),
            form,
        }
    }
}

/// Status and body as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Sends broker requests over one route.
pub trait Transport: Send + Sync {
    /// Name used in logs, metrics and error reports.
    fn name(&self) -> &str;

    /// Issue `request`. `Err` carries the reason the exchange failed below
    /// the HTTP layer (connect error, timeout, TLS).
    fn send<'a>(
        &'a self,
        request: &'a BrokerRequest,
        authorization: Option<&'a str>,
    ) -> BoxFuture<'a, Result<RawResponse, String>>;
}

/// Arc wrapper for Transport trait objects.
pub type DynTransport = Arc<dyn Transport>;

// ============================================================================
// Configuration
// ============================================================================

/// One entry of the ordered transport list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// `<api_base_url><endpoint>`
    Direct,
    /// `<prefix><api_base_url><endpoint>`, e.g. a public CORS relay.
    Prefixed { prefix: String },
    /// `<base_url><endpoint>`, e.g. the local relay's `/api` root.
    Relay { base_url: String },
}

impl TransportConfig {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Prefixed { .. } => "prefixed",
            Self::Relay { .. } => "relay",
        }
    }

    /// Default order: direct, public CORS relay, local relay.
    pub fn default_chain() -> Vec<TransportConfig> {
        vec![
            Self::Direct,
            Self::Prefixed {
                prefix: "https://cors-anywhere.herokuapp.com/".to_string(),
            },
            Self::Relay {
                base_url: "http://localhost:3001/api".to_string(),
            },
        ]
    }

    fn base_url(&self, api_base_url: &str) -> String {
        let api_base_url = api_base_url.trim_end_matches('/');
        match self {
            Self::Direct => api_base_url.to_string(),
            Self::Prefixed { prefix } => format!("{prefix}{api_base_url}"),
            Self::Relay { base_url } => base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Shared settings for building HTTP transports.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub api_base_url: String,
    pub kite_version: String,
    pub timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            kite_version: DEFAULT_KITE_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Build the ordered transport list from configuration.
///
/// All transports share one connection pool.
pub fn build_transports(
    configs: &[TransportConfig],
    settings: &HttpSettings,
) -> GatewayResult<Vec<DynTransport>> {
    let client = Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| GatewayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

    Ok(configs
        .iter()
        .map(|config| {
            Arc::new(HttpTransport::new(
                client.clone(),
                config.name(),
                config.base_url(&settings.api_base_url),
                settings.kite_version.clone(),
            )) as DynTransport
        })
        .collect())
}

// ============================================================================
// HttpTransport
// ============================================================================

/// reqwest-backed transport rooted at a fixed base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    name: String,
    base_url: String,
    kite_version: String,
}

impl HttpTransport {
    pub fn new(
        client: Client,
        name: impl Into<String>,
        base_url: impl Into<String>,
        kite_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            base_url: base_url.into(),
            kite_version: kite_version.into(),
        }
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

impl Transport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(
        &'a self,
        request: &'a BrokerRequest,
        authorization: Option<&'a str>,
    ) -> BoxFuture<'a, Result<RawResponse, String>> {
        Box::pin(async move {
            let url = self.url_for(&request.endpoint);
            debug!(transport = %self.name, method = request.method.as_str(), %url, "Sending broker request");

            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&url),
                HttpMethod::Post => self.client.post(&url).form(&request.form),
            };
            builder = builder.header("X-Kite-Version", &self.kite_version);
            if let Some(authorization) = authorization {
                builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| format!("HTTP request failed: {e}"))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| format!("Failed to read response body: {e}"))?;

            Ok(RawResponse { status, body })
        })
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Scripted outcome for [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Respond { status: u16, body: String },
    Fail(String),
}

impl MockOutcome {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond {
            status,
            body: body.to_string(),
        }
    }
}

/// Call recorded by [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub request: BrokerRequest,
    pub authorization: Option<String>,
}

/// Mock transport for testing.
///
/// Answers per endpoint, falling back to a default outcome, and records
/// every call.
#[derive(Debug)]
pub struct MockTransport {
    name: String,
    default_outcome: Mutex<MockOutcome>,
    routes: Mutex<HashMap<String, MockOutcome>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Create a mock that fails every call until configured.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_outcome: Mutex::new(MockOutcome::Fail("connection refused".to_string())),
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that fails every call with `reason`.
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mock = Self::new(name);
        mock.set_default(MockOutcome::Fail(reason.into()));
        mock
    }

    pub fn set_default(&self, outcome: MockOutcome) {
        *self.default_outcome.lock() = outcome;
    }

    /// Answer `endpoint` with `outcome`.
    pub fn on(&self, endpoint: impl Into<String>, outcome: MockOutcome) {
        self.routes.lock().insert(endpoint.into(), outcome);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of calls made to `endpoint`.
    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.request.endpoint == endpoint)
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(
        &'a self,
        request: &'a BrokerRequest,
        authorization: Option<&'a str>,
    ) -> BoxFuture<'a, Result<RawResponse, String>> {
        Box::pin(async move {
            self.calls.lock().push(RecordedCall {
                request: request.clone(),
                authorization: authorization.map(str::to_string),
            });

            let outcome = self
                .routes
                .lock()
                .get(&request.endpoint)
                .cloned()
                .unwrap_or_else(|| self.default_outcome.lock().clone());

            match outcome {
                MockOutcome::Respond { status, body } => Ok(RawResponse { status, body }),
                MockOutcome::Fail(reason) => Err(reason),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_transport_config_serde() {
        let raw = r#"[
            {"kind": "direct"},
            {"kind": "prefixed", "prefix": "https://proxy.example/"},
            {"kind": "relay", "base_url": "http://localhost:3001/api"}
        ]"#;
        let configs: Vec<TransportConfig> = serde_json::from_str(raw).unwrap();
        assert_eq!(
            configs,
            vec![
                TransportConfig::Direct,
                TransportConfig::Prefixed {
                    prefix: "https://proxy.example/".to_string(),
                },
                TransportConfig::Relay {
                    base_url: "http://localhost:3001/api".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_base_urls() {
        let api = "https://api.kite.trade/";
        assert_eq!(TransportConfig::Direct.base_url(api), "https://api.kite.trade");
        assert_eq!(
            TransportConfig::Prefixed {
                prefix: "https://proxy.example/".to_string()
            }
            .base_url(api),
            "https://proxy.example/https://api.kite.trade"
        );
        assert_eq!(
            TransportConfig::Relay {
                base_url: "http://localhost:3001/api/".to_string()
            }
            .base_url(api),
            "http://localhost:3001/api"
        );
    }

    #[test]
    fn test_build_transports_keeps_order() {
        let transports =
            build_transports(&TransportConfig::default_chain(), &HttpSettings::default()).unwrap();
        let names: Vec<&str> = transports.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["direct", "prefixed", "relay"]);
    }

    #[tokio::test]
    async fn test_http_transport_get_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/profile"))
            .and(header("X-Kite-Version", "3"))
            .and(header("Authorization", "token k:t"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"status": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), "direct", server.uri(), "3");
        let request = BrokerRequest::get("/user/profile");
        let response = transport.send(&request, Some("token k:t")).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(response.body.contains("success"));
    }

    #[tokio::test]
    async fn test_http_transport_post_is_form_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("variety=regular&quantity=50"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Client::new(), "direct", server.uri(), "3");
        let request = BrokerRequest::post(
            "/orders/regular",
            vec![
                ("variety".to_string(), "regular".to_string()),
                ("quantity".to_string(), "50".to_string()),
            ],
        );
        let response = transport.send(&request, None).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_http_transport_connect_failure_is_err() {
        let client = Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        // Port 9 (discard) on localhost is not listening in test environments.
        let transport = HttpTransport::new(client, "direct", "http://127.0.0.1:9", "3");
        let request = BrokerRequest::get("/user/profile");
        assert!(transport.send(&request, None).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_transport_routes_and_records() {
        let mock = MockTransport::new("mock");
        mock.on("/user/profile", MockOutcome::json(200, json!({"data": {}})));

        let ok = mock
            .send(&BrokerRequest::get("/user/profile"), Some("token a:b"))
            .await;
        assert_eq!(ok.unwrap().status, 200);

        let err = mock.send(&BrokerRequest::get("/portfolio/positions"), None).await;
        assert_eq!(err.unwrap_err(), "connection refused");

        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.calls_to("/user/profile"), 1);
        assert_eq!(mock.calls()[0].authorization.as_deref(), Some("token a:b"));
    }
}
