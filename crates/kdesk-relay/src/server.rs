//! Relay HTTP server implementation using axum.
//!
//! `ANY /api/{*path}` is forwarded to `<upstream_base_url>/<path>?<query>`
//! with the caller's `Authorization` header and the broker version header.
//! The path is taken from the raw request URI, so percent-encoded segments
//! reach the upstream unchanged.
//! JSON bodies are re-encoded as form fields; the upstream status and JSON
//! body are returned as-is.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{OriginalUri, RawQuery, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::any;
use axum::Router;
use kdesk_telemetry::Metrics;
use reqwest::Client;
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Shared state for relay handlers.
#[derive(Clone)]
pub struct RelayState {
    client: Client,
    upstream_base_url: String,
    kite_version: String,
}

impl RelayState {
    pub fn new(config: &RelayConfig) -> RelayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::HttpClient(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            upstream_base_url: config.upstream_base_url.trim_end_matches('/').to_string(),
            kite_version: config.kite_version.clone(),
        })
    }

    fn upstream_url(&self, path: &str, query: Option<&str>) -> String {
        let mut url = format!("{}/{}", self.upstream_base_url, path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

/// Create the relay router.
pub fn create_router(state: RelayState) -> Router {
    Router::new()
        .route("/api/{*path}", any(relay))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Outgoing request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamBody {
    Empty,
    Form(Vec<(String, String)>),
    Raw(Bytes),
}

fn form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Decide how the incoming body is sent upstream.
///
/// JSON objects become form fields in key order; form bodies pass through.
pub fn upstream_body(headers: &HeaderMap, body: Bytes) -> RelayResult<UpstreamBody> {
    if body.is_empty() {
        return Ok(UpstreamBody::Empty);
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        return Ok(UpstreamBody::Raw(body));
    }

    let value: Value =
        serde_json::from_slice(&body).map_err(|e| RelayError::InvalidBody(e.to_string()))?;
    match value {
        Value::Object(fields) => Ok(UpstreamBody::Form(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), form_value(v)))
                .collect(),
        )),
        _ => Err(RelayError::InvalidBody(
            "JSON body must be an object".to_string(),
        )),
    }
}

async fn relay(
    State(state): State<RelayState>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().strip_prefix("/api").unwrap_or(uri.path());
    let method_label = method.to_string();
    let response = match forward(&state, method, path, query.as_deref(), &headers, body).await {
        Ok(response) => response,
        Err(e) => {
            warn!(%path, error = %e, "Relay request failed");
            e.into_response()
        }
    };
    Metrics::relay_request(&method_label, response.status().as_u16());
    response
}

async fn forward(
    state: &RelayState,
    method: Method,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Bytes,
) -> RelayResult<Response> {
    let url = state.upstream_url(path, query);
    info!(%method, %url, "Relaying request");

    let mut request = state
        .client
        .request(method, &url)
        .header("X-Kite-Version", &state.kite_version);
    if let Some(authorization) = headers.get(header::AUTHORIZATION) {
        request = request.header(header::AUTHORIZATION, authorization.clone());
    }

    request = match upstream_body(headers, body)? {
        UpstreamBody::Empty => request,
        UpstreamBody::Form(fields) => request.form(&fields),
        UpstreamBody::Raw(bytes) => request
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(bytes),
    };

    let upstream = request
        .send()
        .await
        .map_err(|e| RelayError::Upstream(e.to_string()))?;
    let status = upstream.status();
    let bytes = upstream
        .bytes()
        .await
        .map_err(|e| RelayError::Upstream(e.to_string()))?;
    let data: Value = serde_json::from_slice(&bytes)
        .map_err(|_| RelayError::NonJsonResponse(status.as_u16()))?;

    debug!(status = status.as_u16(), "Upstream responded");
    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    Ok((status, Json(data)).into_response())
}

/// Run the relay HTTP server.
pub async fn run_relay(config: RelayConfig) -> RelayResult<()> {
    let state = RelayState::new(&config)?;
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        port = config.port,
        upstream = %config.upstream_base_url,
        "Starting relay server, use http://localhost:{}/api",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string, header as header_eq, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn router_for(upstream: &str) -> Router {
        let config = RelayConfig {
            upstream_base_url: upstream.to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        create_router(RelayState::new(&config).unwrap())
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_json_is_reencoded_as_form() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders/regular"))
            .and(header_eq("Authorization", "token k:t"))
            .and(header_eq("X-Kite-Version", "3"))
            .and(header_eq("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("variety=regular&quantity=50&tradingsymbol=TCS"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "success", "data": {"order_id": "X"}})),
            )
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/orders/regular")
            .header("Authorization", "token k:t")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"variety": "regular", "quantity": 50, "tradingsymbol": "TCS"}).to_string(),
            ))
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["order_id"], "X");
    }

    #[tokio::test]
    async fn test_upstream_status_passthrough() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/profile"))
            .respond_with(ResponseTemplate::new(403).set_body_json(
                json!({"status": "error", "error_type": "TokenException", "message": "Invalid token"}),
            ))
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .uri("/api/user/profile")
            .body(Body::empty())
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_type"], "TokenException");
    }

    #[tokio::test]
    async fn test_query_string_is_forwarded() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/portfolio/positions"))
            .and(query_param("segment", "nfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .uri("/api/portfolio/positions?segment=nfo")
            .body(Body::empty())
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_encoded_path_segments_are_forwarded_verbatim() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instruments/NSE%2FX"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .uri("/api/instruments/NSE%2FX")
            .body(Body::empty())
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_body_passes_through() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session/token"))
            .and(body_string("api_key=K&request_token=R"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
            .expect(1)
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/session/token")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("api_key=K&request_token=R"))
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_json_upstream_is_proxy_error() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&upstream)
            .await;

        let request = Request::builder()
            .uri("/api/user/profile")
            .body(Body::empty())
            .unwrap();

        let response = router_for(&upstream.uri()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"], "Proxy server error");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_proxy_error() {
        let request = Request::builder()
            .uri("/api/user/profile")
            .body(Body::empty())
            .unwrap();

        let response = router_for("http://127.0.0.1:9")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Proxy server error");
        assert!(body["message"].as_str().unwrap().contains("Upstream"));
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/orders/regular")
            .header("Origin", "http://localhost:8000")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();

        let response = router_for("http://127.0.0.1:9")
            .oneshot(request)
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(response
            .headers()
            .contains_key("access-control-allow-origin"));
    }

    #[test]
    fn test_upstream_body_rules() {
        let mut json_headers = HeaderMap::new();
        json_headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());

        let body = upstream_body(
            &json_headers,
            Bytes::from(r#"{"a":"x","b":1,"c":true,"d":null,"e":[1,2]}"#),
        )
        .unwrap();
        assert_eq!(
            body,
            UpstreamBody::Form(vec![
                ("a".to_string(), "x".to_string()),
                ("b".to_string(), "1".to_string()),
                ("c".to_string(), "true".to_string()),
                ("d".to_string(), String::new()),
                ("e".to_string(), "[1,2]".to_string()),
            ])
        );

        assert_eq!(
            upstream_body(&json_headers, Bytes::new()).unwrap(),
            UpstreamBody::Empty
        );
        assert!(matches!(
            upstream_body(&json_headers, Bytes::from("[1]")),
            Err(RelayError::InvalidBody(_))
        ));
    }

    #[test]
    fn test_upstream_url() {
        let state = RelayState::new(&RelayConfig {
            upstream_base_url: "https://api.kite.trade/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            state.upstream_url("user/profile", None),
            "https://api.kite.trade/user/profile"
        );
        assert_eq!(
            state.upstream_url("portfolio/positions", Some("a=1")),
            "https://api.kite.trade/portfolio/positions?a=1"
        );
    }
}
