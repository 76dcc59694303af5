//! Broker REST gateway with ordered transport fallback.
//!
//! Each call walks the transport list in order:
//! - transport failure, non-JSON body, or non-2xx JSON without the broker
//!   envelope: record the attempt and try the next transport
//! - 2xx JSON: return the body
//! - non-2xx JSON carrying the broker `status` key: return
//!   [`GatewayError::Api`] without trying further transports

use std::time::Instant;

use kdesk_core::{ApiAuth, OrderParams};
use kdesk_telemetry::Metrics;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{GatewayError, GatewayResult, TransportAttempt};
use crate::response;
use crate::transport::{BrokerRequest, DynTransport, RawResponse};

pub const PROFILE_ENDPOINT: &str = "/user/profile";
pub const POSITIONS_ENDPOINT: &str = "/portfolio/positions";
pub const ORDERS_ENDPOINT: &str = "/orders/regular";
pub const SESSION_TOKEN_ENDPOINT: &str = "/session/token";

/// How a single transport response is treated.
#[derive(Debug)]
enum Verdict {
    Success(Value),
    Api(GatewayError),
    Unusable(String),
}

fn classify(raw: RawResponse) -> Verdict {
    let body: Value = match serde_json::from_str(&raw.body) {
        Ok(body) => body,
        Err(_) => return Verdict::Unusable(format!("non-JSON response (HTTP {})", raw.status)),
    };

    if (200..300).contains(&raw.status) {
        return Verdict::Success(body);
    }

    if body.get("status").is_some() {
        return Verdict::Api(GatewayError::Api {
            status: raw.status,
            error_type: body
                .get("error_type")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: response::message(&body)
                .unwrap_or(response::DEFAULT_FAILURE_MESSAGE)
                .to_string(),
        });
    }

    Verdict::Unusable(format!("HTTP {} without broker envelope", raw.status))
}

/// Executes broker calls over an injected, ordered list of transports.
pub struct BrokerGateway {
    transports: Vec<DynTransport>,
}

impl BrokerGateway {
    pub fn new(transports: Vec<DynTransport>) -> Self {
        Self { transports }
    }

    pub fn transport_names(&self) -> Vec<String> {
        self.transports.iter().map(|t| t.name().to_string()).collect()
    }

    /// Run `request` through the transport chain.
    pub async fn call(
        &self,
        request: &BrokerRequest,
        auth: Option<&ApiAuth>,
    ) -> GatewayResult<Value> {
        let authorization = auth.map(ApiAuth::authorization);
        let started = Instant::now();
        let mut attempts = Vec::with_capacity(self.transports.len());

        for transport in &self.transports {
            let name = transport.name();
            let reason = match transport.send(request, authorization.as_deref()).await {
                Ok(raw) => match classify(raw) {
                    Verdict::Success(body) => {
                        Metrics::transport_attempt(name, "ok");
                        Metrics::broker_request_duration(
                            &request.endpoint,
                            started.elapsed().as_secs_f64() * 1000.0,
                        );
                        debug!(transport = %name, endpoint = %request.endpoint, "Broker call succeeded");
                        return Ok(body);
                    }
                    Verdict::Api(err) => {
                        Metrics::transport_attempt(name, "api_error");
                        info!(transport = %name, endpoint = %request.endpoint, error = %err, "Broker returned an error");
                        return Err(err);
                    }
                    Verdict::Unusable(reason) => reason,
                },
                Err(reason) => reason,
            };

            Metrics::transport_attempt(name, "transport_error");
            warn!(
                transport = %name,
                endpoint = %request.endpoint,
                %reason,
                "Transport failed, trying next"
            );
            attempts.push(TransportAttempt {
                transport: name.to_string(),
                reason,
            });
        }

        Err(GatewayError::Transport { attempts })
    }

    /// `GET /user/profile`
    pub async fn profile(&self, auth: &ApiAuth) -> GatewayResult<Value> {
        self.call(&BrokerRequest::get(PROFILE_ENDPOINT), Some(auth))
            .await
    }

    /// `GET /portfolio/positions`
    pub async fn positions(&self, auth: &ApiAuth) -> GatewayResult<Value> {
        self.call(&BrokerRequest::get(POSITIONS_ENDPOINT), Some(auth))
            .await
    }

    /// `POST /orders/regular`
    pub async fn place_order(&self, auth: &ApiAuth, params: &OrderParams) -> GatewayResult<Value> {
        let request = BrokerRequest::post(ORDERS_ENDPOINT, params.to_form_fields());
        self.call(&request, Some(auth)).await
    }

    /// `POST /session/token`. Unauthenticated.
    pub async fn exchange_token(
        &self,
        api_key: &str,
        request_token: &str,
        checksum: &str,
    ) -> GatewayResult<Value> {
        let request = BrokerRequest::post(
            SESSION_TOKEN_ENDPOINT,
            vec![
                ("api_key".to_string(), api_key.to_string()),
                ("request_token".to_string(), request_token.to_string()),
                ("checksum".to_string(), checksum.to_string()),
            ],
        );
        self.call(&request, None).await
    }
}
