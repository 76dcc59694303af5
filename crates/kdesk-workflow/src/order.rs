//! Order placement.

use std::sync::Arc;

use kdesk_broker::{response, BrokerGateway};
use kdesk_core::{hhmm, is_market_open_at, Clock, OrderParams, OrderResult, OrderSide};
use kdesk_store::{CredentialStore, DeploymentRegistry};
use kdesk_telemetry::Metrics;
use tracing::{info, warn};

use crate::error::{WorkflowError, WorkflowResult};
use crate::monitor::MonitorSet;

/// Places intraday market orders and binds them to deployments.
pub struct OrderWorkflow {
    credentials: Arc<CredentialStore>,
    gateway: Arc<BrokerGateway>,
    registry: Arc<DeploymentRegistry>,
    monitors: Arc<MonitorSet>,
    clock: Arc<dyn Clock>,
}

impl OrderWorkflow {
    pub fn new(
        credentials: Arc<CredentialStore>,
        gateway: Arc<BrokerGateway>,
        registry: Arc<DeploymentRegistry>,
        monitors: Arc<MonitorSet>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            gateway,
            registry,
            monitors,
            clock,
        }
    }

    pub fn is_market_open(&self) -> bool {
        kdesk_core::is_market_open(self.clock.as_ref())
    }

    /// Place a market order.
    ///
    /// With a `deployment_id`, a successful order adds one trade to that
    /// deployment and starts its position monitor. Nothing is sent when the
    /// market is closed or credentials are incomplete.
    pub async fn place_order(
        &self,
        deployment_id: Option<&str>,
        symbol: &str,
        side: OrderSide,
        quantity: u32,
    ) -> WorkflowResult<OrderResult> {
        let now = self.clock.now();
        if !is_market_open_at(&now) {
            Metrics::order("market_closed");
            return Err(WorkflowError::MarketClosed {
                now_hhmm: hhmm(&now),
            });
        }

        if symbol.trim().is_empty() {
            return Err(WorkflowError::InvalidOrder("symbol is required".to_string()));
        }
        if quantity == 0 {
            return Err(WorkflowError::InvalidOrder(
                "quantity must be positive".to_string(),
            ));
        }

        let auth = self.credentials.get().api_auth().ok_or_else(|| {
            WorkflowError::Config("API key and access token are required".to_string())
        })?;

        let params = OrderParams::market(symbol.trim(), side, quantity);
        info!(
            symbol = %params.tradingsymbol,
            exchange = %params.exchange,
            side = %params.side,
            quantity = params.quantity,
            deployment_id = deployment_id.unwrap_or("-"),
            "Placing order"
        );

        let body = match self.gateway.place_order(&auth, &params).await {
            Ok(body) => body,
            Err(e) => {
                Metrics::order("failed");
                return Err(e.into());
            }
        };

        let Some(order_id) = response::order_id(&body) else {
            Metrics::order("rejected");
            let message = response::message(&body)
                .unwrap_or("Order placement failed")
                .to_string();
            warn!(symbol = %params.tradingsymbol, %message, "Order rejected");
            return Err(WorkflowError::Rejected(message));
        };

        Metrics::order("placed");
        info!(%order_id, symbol = %params.tradingsymbol, "Order placed");

        if let Some(deployment_id) = deployment_id {
            if self.registry.increment_trades(deployment_id)? {
                self.monitors.start(deployment_id);
            } else {
                warn!(deployment_id, %order_id, "Deployment removed while order was in flight");
            }
        }

        Ok(OrderResult { order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone, Utc};
    use kdesk_broker::{DynTransport, MockOutcome, MockTransport, ORDERS_ENDPOINT};
    use kdesk_core::{Algorithm, FixedClock};
    use kdesk_store::MemoryKvStore;
    use serde_json::json;
    use std::time::Duration;

    fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(5 * 3600 + 1800)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    struct Harness {
        workflow: OrderWorkflow,
        registry: Arc<DeploymentRegistry>,
        transport: Arc<MockTransport>,
        monitors: Arc<MonitorSet>,
        clock: Arc<FixedClock>,
    }

    fn harness(with_token: bool) -> Harness {
        let kv = Arc::new(MemoryKvStore::new());
        let credentials = Arc::new(CredentialStore::open(kv.clone()).unwrap());
        credentials
            .update(|c| {
                c.api_key = "k".to_string();
                if with_token {
                    c.access_token = "t".to_string();
                }
            })
            .unwrap();
        let registry = Arc::new(DeploymentRegistry::open(kv).unwrap());
        let transport = Arc::new(MockTransport::new("mock"));
        let gateway = Arc::new(BrokerGateway::new(vec![transport.clone() as DynTransport]));
        let monitors = Arc::new(MonitorSet::new(
            registry.clone(),
            credentials.clone(),
            gateway.clone(),
            Duration::from_secs(30),
        ));
        let clock = Arc::new(FixedClock::new(ist(2026, 2, 9, 10, 0)));
        let workflow = OrderWorkflow::new(
            credentials,
            gateway,
            registry.clone(),
            monitors.clone(),
            clock.clone(),
        );
        Harness {
            workflow,
            registry,
            transport,
            monitors,
            clock,
        }
    }

    fn algorithm() -> Algorithm {
        let now = Utc.with_ymd_and_hms(2026, 2, 9, 4, 0, 0).unwrap();
        Algorithm {
            id: "a1".to_string(),
            name: "NIFTY Futures Buy".to_string(),
            description: String::new(),
            code: "pass".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_market_closed_sends_nothing() {
        let h = harness(true);
        h.clock.set(ist(2026, 2, 7, 10, 0));

        let err = h
            .workflow
            .place_order(None, "TCS", OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MarketClosed { now_hhmm: 1000 }));

        h.clock.set(ist(2026, 2, 9, 15, 31));
        assert!(!h.workflow.is_market_open());
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_access_token_is_config_error() {
        let h = harness(false);
        let err = h
            .workflow
            .place_order(None, "TCS", OrderSide::Buy, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_payload_fields_in_order() {
        let h = harness(true);
        h.transport.on(
            ORDERS_ENDPOINT,
            MockOutcome::json(200, json!({"status": "success", "data": {"order_id": "42"}})),
        );

        let result = h
            .workflow
            .place_order(None, "reliance", OrderSide::Sell, 3)
            .await
            .unwrap();
        assert_eq!(result.order_id, "42");

        let form = &h.transport.calls()[0].request.form;
        let keys: Vec<&str> = form.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "variety",
                "exchange",
                "tradingsymbol",
                "transaction_type",
                "quantity",
                "product",
                "order_type"
            ]
        );
        let values: Vec<&str> = form.iter().map(|(_, v)| v.as_str()).collect();
        assert_eq!(
            values,
            vec!["regular", "NSE", "RELIANCE", "SELL", "3", "MIS", "MARKET"]
        );
    }

    #[tokio::test]
    async fn test_2xx_without_order_id_is_rejected() {
        let h = harness(true);
        h.transport.on(
            ORDERS_ENDPOINT,
            MockOutcome::json(200, json!({"status": "error", "message": "Margin exceeded"})),
        );
        let dep = h.registry.create(&algorithm(), Utc::now()).unwrap();

        let err = h
            .workflow
            .place_order(Some(&dep.id), "NIFTY26FEBFUT", OrderSide::Buy, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Rejected(ref m) if m == "Margin exceeded"));
        assert_eq!(h.registry.get(&dep.id).unwrap().trades, 0);
        assert!(!h.monitors.contains(&dep.id));
    }

    #[tokio::test]
    async fn test_success_binds_to_deployment() {
        let h = harness(true);
        h.transport.on(
            ORDERS_ENDPOINT,
            MockOutcome::json(200, json!({"status": "success", "data": {"order_id": "X"}})),
        );
        let dep = h.registry.create(&algorithm(), Utc::now()).unwrap();

        h.workflow
            .place_order(Some(&dep.id), "NIFTY26FEBFUT", OrderSide::Buy, 50)
            .await
            .unwrap();

        assert_eq!(h.registry.get(&dep.id).unwrap().trades, 1);
        assert!(h.monitors.contains(&dep.id));
        assert_eq!(h.transport.calls()[0].request.form[1].1, "NFO");
        h.monitors.shutdown();
    }

    #[tokio::test]
    async fn test_order_for_removed_deployment_does_not_start_monitor() {
        let h = harness(true);
        h.transport.on(
            ORDERS_ENDPOINT,
            MockOutcome::json(200, json!({"data": {"order_id": "X"}})),
        );

        let result = h
            .workflow
            .place_order(Some("gone"), "TCS", OrderSide::Buy, 1)
            .await
            .unwrap();
        assert_eq!(result.order_id, "X");
        assert!(h.monitors.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_order_inputs() {
        let h = harness(true);
        assert!(matches!(
            h.workflow.place_order(None, " ", OrderSide::Buy, 1).await,
            Err(WorkflowError::InvalidOrder(_))
        ));
        assert!(matches!(
            h.workflow.place_order(None, "TCS", OrderSide::Buy, 0).await,
            Err(WorkflowError::InvalidOrder(_))
        ));
        assert_eq!(h.transport.call_count(), 0);
    }
}
