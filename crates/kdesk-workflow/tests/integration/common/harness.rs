//! Fully wired deployer over mock transports.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use kdesk_broker::{
    BrokerGateway, DynTransport, MockOutcome, MockTransport, RecordingNotifier, SessionManager,
    DEFAULT_LOGIN_BASE_URL, ORDERS_ENDPOINT, POSITIONS_ENDPOINT, PROFILE_ENDPOINT,
};
use kdesk_core::{Algorithm, AlgorithmDraft, FixedClock};
use kdesk_store::{AlgorithmStore, CredentialStore, DeploymentRegistry, MemoryKvStore};
use kdesk_workflow::{Deployer, MonitorSet, OrderWorkflow};
use serde_json::json;

pub const PERIOD: Duration = Duration::from_secs(30);

/// Monday 2026-02-09 10:00 IST, inside market hours.
pub fn market_open() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(5 * 3600 + 1800)
        .unwrap()
        .with_ymd_and_hms(2026, 2, 9, 10, 0, 0)
        .unwrap()
}

/// Saturday 2026-02-07 10:00 IST.
pub fn market_closed() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(5 * 3600 + 1800)
        .unwrap()
        .with_ymd_and_hms(2026, 2, 7, 10, 0, 0)
        .unwrap()
}

pub struct Harness {
    pub kv: Arc<MemoryKvStore>,
    pub algorithms: Arc<AlgorithmStore>,
    pub registry: Arc<DeploymentRegistry>,
    pub session: Arc<SessionManager>,
    pub monitors: Arc<MonitorSet>,
    pub orders: Arc<OrderWorkflow>,
    pub deployer: Deployer,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<FixedClock>,
    /// Direct, prefixed and relay transports in chain order.
    pub transports: [Arc<MockTransport>; 3],
}

impl Harness {
    /// Wire everything with credentials present. All transports fail until
    /// configured.
    pub fn new() -> Self {
        let kv = Arc::new(MemoryKvStore::new());
        let credentials = Arc::new(CredentialStore::open(kv.clone()).unwrap());
        credentials
            .update(|c| {
                c.api_key = "k".to_string();
                c.access_token = "t".to_string();
            })
            .unwrap();
        let algorithms = Arc::new(AlgorithmStore::open(kv.clone()).unwrap());
        let registry = Arc::new(DeploymentRegistry::open(kv.clone()).unwrap());

        let transports = [
            Arc::new(MockTransport::failing("direct", "cors blocked")),
            Arc::new(MockTransport::failing("prefixed", "proxy unreachable")),
            Arc::new(MockTransport::failing("relay", "connection refused")),
        ];
        let gateway = Arc::new(BrokerGateway::new(
            transports
                .iter()
                .map(|t| t.clone() as DynTransport)
                .collect(),
        ));

        let notifier = Arc::new(RecordingNotifier::new());
        let session = Arc::new(SessionManager::new(
            credentials.clone(),
            gateway.clone(),
            notifier.clone(),
            DEFAULT_LOGIN_BASE_URL,
        ));
        let clock = Arc::new(FixedClock::new(market_open()));
        let monitors = Arc::new(MonitorSet::new(
            registry.clone(),
            credentials.clone(),
            gateway.clone(),
            PERIOD,
        ));
        let orders = Arc::new(OrderWorkflow::new(
            credentials.clone(),
            gateway,
            registry.clone(),
            monitors.clone(),
            clock.clone(),
        ));
        let deployer = Deployer::new(
            algorithms.clone(),
            registry.clone(),
            credentials,
            session.clone(),
            orders.clone(),
            monitors.clone(),
            notifier.clone(),
            clock.clone(),
            50,
        );

        Self {
            kv,
            algorithms,
            registry,
            session,
            monitors,
            orders,
            deployer,
            notifier,
            clock,
            transports,
        }
    }

    /// The relay answers profile, orders and positions.
    pub fn relay_serves_everything(&self) {
        let relay = &self.transports[2];
        relay.on(
            PROFILE_ENDPOINT,
            MockOutcome::json(
                200,
                json!({"status": "success", "data": {"user_id": "AB1234", "user_name": "Asha"}}),
            ),
        );
        relay.on(
            ORDERS_ENDPOINT,
            MockOutcome::json(200, json!({"status": "success", "data": {"order_id": "X"}})),
        );
        relay.on(
            POSITIONS_ENDPOINT,
            MockOutcome::json(
                200,
                json!({"status": "success", "data": {"net": [
                    {"tradingsymbol": "NIFTY26FEBFUT", "quantity": 50, "average_price": 200.0, "last_price": 204.0, "pnl": 200.0}
                ]}}),
            ),
        );
    }

    pub async fn connect(&self) {
        self.session.connect().await.unwrap();
    }

    pub fn save_algorithm(&self, name: &str) -> Algorithm {
        self.algorithms
            .save_at(
                AlgorithmDraft {
                    id: None,
                    name: name.to_string(),
                    description: String::new(),
                    code: "def main():\n    pass\n".to_string(),
                },
                Utc::now(),
            )
            .unwrap()
    }

    pub fn calls_to(&self, endpoint: &str) -> usize {
        self.transports.iter().map(|t| t.calls_to(endpoint)).sum()
    }
}
