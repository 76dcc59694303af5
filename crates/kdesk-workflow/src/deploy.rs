//! Deployment lifecycle: deploy, stop, resume and position refresh.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use kdesk_broker::{response, Notifier, NotifyLevel, SessionManager};
use kdesk_core::{current_nifty_future, Algorithm, Clock, Deployment, OrderResult, OrderSide};
use kdesk_store::{AlgorithmStore, CredentialStore, DeploymentRegistry};
use tracing::{info, warn};

use crate::error::{WorkflowError, WorkflowResult};
use crate::monitor::MonitorSet;
use crate::order::OrderWorkflow;
use crate::positions::{position_rows, PositionRow};

/// Default lot size for the built-in NIFTY futures order.
pub const DEFAULT_NIFTY_LOT_QUANTITY: u32 = 50;

/// The order placed when an algorithm is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
}

impl OrderIntent {
    pub fn new(symbol: impl Into<String>, side: OrderSide, quantity: u32) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
        }
    }

    /// Buy the current-month NIFTY future.
    pub fn nifty_future(date: NaiveDate, quantity: u32) -> Self {
        Self::new(current_nifty_future(&date), OrderSide::Buy, quantity)
    }
}

/// Result of a successful deploy.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployOutcome {
    pub deployment: Deployment,
    pub order: OrderResult,
}

/// Wires the stores, session and order workflow into user actions.
pub struct Deployer {
    algorithms: Arc<AlgorithmStore>,
    registry: Arc<DeploymentRegistry>,
    credentials: Arc<CredentialStore>,
    session: Arc<SessionManager>,
    orders: Arc<OrderWorkflow>,
    monitors: Arc<MonitorSet>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    nifty_lot_quantity: u32,
}

impl Deployer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algorithms: Arc<AlgorithmStore>,
        registry: Arc<DeploymentRegistry>,
        credentials: Arc<CredentialStore>,
        session: Arc<SessionManager>,
        orders: Arc<OrderWorkflow>,
        monitors: Arc<MonitorSet>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        nifty_lot_quantity: u32,
    ) -> Self {
        Self {
            algorithms,
            registry,
            credentials,
            session,
            orders,
            monitors,
            notifier,
            clock,
            nifty_lot_quantity,
        }
    }

    /// Built-in order for algorithms that name NIFTY, `None` otherwise.
    pub fn builtin_intent(&self, algorithm: &Algorithm) -> Option<OrderIntent> {
        algorithm
            .name
            .to_ascii_uppercase()
            .contains("NIFTY")
            .then(|| OrderIntent::nifty_future(self.clock.now().date_naive(), self.nifty_lot_quantity))
    }

    /// Deploy `algorithm_id`, placing `intent` or the built-in order.
    ///
    /// The deployment record is removed again if the order fails.
    pub async fn deploy(
        &self,
        algorithm_id: &str,
        intent: Option<OrderIntent>,
    ) -> WorkflowResult<DeployOutcome> {
        let result = self.try_deploy(algorithm_id, intent).await;
        match &result {
            Ok(outcome) => self.notifier.notify(
                NotifyLevel::Success,
                &format!(
                    "Algorithm '{}' deployed. Order ID: {}",
                    outcome.deployment.algorithm_name, outcome.order.order_id
                ),
            ),
            Err(e) => self
                .notifier
                .notify(NotifyLevel::Error, &format!("Deployment failed: {e}")),
        }
        result
    }

    async fn try_deploy(
        &self,
        algorithm_id: &str,
        intent: Option<OrderIntent>,
    ) -> WorkflowResult<DeployOutcome> {
        let algorithm = self
            .algorithms
            .get(algorithm_id)
            .ok_or_else(|| WorkflowError::AlgorithmNotFound(algorithm_id.to_string()))?;

        if !self.session.is_connected() {
            return Err(WorkflowError::NotConnected);
        }

        let intent = intent
            .or_else(|| self.builtin_intent(&algorithm))
            .ok_or_else(|| WorkflowError::NoOrderIntent(algorithm.name.clone()))?;

        let deployment = self
            .registry
            .create(&algorithm, self.clock.now().with_timezone(&Utc))?;

        let placed = self
            .orders
            .place_order(
                Some(&deployment.id),
                &intent.symbol,
                intent.side,
                intent.quantity,
            )
            .await;

        match placed {
            Ok(order) => {
                info!(
                    deployment_id = %deployment.id,
                    algorithm_id = %algorithm.id,
                    order_id = %order.order_id,
                    "Algorithm deployed"
                );
                let deployment = self.registry.get(&deployment.id).unwrap_or(deployment);
                Ok(DeployOutcome { deployment, order })
            }
            Err(e) => {
                warn!(deployment_id = %deployment.id, error = %e, "Deploy failed, rolling back");
                self.monitors.cancel(&deployment.id);
                self.registry.remove(&deployment.id)?;
                Err(e)
            }
        }
    }

    /// Stop a deployment: cancel its monitor and remove the record.
    pub fn stop(&self, deployment_id: &str) -> WorkflowResult<Deployment> {
        let result = self.try_stop(deployment_id);
        match &result {
            Ok(d) => self.notifier.notify(
                NotifyLevel::Info,
                &format!("Deployment of '{}' stopped", d.algorithm_name),
            ),
            Err(e) => self
                .notifier
                .notify(NotifyLevel::Error, &format!("Stop failed: {e}")),
        }
        result
    }

    fn try_stop(&self, deployment_id: &str) -> WorkflowResult<Deployment> {
        self.monitors.cancel(deployment_id);
        let removed = self
            .registry
            .remove(deployment_id)?
            .ok_or_else(|| WorkflowError::DeploymentNotFound(deployment_id.to_string()))?;
        info!(deployment_id, "Deployment stopped");
        Ok(removed)
    }

    /// Restart monitors for persisted running deployments.
    pub fn resume_monitors(&self) -> usize {
        let running = self.registry.running();
        for deployment in &running {
            self.monitors.start(&deployment.id);
        }
        if !running.is_empty() {
            info!(count = running.len(), "Resumed position monitors");
        }
        running.len()
    }

    /// Fetch open positions for display.
    pub async fn refresh_positions(&self) -> WorkflowResult<Vec<PositionRow>> {
        if !self.session.is_connected() {
            return Err(WorkflowError::NotConnected);
        }
        let auth = self.credentials.get().api_auth().ok_or_else(|| {
            WorkflowError::Config("API key and access token are required".to_string())
        })?;
        let body = self.session.gateway().positions(&auth).await?;
        Ok(position_rows(&response::net_positions(&body)))
    }

    pub fn monitors(&self) -> &Arc<MonitorSet> {
        &self.monitors
    }
}
