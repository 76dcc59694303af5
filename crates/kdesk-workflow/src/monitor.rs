//! Position monitoring for running deployments.
//!
//! Each running deployment gets one background task that polls positions on a
//! fixed period and overwrites the deployment's profit with the summed P&L of
//! open positions. The first poll happens one full period after start.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use kdesk_broker::{response, BrokerGateway};
use kdesk_store::{CredentialStore, DeploymentRegistry};
use kdesk_telemetry::Metrics;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::positions::total_pnl;

/// Default polling period.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Handle to a spawned monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Continue,
    Stop,
}

/// Polls positions for a single deployment.
pub struct PositionMonitor {
    deployment_id: String,
    registry: Arc<DeploymentRegistry>,
    credentials: Arc<CredentialStore>,
    gateway: Arc<BrokerGateway>,
    period: Duration,
}

impl PositionMonitor {
    pub fn new(
        deployment_id: impl Into<String>,
        registry: Arc<DeploymentRegistry>,
        credentials: Arc<CredentialStore>,
        gateway: Arc<BrokerGateway>,
        period: Duration,
    ) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            registry,
            credentials,
            gateway,
            period,
        }
    }

    /// Spawn the polling task on the current runtime.
    pub fn spawn(self) -> MonitorHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        MonitorHandle { token, task }
    }

    async fn run(self, token: CancellationToken) {
        info!(
            deployment_id = %self.deployment_id,
            period_secs = self.period.as_secs(),
            "Position monitor started"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.tick(&token).await == Tick::Stop {
                break;
            }
        }

        info!(deployment_id = %self.deployment_id, "Position monitor stopped");
    }

    async fn tick(&self, token: &CancellationToken) -> Tick {
        let running = self
            .registry
            .get(&self.deployment_id)
            .is_some_and(|d| d.is_running());
        if token.is_cancelled() || !running {
            Metrics::monitor_tick("stopped");
            return Tick::Stop;
        }

        let Some(auth) = self.credentials.get().api_auth() else {
            Metrics::monitor_tick("fetch_failed");
            warn!(deployment_id = %self.deployment_id, "Skipping P&L update: no access token");
            return Tick::Continue;
        };

        let body = match self.gateway.positions(&auth).await {
            Ok(body) => body,
            Err(e) => {
                Metrics::monitor_tick("fetch_failed");
                warn!(deployment_id = %self.deployment_id, error = %e, "Position fetch failed");
                return Tick::Continue;
            }
        };

        if token.is_cancelled() {
            Metrics::monitor_tick("stopped");
            return Tick::Stop;
        }

        let pnl = total_pnl(&response::net_positions(&body));
        match self.registry.set_profit(&self.deployment_id, pnl) {
            Ok(true) => {
                Metrics::monitor_tick("updated");
                debug!(deployment_id = %self.deployment_id, pnl, "Deployment P&L updated");
                Tick::Continue
            }
            Ok(false) => {
                Metrics::monitor_tick("stopped");
                Tick::Stop
            }
            Err(e) => {
                Metrics::monitor_tick("fetch_failed");
                warn!(deployment_id = %self.deployment_id, error = %e, "Failed to persist P&L");
                Tick::Continue
            }
        }
    }
}

/// One monitor per deployment id.
pub struct MonitorSet {
    monitors: DashMap<String, MonitorHandle>,
    registry: Arc<DeploymentRegistry>,
    credentials: Arc<CredentialStore>,
    gateway: Arc<BrokerGateway>,
    period: Duration,
}

impl MonitorSet {
    pub fn new(
        registry: Arc<DeploymentRegistry>,
        credentials: Arc<CredentialStore>,
        gateway: Arc<BrokerGateway>,
        period: Duration,
    ) -> Self {
        Self {
            monitors: DashMap::new(),
            registry,
            credentials,
            gateway,
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start monitoring `deployment_id`, replacing any existing monitor.
    pub fn start(&self, deployment_id: &str) {
        let handle = PositionMonitor::new(
            deployment_id,
            self.registry.clone(),
            self.credentials.clone(),
            self.gateway.clone(),
            self.period,
        )
        .spawn();

        if let Some(previous) = self.monitors.insert(deployment_id.to_string(), handle) {
            debug!(deployment_id, "Replacing existing monitor");
            previous.cancel();
        }
        self.monitors.retain(|_, h| !h.is_finished());
        Metrics::deployments_running(self.monitors.len());
    }

    /// Cancel the monitor for `deployment_id`. Returns false if none existed.
    pub fn cancel(&self, deployment_id: &str) -> bool {
        let removed = self.monitors.remove(deployment_id);
        if let Some((_, handle)) = &removed {
            handle.cancel();
        }
        Metrics::deployments_running(self.monitors.len());
        removed.is_some()
    }

    pub fn contains(&self, deployment_id: &str) -> bool {
        self.monitors.contains_key(deployment_id)
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Cancel every monitor.
    pub fn shutdown(&self) {
        for entry in self.monitors.iter() {
            entry.value().cancel();
        }
        self.monitors.clear();
        Metrics::deployments_running(0);
    }
}
