//! Application wiring.
//!
//! [`Application`] owns every component and hands out shared references.
//! Nothing here is global: tests build one over an in-memory store and mock
//! transports with [`Application::with_components`].

use std::fmt::Display;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use kdesk_broker::{
    build_transports, request_token_from_redirect, BrokerGateway, DynTransport, Notifier,
    NotifyLevel, SessionManager,
};
use kdesk_core::{Algorithm, AlgorithmDraft, Clock, Credentials, SystemClock};
use kdesk_store::{
    compute_display_rows, AlgorithmStore, CredentialStore, DeploymentRegistry, DisplayRow,
    FileKvStore, KvStore,
};
use kdesk_workflow::{Deployer, MonitorSet, OrderWorkflow};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::console::ConsoleNotifier;
use crate::error::{AppError, AppResult};

/// Partial settings edit. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub request_token: Option<String>,
    pub access_token: Option<String>,
    pub redirect_url: Option<String>,
    pub max_positions: Option<u32>,
    pub risk_per_trade: Option<f64>,
    pub auto_trade: Option<bool>,
    /// URL the broker redirected to after login; its `request_token` is
    /// captured and any stale access token is cleared.
    pub login_redirect: Option<String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// `request_token` carried by `login_redirect`, if one was given.
    fn captured_request_token(&self) -> AppResult<Option<String>> {
        self.login_redirect
            .as_deref()
            .map(|redirect| {
                request_token_from_redirect(redirect).ok_or_else(|| {
                    AppError::Config("redirect URL has no request_token parameter".to_string())
                })
            })
            .transpose()
    }

    fn apply(self, creds: &mut Credentials, captured: Option<String>) {
        if let Some(v) = self.api_key {
            creds.api_key = v.trim().to_string();
        }
        if let Some(v) = self.api_secret {
            creds.api_secret = v.trim().to_string();
        }
        if let Some(v) = self.request_token {
            creds.request_token = v.trim().to_string();
        }
        if let Some(v) = self.access_token {
            creds.access_token = v.trim().to_string();
        }
        if let Some(v) = self.redirect_url {
            creds.redirect_url = v.trim().to_string();
        }
        if let Some(v) = self.max_positions {
            creds.max_positions = v;
        }
        if let Some(v) = self.risk_per_trade {
            creds.risk_per_trade = v;
        }
        if let Some(v) = self.auto_trade {
            creds.auto_trade = v;
        }
        if let Some(token) = captured {
            creds.request_token = token;
            creds.access_token.clear();
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    credentials: Arc<CredentialStore>,
    algorithms: Arc<AlgorithmStore>,
    registry: Arc<DeploymentRegistry>,
    session: Arc<SessionManager>,
    orders: Arc<OrderWorkflow>,
    monitors: Arc<MonitorSet>,
    deployer: Deployer,
    notifier: Arc<dyn Notifier>,
}

impl Application {
    /// Create the application over the file store and HTTP transports.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let kv: Arc<dyn KvStore> = Arc::new(FileKvStore::open(&config.storage.data_dir)?);
        let transports =
            build_transports(&config.broker.transports, &config.broker.http_settings())?;
        Self::with_components(
            config,
            kv,
            transports,
            Arc::new(ConsoleNotifier),
            Arc::new(SystemClock),
        )
    }

    /// Create the application from explicit collaborators.
    ///
    /// Seeds the built-in algorithm when the algorithm store is empty.
    pub fn with_components(
        config: AppConfig,
        kv: Arc<dyn KvStore>,
        transports: Vec<DynTransport>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        config.validate()?;

        let credentials = Arc::new(CredentialStore::open(kv.clone())?);
        let algorithms = Arc::new(AlgorithmStore::open(kv.clone())?);
        algorithms.seed_defaults(clock.now().with_timezone(&Utc))?;
        let registry = Arc::new(DeploymentRegistry::open(kv)?);

        let gateway = Arc::new(BrokerGateway::new(transports));
        let session = Arc::new(SessionManager::new(
            credentials.clone(),
            gateway.clone(),
            notifier.clone(),
            config.broker.login_base_url.clone(),
        ));
        let monitors = Arc::new(MonitorSet::new(
            registry.clone(),
            credentials.clone(),
            gateway.clone(),
            config.workflow.monitor_interval(),
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
            credentials.clone(),
            session.clone(),
            orders.clone(),
            monitors.clone(),
            notifier.clone(),
            clock,
            config.workflow.nifty_lot_quantity,
        );

        info!(
            transports = ?session.gateway().transport_names(),
            algorithms = algorithms.list().len(),
            deployments = registry.list().len(),
            "Application initialized"
        );

        Ok(Self {
            config,
            credentials,
            algorithms,
            registry,
            session,
            orders,
            monitors,
            deployer,
            notifier,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn algorithms(&self) -> &Arc<AlgorithmStore> {
        &self.algorithms
    }

    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn orders(&self) -> &Arc<OrderWorkflow> {
        &self.orders
    }

    pub fn monitors(&self) -> &Arc<MonitorSet> {
        &self.monitors
    }

    pub fn deployer(&self) -> &Deployer {
        &self.deployer
    }

    /// Apply a settings edit and persist it.
    ///
    /// Returns the saved settings and whether they are complete enough to
    /// connect right away.
    pub fn save_settings(&self, update: SettingsUpdate) -> AppResult<(Credentials, bool)> {
        let saved = update
            .captured_request_token()
            .and_then(|captured| {
                self.credentials
                    .update(|creds| update.apply(creds, captured))
                    .map_err(AppError::from)
            });
        let saved = match saved {
            Ok(saved) => saved,
            Err(e) => {
                self.notifier
                    .notify(NotifyLevel::Error, &format!("Settings not saved: {e}"));
                return Err(e);
            }
        };

        self.notifier
            .notify(NotifyLevel::Success, "Settings saved successfully!");
        let connect_ready = saved.has_api_key() && saved.has_access_token();
        Ok((saved, connect_ready))
    }

    /// Save an algorithm draft, reporting the outcome.
    pub fn save_algorithm(&self, draft: AlgorithmDraft) -> AppResult<Algorithm> {
        match self.algorithms.save(draft) {
            Ok(saved) => {
                self.notifier.notify(
                    NotifyLevel::Success,
                    &format!("Algorithm '{}' saved successfully!", saved.name),
                );
                Ok(saved)
            }
            Err(e) => {
                self.notifier
                    .notify(NotifyLevel::Error, &format!("Algorithm not saved: {e}"));
                Err(e.into())
            }
        }
    }

    /// Delete an algorithm. Deployments of it stay and show as orphaned.
    pub fn delete_algorithm(&self, id: &str) -> AppResult<Algorithm> {
        match self.algorithms.delete(id)? {
            Some(removed) => {
                self.notifier.notify(
                    NotifyLevel::Success,
                    &format!("Algorithm '{}' deleted", removed.name),
                );
                Ok(removed)
            }
            None => {
                let e = AppError::Config(format!("algorithm not found: {id}"));
                self.notifier.notify(NotifyLevel::Error, &e.to_string());
                Err(e)
            }
        }
    }

    /// Deployment rows rendered in `tz`.
    pub fn deployment_rows<Tz>(&self, tz: &Tz) -> Vec<DisplayRow>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        compute_display_rows(
            &self.registry.list(),
            |id| self.algorithms.contains(id),
            tz,
        )
    }

    /// Cancel every running monitor.
    pub fn shutdown(&self) {
        let running = self.monitors.len();
        self.monitors.shutdown();
        if running > 0 {
            warn!(
                monitors = running,
                "Monitors stopped; deployments stay running and resume on next watch"
            );
        }
        info!("Application shut down");
    }
}
