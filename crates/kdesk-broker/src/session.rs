//! Broker session: token exchange, connection check and login URL.

use std::sync::Arc;

use kdesk_core::Credentials;
use kdesk_store::CredentialStore;
use kdesk_telemetry::Metrics;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{SessionError, SessionResult};
use crate::gateway::BrokerGateway;
use crate::notify::{Notifier, NotifyLevel};
use crate::response::{self, Profile};

/// Broker login host.
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://kite.trade";

/// Token exchange checksum: lowercase hex SHA-256 of
/// `api_key + request_token + api_secret`.
pub fn checksum(api_key: &str, request_token: &str, api_secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hasher.update(request_token.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build the broker login URL.
pub fn login_url(login_base_url: &str, api_key: &str, redirect_url: &str) -> SessionResult<Url> {
    let api_key = api_key.trim();
    if api_key.is_empty() {
        return Err(SessionError::Config("API key is required".to_string()));
    }

    let base = format!("{}/connect/login", login_base_url.trim_end_matches('/'));
    let mut url = Url::parse(&base)
        .map_err(|e| SessionError::Config(format!("Invalid login URL {base}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("api_key", api_key);
        let redirect_url = redirect_url.trim();
        if !redirect_url.is_empty() {
            query.append_pair("redirect_params", redirect_url);
        }
    }
    Ok(url)
}

/// Extract `request_token` from the URL the broker redirected to after login.
pub fn request_token_from_redirect(redirect: &str) -> Option<String> {
    let url = Url::parse(redirect.trim()).ok()?;
    let token = url
        .query_pairs()
        .find(|(k, _)| k == "request_token")
        .map(|(_, v)| v.into_owned())?;
    (!token.is_empty()).then_some(token)
}

/// Render state of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub connected: bool,
    pub user_name: Option<String>,
    pub message: String,
}

/// Outcome of [`SessionManager::auto_connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoConnect {
    Connected(Profile),
    /// API key saved but no access token yet.
    LoginRequired,
    /// Nothing configured.
    SettingsRequired,
}

/// Owns the broker session and its published status.
pub struct SessionManager {
    credentials: Arc<CredentialStore>,
    gateway: Arc<BrokerGateway>,
    notifier: Arc<dyn Notifier>,
    login_base_url: String,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionManager {
    pub fn new(
        credentials: Arc<CredentialStore>,
        gateway: Arc<BrokerGateway>,
        notifier: Arc<dyn Notifier>,
        login_base_url: impl Into<String>,
    ) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus {
            connected: false,
            user_name: None,
            message: "Not connected".to_string(),
        });
        Self {
            credentials,
            gateway,
            notifier,
            login_base_url: login_base_url.into(),
            status_tx,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status_tx.borrow().connected
    }

    pub fn status(&self) -> SessionStatus {
        self.status_tx.borrow().clone()
    }

    /// Receiver for status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn gateway(&self) -> &Arc<BrokerGateway> {
        &self.gateway
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Login URL for the saved API key and redirect URL.
    pub fn login_url(&self) -> SessionResult<Url> {
        let creds = self.credentials.get();
        login_url(&self.login_base_url, &creds.api_key, &creds.redirect_url)
    }

    /// Verify the session against `/user/profile`, exchanging the request
    /// token first when no access token is stored.
    ///
    /// Publishes exactly one status update and sends exactly one
    /// notification, whatever the outcome.
    pub async fn connect(&self) -> SessionResult<Profile> {
        let result = self.try_connect().await;

        match &result {
            Ok(profile) => {
                let name = profile.display_name();
                info!(user = %name, "Broker session connected");
                Metrics::session_connected(true);
                self.status_tx.send_replace(SessionStatus {
                    connected: true,
                    user_name: Some(name.clone()),
                    message: format!("Connected as {name}"),
                });
                self.notifier.notify(
                    NotifyLevel::Success,
                    &format!("Connected to broker API as {name}"),
                );
            }
            Err(e) => {
                warn!(error = %e, "Broker connection failed");
                Metrics::session_connected(false);
                self.status_tx.send_replace(SessionStatus {
                    connected: false,
                    user_name: None,
                    message: e.to_string(),
                });
                self.notifier
                    .notify(NotifyLevel::Error, &format!("API connection failed: {e}"));
            }
        }

        result
    }

    /// Connect on startup when credentials allow it, otherwise tell the user
    /// what is missing.
    pub async fn auto_connect(&self) -> SessionResult<AutoConnect> {
        let creds = self.credentials.get();
        if creds.has_api_key() && creds.has_access_token() {
            return self.connect().await.map(AutoConnect::Connected);
        }
        if creds.has_api_key() {
            self.notifier.notify(
                NotifyLevel::Warning,
                "API key found. Complete the login flow to get an access token.",
            );
            return Ok(AutoConnect::LoginRequired);
        }
        self.notifier.notify(
            NotifyLevel::Info,
            "Configure your API credentials in settings to connect.",
        );
        Ok(AutoConnect::SettingsRequired)
    }

    async fn try_connect(&self) -> SessionResult<Profile> {
        let creds = self.credentials.get();
        if !creds.has_api_key() {
            return Err(SessionError::Config("API key is required".to_string()));
        }

        if !creds.has_access_token() {
            if !creds.has_request_token() {
                return Err(SessionError::Config(
                    "Access token missing; complete the login flow".to_string(),
                ));
            }
            if !creds.has_api_secret() {
                return Err(SessionError::Config(
                    "API secret is required to exchange the request token".to_string(),
                ));
            }
            self.exchange_request_token(&creds).await?;
        }

        let auth = self.credentials.get().api_auth().ok_or_else(|| {
            SessionError::Config("API key and access token are required".to_string())
        })?;
        let body = self.gateway.profile(&auth).await?;

        Profile::from_body(&body).ok_or_else(|| {
            SessionError::InvalidProfile(
                response::message(&body)
                    .unwrap_or("response carries no user identity")
                    .to_string(),
            )
        })
    }

    async fn exchange_request_token(&self, creds: &Credentials) -> SessionResult<()> {
        let api_key = creds.api_key.trim();
        let request_token = creds.request_token.trim();
        let sum = checksum(api_key, request_token, creds.api_secret.trim());

        let body = self
            .gateway
            .exchange_token(api_key, request_token, &sum)
            .await?;
        let access_token = response::access_token(&body).ok_or_else(|| {
            SessionError::TokenExchange(
                response::message(&body)
                    .unwrap_or("response carries no access token")
                    .to_string(),
            )
        })?;

        self.credentials.set_access_token(&access_token)?;
        info!("Access token obtained");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{PROFILE_ENDPOINT, SESSION_TOKEN_ENDPOINT};
    use crate::notify::RecordingNotifier;
    use crate::transport::{DynTransport, MockOutcome, MockTransport};
    use kdesk_store::MemoryKvStore;
    use serde_json::json;

    struct Harness {
        session: SessionManager,
        credentials: Arc<CredentialStore>,
        transport: Arc<MockTransport>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(setup: impl FnOnce(&mut Credentials)) -> Harness {
        let credentials = Arc::new(CredentialStore::open(Arc::new(MemoryKvStore::new())).unwrap());
        credentials.update(setup).unwrap();
        let transport = Arc::new(MockTransport::new("mock"));
        let gateway = Arc::new(BrokerGateway::new(vec![transport.clone() as DynTransport]));
        let notifier = Arc::new(RecordingNotifier::new());
        let session = SessionManager::new(
            credentials.clone(),
            gateway,
            notifier.clone(),
            DEFAULT_LOGIN_BASE_URL,
        );
        Harness {
            session,
            credentials,
            transport,
            notifier,
        }
    }

    fn profile_ok() -> MockOutcome {
        MockOutcome::json(
            200,
            json!({"status": "success", "data": {"user_id": "AB1234", "user_name": "Asha"}}),
        )
    }

    #[test]
    fn test_checksum_golden() {
        let sum = checksum("K", "R", "S");
        assert_eq!(
            sum,
            "17e3f93f86490a75239ca3e5497d06d167a60b09e3b863306e65c0a6a8acfb24"
        );
        assert_eq!(sum.len(), 64);
    }

    #[test]
    fn test_login_url() {
        let url = login_url(
            "https://kite.trade/",
            "key123",
            "https://example.com/redirect.html",
        )
        .unwrap();
        assert_eq!(url.path(), "/connect/login");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("api_key".to_string(), "key123".to_string()));
        assert_eq!(
            pairs[1],
            (
                "redirect_params".to_string(),
                "https://example.com/redirect.html".to_string()
            )
        );

        assert!(matches!(
            login_url("https://kite.trade", "  ", ""),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_request_token_from_redirect() {
        assert_eq!(
            request_token_from_redirect(
                "https://example.com/redirect.html?action=login&status=success&request_token=abc"
            )
            .as_deref(),
            Some("abc")
        );
        assert_eq!(request_token_from_redirect("https://example.com/?status=ok"), None);
        assert_eq!(request_token_from_redirect("not a url"), None);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error_without_network() {
        let h = harness(|c| c.access_token = "t".to_string());
        let mut rx = h.session.subscribe();

        let err = h.session.connect().await.unwrap_err();

        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(h.transport.call_count(), 0);
        assert_eq!(h.notifier.count(), 1);
        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().connected);
    }

    #[tokio::test]
    async fn test_missing_access_token_without_request_token_is_config_error() {
        let h = harness(|c| {
            c.api_key = "k".to_string();
            c.api_secret = "s".to_string();
        });
        let err = h.session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_secret_is_config_error() {
        let h = harness(|c| {
            c.api_key = "k".to_string();
            c.request_token = "r".to_string();
        });
        let err = h.session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Config(_)));
        assert_eq!(h.transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_success_publishes_once() {
        let h = harness(|c| {
            c.api_key = "k".to_string();
            c.access_token = "t".to_string();
        });
        h.transport.on(PROFILE_ENDPOINT, profile_ok());
        let mut rx = h.session.subscribe();

        let profile = h.session.connect().await.unwrap();

        assert_eq!(profile.user_name.as_deref(), Some("Asha"));
        assert!(h.session.is_connected());
        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert_eq!(status.user_name.as_deref(), Some("Asha"));
        assert!(!rx.has_changed().unwrap());

        assert_eq!(h.notifier.count(), 1);
        assert_eq!(h.notifier.last().unwrap().0, NotifyLevel::Success);
        assert_eq!(
            h.transport.calls()[0].authorization.as_deref(),
            Some("token k:t")
        );
    }

    #[tokio::test]
    async fn test_profile_without_identity_is_failure() {
        let h = harness(|c| {
            c.api_key = "k".to_string();
            c.access_token = "t".to_string();
        });
        h.transport.on(
            PROFILE_ENDPOINT,
            MockOutcome::json(200, json!({"status": "success", "data": {}})),
        );

        let err = h.session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidProfile(_)));
        assert!(!h.session.is_connected());
        assert_eq!(h.notifier.last().unwrap().0, NotifyLevel::Error);
    }

    #[tokio::test]
    async fn test_connect_exchanges_request_token_first() {
        let h = harness(|c| {
            c.api_key = "K".to_string();
            c.request_token = "R".to_string();
            c.api_secret = "S".to_string();
        });
        h.transport.on(
            SESSION_TOKEN_ENDPOINT,
            MockOutcome::json(200, json!({"status": "success", "data": {"access_token": "fresh"}})),
        );
        h.transport.on(PROFILE_ENDPOINT, profile_ok());

        h.session.connect().await.unwrap();

        let calls = h.transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].request.endpoint, SESSION_TOKEN_ENDPOINT);
        assert!(calls[0].request.form.contains(&(
            "checksum".to_string(),
            checksum("K", "R", "S")
        )));
        assert_eq!(calls[1].authorization.as_deref(), Some("token K:fresh"));

        let creds = h.credentials.get();
        assert_eq!(creds.access_token, "fresh");
        assert!(!creds.has_request_token());
        assert_eq!(h.notifier.count(), 1);
    }

    #[tokio::test]
    async fn test_token_exchange_without_token_in_body() {
        let h = harness(|c| {
            c.api_key = "K".to_string();
            c.request_token = "R".to_string();
            c.api_secret = "S".to_string();
        });
        h.transport.on(
            SESSION_TOKEN_ENDPOINT,
            MockOutcome::json(200, json!({"status": "error", "message": "Token is invalid"})),
        );

        let err = h.session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::TokenExchange(ref m) if m == "Token is invalid"));
        assert_eq!(h.transport.calls_to(PROFILE_ENDPOINT), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_flips_disconnected() {
        let h = harness(|c| {
            c.api_key = "k".to_string();
            c.access_token = "t".to_string();
        });
        h.transport.on(PROFILE_ENDPOINT, profile_ok());
        h.session.connect().await.unwrap();
        assert!(h.session.is_connected());

        h.transport
            .on(PROFILE_ENDPOINT, MockOutcome::Fail("refused".to_string()));
        let err = h.session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Gateway(_)));
        assert!(!h.session.is_connected());
        assert_eq!(h.notifier.count(), 2);
    }

    #[tokio::test]
    async fn test_auto_connect_branches() {
        let empty = harness(|_| {});
        assert_eq!(
            empty.session.auto_connect().await.unwrap(),
            AutoConnect::SettingsRequired
        );
        assert_eq!(empty.notifier.last().unwrap().0, NotifyLevel::Info);

        let key_only = harness(|c| c.api_key = "k".to_string());
        assert_eq!(
            key_only.session.auto_connect().await.unwrap(),
            AutoConnect::LoginRequired
        );
        assert_eq!(key_only.notifier.last().unwrap().0, NotifyLevel::Warning);
        assert_eq!(key_only.transport.call_count(), 0);

        let full = harness(|c| {
            c.api_key = "k".to_string();
            c.access_token = "t".to_string();
        });
        full.transport.on(PROFILE_ENDPOINT, profile_ok());
        assert!(matches!(
            full.session.auto_connect().await.unwrap(),
            AutoConnect::Connected(_)
        ));
    }
}
