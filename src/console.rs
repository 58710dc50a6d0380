//! Top-level console facade.
//!
//! [`Console`] wires the HTTP client, session store, resource stores, and
//! the health auto-refresh poller into one object with a single build path
//! and a single teardown path. Most applications construct exactly one.

use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::accounts::{AccountsStore, HttpAccountsApi};
use crate::auth::TokenCell;
use crate::client::ApiClient;
use crate::dashboard::{DashboardStore, HttpDashboardApi};
use crate::error::ConfigError;
use crate::health::{HealthStore, HttpHealthApi};
use crate::persist::{FileSessionStorage, MemorySessionStorage, SessionStorage};
use crate::poll::PollingController;
use crate::session::{HttpAuthApi, SessionStore};
use crate::tickets::{HttpTicketsApi, TicketsStore};

/// The assembled admin console: one session store, one store per
/// resource, and the background poller for service health.
///
/// All stores share a single [`ApiClient`], so a login in the session
/// store immediately authenticates every other store's requests, and a
/// 401 on any request clears the session for all of them.
pub struct Console {
    client: ApiClient,
    session: Arc<SessionStore>,
    accounts: Arc<AccountsStore>,
    health: Arc<HealthStore>,
    tickets: Arc<TicketsStore>,
    dashboard: Arc<DashboardStore>,
    health_poller: PollingController,
}

/// Builder for configuring and opening a [`Console`].
///
/// # Examples
///
/// ```no_run
/// use helmdeck::ConsoleBuilder;
///
/// # fn example() -> Result<(), helmdeck::ConfigError> {
/// let console = ConsoleBuilder::new()
///     .base_url("https://admin.example.com/api")
///     .session_dir("/var/lib/helmdeck")
///     .open()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConsoleBuilder {
    base_url: Option<String>,
    session_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ConsoleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the backend base URL. Without this, the
    /// [`HELMDECK_API_BASE_URL`](crate::client::BASE_URL_ENV) environment
    /// variable is consulted, then the built-in default.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Persist the session under this directory, so a token survives
    /// process restarts. Without this, the session lives in memory only.
    pub fn session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    /// Override the request timeout ceiling.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the client, restore any persisted session, and assemble the
    /// stores.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the base URL does not parse, the HTTP
    /// client cannot be constructed, or the session directory cannot be
    /// created.
    pub fn open(self) -> Result<Console, ConfigError> {
        let token = TokenCell::new();

        let mut client = ApiClient::builder().token_cell(token.clone());
        if let Some(url) = self.base_url {
            client = client.base_url(url);
        }
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        let client = client.build()?;

        let storage: Arc<dyn SessionStorage> = match self.session_dir {
            Some(dir) => Arc::new(FileSessionStorage::open(dir)?),
            None => Arc::new(MemorySessionStorage::new()),
        };

        let session = Arc::new(SessionStore::new(
            Arc::new(HttpAuthApi::new(client.clone())),
            storage,
            token,
        ));
        session.initialize();

        // The hook holds a Weak reference so the client (long-lived, cloned
        // into every store) does not keep the session store alive.
        let weak: Weak<SessionStore> = Arc::downgrade(&session);
        client.set_unauthorized_hook(move || {
            if let Some(session) = weak.upgrade() {
                tracing::info!("received 401; clearing stored session");
                session.clear_auth();
            }
        });

        tracing::info!(
            authenticated = session.is_authenticated(),
            "console opened"
        );

        Ok(Console {
            accounts: Arc::new(AccountsStore::new(Arc::new(HttpAccountsApi::new(
                client.clone(),
            )))),
            health: Arc::new(HealthStore::new(Arc::new(HttpHealthApi::new(
                client.clone(),
            )))),
            tickets: Arc::new(TicketsStore::new(Arc::new(HttpTicketsApi::new(
                client.clone(),
            )))),
            dashboard: Arc::new(DashboardStore::new(Arc::new(HttpDashboardApi::new(
                client.clone(),
            )))),
            client,
            session,
            health_poller: PollingController::new(),
        })
    }
}

impl Console {
    /// Start building a console.
    pub fn builder() -> ConsoleBuilder {
        ConsoleBuilder::new()
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    pub fn accounts(&self) -> &AccountsStore {
        &self.accounts
    }

    pub fn health(&self) -> &HealthStore {
        &self.health
    }

    pub fn tickets(&self) -> &TicketsStore {
        &self.tickets
    }

    pub fn dashboard(&self) -> &DashboardStore {
        &self.dashboard
    }

    /// The shared HTTP client, for callers that need endpoints outside the
    /// store surface.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Reconcile the background health poller with the health store's
    /// auto-refresh settings.
    ///
    /// Call after flipping [`HealthStore::set_auto_refresh`] or changing
    /// the interval. Always restarts the timer, so an interval change
    /// takes effect immediately rather than after the old interval's next
    /// tick.
    pub async fn sync_health_polling(&self) {
        self.health_poller.stop().await;

        let settings = self.health.snapshot();
        if !settings.auto_refresh {
            return;
        }

        let health = Arc::clone(&self.health);
        self.health_poller
            .start(settings.refresh_interval, move || {
                let health = Arc::clone(&health);
                async move {
                    if let Err(error) = health.fetch_services_health().await {
                        tracing::warn!(%error, "scheduled health refresh failed");
                    }
                }
            });
    }

    /// True while the background health poller is running.
    pub fn is_health_polling(&self) -> bool {
        self.health_poller.is_polling()
    }

    /// Shut the console down: stop the poller and close every store so
    /// in-flight requests resolve as cancelled instead of mutating state.
    ///
    /// Idempotent. The session store stays readable so a caller can still
    /// inspect who was signed in.
    pub async fn close(&self) {
        self.health_poller.stop().await;
        self.accounts.close();
        self.health.close();
        self.tickets.close();
        self.dashboard.close();
    }
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Console")
            .field("authenticated", &self.session.is_authenticated())
            .field("health_polling", &self.is_health_polling())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::persist::{AUTH_TOKEN_KEY, AUTH_USER_KEY};

    fn test_console() -> Console {
        Console::builder()
            .base_url("http://127.0.0.1:9/api")
            .open()
            .expect("console should build")
    }

    #[test]
    fn opens_unauthenticated_without_persisted_session() {
        let console = test_console();
        let session = console.session().snapshot();
        assert!(!session.is_authenticated);
        assert!(session.user.is_none());
    }

    #[test]
    fn open_restores_session_from_the_session_dir() {
        let dir = tempfile::tempdir().expect("temp dir");

        let storage = FileSessionStorage::open(dir.path()).expect("storage should open");
        storage
            .set(AUTH_TOKEN_KEY, "persisted-token")
            .expect("token should persist");
        storage
            .set(
                AUTH_USER_KEY,
                r#"{"id":"u-1","email":"op@example.com","firstName":"Op","lastName":"Erator"}"#,
            )
            .expect("user should persist");

        let console = Console::builder()
            .base_url("http://127.0.0.1:9/api")
            .session_dir(dir.path())
            .open()
            .expect("console should build");

        let session = console.session().snapshot();
        assert!(session.is_authenticated);
        assert_eq!(session.token.as_deref(), Some("persisted-token"));
        assert_eq!(
            session.user.as_ref().map(|u| u.email.as_str()),
            Some("op@example.com")
        );
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = Console::builder().base_url("not a url").open();
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[tokio::test]
    async fn close_cancels_store_operations() {
        let console = test_console();
        console.close().await;

        let result = console.accounts().fetch_accounts().await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
        let result = console.dashboard().load().await;
        assert!(matches!(result, Err(ApiError::Cancelled)));
    }

    #[tokio::test]
    async fn close_twice_is_fine() {
        let console = test_console();
        console.close().await;
        console.close().await;
    }

    #[tokio::test]
    async fn sync_health_polling_follows_auto_refresh() {
        let console = test_console();
        assert!(!console.is_health_polling());

        // Defaults have auto-refresh enabled.
        console.sync_health_polling().await;
        assert!(console.is_health_polling());

        console.health().set_auto_refresh(false);
        console.sync_health_polling().await;
        assert!(!console.is_health_polling());

        console.close().await;
    }

    #[tokio::test]
    async fn close_stops_the_poller() {
        let console = test_console();
        console.sync_health_polling().await;
        assert!(console.is_health_polling());

        console.close().await;
        assert!(!console.is_health_polling());
    }
}
