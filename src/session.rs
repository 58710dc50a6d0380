//! Session store: authentication state with write-through persistence.
//!
//! The store owns the in-memory session (user identity, bearer token, the
//! derived `is_authenticated` flag) and mirrors every session change into a
//! [`SessionStorage`] so a restarted process can restore it. In-memory
//! state is authoritative: persistence failures are logged and swallowed.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::auth::TokenCell;
use crate::client::ApiClient;
use crate::error::ApiError;
use crate::persist::{AUTH_TOKEN_KEY, AUTH_USER_KEY, SessionStorage};

/// The authenticated user's identity. Immutable once fetched; replaced
/// wholesale on re-login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Credentials sent to `POST /Login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Registration payload sent to `POST /Signup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupData {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Successful login/signup payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserIdentity,
    pub token: String,
}

/// Observable session state.
///
/// Invariant: `is_authenticated` is `true` iff `user` is present and
/// `token` is present and non-empty. Every transition in [`SessionStore`]
/// maintains this.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserIdentity>,
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub loading: bool,
    pub last_error: Option<String>,
}

/// Remote auth endpoints, as a seam so the store can be driven by a mock.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError>;
    async fn signup(&self, data: &SignupData) -> Result<AuthResponse, ApiError>;
    async fn logout(&self) -> Result<(), ApiError>;
}

/// [`AuthApi`] backed by the real HTTP client.
///
/// Login and signup go through the anonymous request path: they carry no
/// bearer token and a 401 there does not fire the session-clearing hook.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: ApiClient,
}

impl HttpAuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &LoginCredentials) -> Result<AuthResponse, ApiError> {
        self.client.post_json_anon("/Login", credentials).await
    }

    async fn signup(&self, data: &SignupData) -> Result<AuthResponse, ApiError> {
        self.client.post_json_anon("/Signup", data).await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        self.client.post_unit("/auth/logout").await
    }
}

/// The session store.
///
/// Owns the [`TokenCell`] that the HTTP client reads for bearer attachment;
/// session transitions are the only writers of that cell.
pub struct SessionStore {
    api: Arc<dyn AuthApi>,
    storage: Arc<dyn SessionStorage>,
    token: TokenCell,
    state: RwLock<SessionState>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn AuthApi>, storage: Arc<dyn SessionStorage>, token: TokenCell) -> Self {
        Self {
            api,
            storage,
            token,
            state: RwLock::new(SessionState::default()),
        }
    }

    /// Restore a persisted session, if both keys are present and parseable.
    ///
    /// Never fails: an absent token, an absent user, or a user value that
    /// does not parse as JSON all yield the empty (unauthenticated)
    /// session, with a warning logged for the corrupt case.
    pub fn initialize(&self) {
        let token = self.storage.get(AUTH_TOKEN_KEY).filter(|t| !t.is_empty());
        let user_raw = self.storage.get(AUTH_USER_KEY);

        let restored = match (token, user_raw) {
            (Some(token), Some(raw)) => match serde_json::from_str::<UserIdentity>(&raw) {
                Ok(user) => Some((user, token)),
                Err(error) => {
                    tracing::warn!(%error, "persisted user identity is corrupt; starting unauthenticated");
                    None
                }
            },
            _ => None,
        };

        match restored {
            Some((user, token)) => {
                self.token.set(&token);
                *self.write_state() = SessionState {
                    user: Some(user),
                    token: Some(token),
                    is_authenticated: true,
                    loading: false,
                    last_error: None,
                };
                tracing::info!("restored persisted session");
            }
            None => {
                self.token.clear();
                *self.write_state() = SessionState::default();
            }
        }
    }

    /// Log in.
    ///
    /// On success the user and token are stored in memory, in the token
    /// cell, and in persistent storage; a success payload carrying an
    /// empty token counts as a failure. On failure `last_error` is set and
    /// any existing authenticated session is left untouched, so a failed
    /// re-login never silently logs the user out.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<(), ApiError> {
        self.begin_attempt();
        match self.api.login(credentials).await {
            Ok(response) => self.complete_attempt(response),
            Err(error) => {
                self.fail_attempt(&error);
                Err(error)
            }
        }
    }

    /// Sign up. Same state transitions as [`login`](Self::login).
    pub async fn signup(&self, data: &SignupData) -> Result<(), ApiError> {
        self.begin_attempt();
        match self.api.signup(data).await {
            Ok(response) => self.complete_attempt(response),
            Err(error) => {
                self.fail_attempt(&error);
                Err(error)
            }
        }
    }

    /// Log out: notify the server (best-effort), then clear the session.
    ///
    /// A failed server call is logged and swallowed; the local session is
    /// cleared regardless.
    pub async fn logout(&self) {
        if let Err(error) = self.api.logout().await {
            tracing::warn!(%error, "server logout failed; clearing local session anyway");
        }
        self.clear_auth();
    }

    /// Clear the session: in-memory state, token cell, and both persisted
    /// keys. Idempotent. This is the path the HTTP client's 401 hook
    /// invokes; user-initiated logout differs only in the preceding server
    /// call.
    pub fn clear_auth(&self) {
        self.token.clear();
        *self.write_state() = SessionState::default();
        for key in [AUTH_TOKEN_KEY, AUTH_USER_KEY] {
            if let Err(error) = self.storage.remove(key) {
                tracing::warn!(key, %error, "failed to remove persisted session value");
            }
        }
    }

    /// A point-in-time copy of the session state.
    pub fn snapshot(&self) -> SessionState {
        self.read_state().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_state().is_authenticated
    }

    /// The token cell shared with the HTTP client.
    pub fn token_cell(&self) -> TokenCell {
        self.token.clone()
    }

    fn begin_attempt(&self) {
        let mut state = self.write_state();
        state.loading = true;
        state.last_error = None;
    }

    fn complete_attempt(&self, response: AuthResponse) -> Result<(), ApiError> {
        // An empty token never authenticates; `initialize` applies the
        // same rule to persisted sessions.
        if response.token.is_empty() {
            let error = ApiError::Schema(serde::de::Error::custom(
                "authentication response carried an empty token",
            ));
            self.fail_attempt(&error);
            return Err(error);
        }

        self.token.set(&response.token);

        if let Err(error) = self.storage.set(AUTH_TOKEN_KEY, &response.token) {
            tracing::warn!(%error, "failed to persist auth token");
        }
        match serde_json::to_string(&response.user) {
            Ok(json) => {
                if let Err(error) = self.storage.set(AUTH_USER_KEY, &json) {
                    tracing::warn!(%error, "failed to persist user identity");
                }
            }
            Err(error) => {
                tracing::warn!(%error, "failed to serialize user identity for persistence");
            }
        }

        *self.write_state() = SessionState {
            user: Some(response.user),
            token: Some(response.token),
            is_authenticated: true,
            loading: false,
            last_error: None,
        };
        Ok(())
    }

    fn fail_attempt(&self, error: &ApiError) {
        let mut state = self.write_state();
        state.loading = false;
        state.last_error = Some(error.user_message());
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &self.snapshot())
            .finish()
    }
}
