//! Thin, typed wrapper around a `reqwest` HTTP client.
//!
//! Provides ergonomic async methods ([`ApiClient::get_json`],
//! [`ApiClient::post_json`], and friends) so that the store modules never
//! touch raw requests or responses directly. The client attaches the bearer
//! token from an injected [`TokenCell`], enforces the request timeout
//! ceiling, extracts user-facing error messages from failure responses, and
//! reports 401 responses to a registered hook.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::auth::TokenCell;
use crate::error::{ApiError, ConfigError};

/// Environment variable consulted for the backend base URL when the
/// builder is not given one explicitly.
pub const BASE_URL_ENV: &str = "HELMDECK_API_BASE_URL";

/// Base URL used when neither the builder nor the environment supplies one.
pub const DEFAULT_BASE_URL: &str = "https://localhost:7001/api";

/// Request timeout ceiling. Slow responses surface as transport errors.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Hook invoked when a bearer-authenticated request receives a 401.
type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Whether a request carries the bearer token and participates in the
/// 401 hook. Auth-attempt endpoints (`/Login`, `/Signup`) are anonymous:
/// a rejected login is an authentication failure and must not tear down
/// an existing session.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AuthMode {
    Bearer,
    Anonymous,
}

struct ClientInner {
    http: reqwest::Client,
    base: Url,
    token: TokenCell,
    on_unauthorized: RwLock<Option<UnauthorizedHook>>,
}

/// Typed HTTP client for the admin console backend.
///
/// Clone is cheap because the inner state is wrapped in an [`Arc`]; all
/// clones share the same connection pool, token cell, and 401 hook.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.inner.base.as_str())
            .field("authenticated", &self.inner.token.is_set())
            .finish()
    }
}

/// Builder for [`ApiClient`].
///
/// Base URL resolution order: explicit [`base_url`](Self::base_url), then
/// the [`BASE_URL_ENV`] environment variable, then [`DEFAULT_BASE_URL`].
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    token: Option<TokenCell>,
}

impl ApiClientBuilder {
    /// Override the backend base URL (e.g. `"https://api.example.com/api"`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the request timeout ceiling.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Share an existing token cell instead of creating a fresh empty one.
    pub fn token_cell(mut self, token: TokenCell) -> Self {
        self.token = Some(token);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the resolved base URL does
    /// not parse, or [`ConfigError::Http`] if the underlying client cannot
    /// be constructed.
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let raw = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let base = Url::parse(&raw).map_err(|e| ConfigError::InvalidBaseUrl {
            value: raw.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                value: raw,
                reason: "URL cannot serve as a base".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(ConfigError::Http)?;

        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                base,
                token: self.token.unwrap_or_default(),
                on_unauthorized: RwLock::new(None),
            }),
        })
    }
}

impl ApiClient {
    /// Start building a client.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// The token cell this client reads on every bearer request.
    pub fn token_cell(&self) -> TokenCell {
        self.inner.token.clone()
    }

    /// Register the hook fired when a bearer request receives a 401.
    ///
    /// The hook fires once per failing response, before the error is
    /// returned to the caller. Replacing the hook is allowed; only the
    /// latest registration is invoked.
    pub fn set_unauthorized_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        let mut slot = self
            .inner
            .on_unauthorized
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(hook));
    }

    /// `GET` the given path and deserialize the JSON response body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let req = self.inner.http.get(self.url_for(path, query));
        let res = self.send_checked(req, AuthMode::Bearer).await?;
        parse_json(res).await
    }

    /// `GET` the given path and return the raw response bytes.
    ///
    /// Used for export endpoints that stream CSV rather than JSON.
    pub async fn get_bytes(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<u8>, ApiError> {
        let req = self.inner.http.get(self.url_for(path, query));
        let res = self.send_checked(req, AuthMode::Bearer).await?;
        Ok(res.bytes().await?.to_vec())
    }

    /// `POST` a JSON body and deserialize the JSON response.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.inner.http.post(self.url_for(path, &[])).json(body);
        let res = self.send_checked(req, AuthMode::Bearer).await?;
        parse_json(res).await
    }

    /// `POST` a JSON body anonymously: no bearer token, and a 401 does not
    /// fire the unauthorized hook. Used by login/signup.
    pub async fn post_json_anon<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.inner.http.post(self.url_for(path, &[])).json(body);
        let res = self.send_checked(req, AuthMode::Anonymous).await?;
        parse_json(res).await
    }

    /// `PUT` a JSON body and deserialize the JSON response.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let req = self.inner.http.put(self.url_for(path, &[])).json(body);
        let res = self.send_checked(req, AuthMode::Bearer).await?;
        parse_json(res).await
    }

    /// `POST` with no body, discarding the response body.
    pub async fn post_unit(&self, path: &str) -> Result<(), ApiError> {
        let req = self.inner.http.post(self.url_for(path, &[]));
        self.send_checked(req, AuthMode::Bearer).await?;
        Ok(())
    }

    /// `POST` a JSON body, discarding the response body.
    pub async fn post_json_unit<B: Serialize>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let req = self.inner.http.post(self.url_for(path, &[])).json(body);
        self.send_checked(req, AuthMode::Bearer).await?;
        Ok(())
    }

    /// `DELETE` with no body, discarding the response body.
    pub async fn delete_unit(&self, path: &str) -> Result<(), ApiError> {
        let req = self.inner.http.delete(self.url_for(path, &[]));
        self.send_checked(req, AuthMode::Bearer).await?;
        Ok(())
    }

    /// Build the full request URL for a path under the configured base.
    ///
    /// The base URL's own path prefix is preserved (`/api` + `/admin/...`).
    /// Query pairs with empty values are skipped; repeated keys are allowed
    /// and serialize as repeated parameters. Path and query characters are
    /// percent-encoded as needed.
    pub(crate) fn url_for(&self, path: &str, query: &[(String, String)]) -> Url {
        let mut url = self.inner.base.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                if value.is_empty() {
                    continue;
                }
                pairs.append_pair(key, value);
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        url
    }

    /// Attach auth, send, and map non-success statuses to [`ApiError::Api`].
    ///
    /// Fires the unauthorized hook on a 401 for bearer requests, once per
    /// failing response, before returning the error.
    async fn send_checked(&self, req: RequestBuilder, mode: AuthMode) -> Result<Response, ApiError> {
        let req = match (mode, self.inner.token.bearer()) {
            (AuthMode::Bearer, Some(token)) => req.bearer_auth(token),
            _ => req,
        };

        let res = req.send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        if status == StatusCode::UNAUTHORIZED && mode == AuthMode::Bearer {
            self.notify_unauthorized();
        }

        let body = res.text().await.unwrap_or_default();
        let message = extract_error_message(status, &body);
        tracing::debug!(status = status.as_u16(), %message, "request failed");
        Err(ApiError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn notify_unauthorized(&self) {
        let hook = {
            let slot = self
                .inner
                .on_unauthorized
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            slot.clone()
        };
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Deserialize a success response body.
///
/// Reads the body as text and parses with `serde_json` so that a shape
/// mismatch surfaces as [`ApiError::Schema`] rather than a transport error.
async fn parse_json<T: DeserializeOwned>(res: Response) -> Result<T, ApiError> {
    let text = res.text().await?;
    Ok(serde_json::from_str(&text)?)
}

/// Extract the user-facing message from a failure response body.
///
/// Order: body JSON `message` field, then body JSON `title` field, then the
/// canonical reason phrase for the status, then a generic fallback. This
/// function is extracted from [`ApiClient::send_checked`] so the chain can
/// be unit-tested without a live server.
pub(crate) fn extract_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "title"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
    }
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| "An error occurred".to_string())
}
