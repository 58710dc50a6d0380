//! Service-health monitoring: per-service status rows refreshed either
//! on demand or by the polling controller.
//!
//! Unlike the paged stores this one holds the full (small) set of
//! monitored services, tracks when it was last brought up to date, and
//! carries the user's auto-refresh preferences. A full refresh takes the
//! server's `lastUpdated`; a single-service probe stamps the local clock,
//! since the server reports no aggregate time for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::collection::Teardown;
use crate::error::ApiError;

/// Services the console keeps an eye on.
pub const MONITORED_SERVICES: [&str; 4] = [
    "UserIdentity Service",
    "Player Service",
    "GameSettings Service",
    "Orders Service",
];

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Healthy,
    Unavailable,
    Degraded,
}

/// One monitored service's latest probe result. `service` is the identity
/// key for upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealthDto {
    pub service: String,
    pub status_code: u16,
    pub status: ServiceStatus,
    pub last_checked: Option<DateTime<Utc>>,
    /// Milliseconds.
    pub response_time: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealthResponse {
    pub services: Vec<ServiceHealthDto>,
    pub last_updated: DateTime<Utc>,
}

/// Observable health-dashboard state.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthState {
    pub services: Vec<ServiceHealthDto>,
    pub last_updated: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: Option<String>,
    pub auto_refresh: bool,
    pub refresh_interval: Duration,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            last_updated: None,
            loading: false,
            error: None,
            auto_refresh: true,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// Remote health endpoints, as a seam for mocking.
#[async_trait]
pub trait HealthApi: Send + Sync {
    async fn all_services(&self) -> Result<ServiceHealthResponse, ApiError>;
    async fn one_service(&self, service_name: &str) -> Result<ServiceHealthDto, ApiError>;
}

/// [`HealthApi`] backed by the real HTTP client. Service names contain
/// spaces; the URL builder percent-encodes them.
#[derive(Debug, Clone)]
pub struct HttpHealthApi {
    client: ApiClient,
}

impl HttpHealthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthApi for HttpHealthApi {
    async fn all_services(&self) -> Result<ServiceHealthResponse, ApiError> {
        self.client.get_json("/admin/health/services", &[]).await
    }

    async fn one_service(&self, service_name: &str) -> Result<ServiceHealthDto, ApiError> {
        self.client
            .get_json(&format!("/admin/health/services/{service_name}"), &[])
            .await
    }
}

/// State container for the health dashboard.
pub struct HealthStore {
    api: Arc<dyn HealthApi>,
    state: RwLock<HealthState>,
    fetch_seq: AtomicU64,
    teardown: Teardown,
}

impl HealthStore {
    pub fn new(api: Arc<dyn HealthApi>) -> Self {
        Self {
            api,
            state: RwLock::new(HealthState::default()),
            fetch_seq: AtomicU64::new(0),
            teardown: Teardown::new(),
        }
    }

    /// Refresh every monitored service. Successive refreshes are sequence
    /// gated: if a newer refresh starts while this one is in flight, the
    /// slower result is discarded instead of overwriting the fresher rows.
    pub async fn fetch_services_health(&self) -> Result<(), ApiError> {
        if self.teardown.is_closed() {
            return Err(ApiError::Cancelled);
        }
        let seq = self.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.write();
            state.loading = true;
            state.error = None;
        }

        let result = self.teardown.race(self.api.all_services()).await;

        if seq != self.fetch_seq.load(Ordering::SeqCst) {
            tracing::debug!(seq, "discarding superseded health refresh");
            return Ok(());
        }
        match result {
            Ok(response) => {
                let mut state = self.write();
                state.services = response.services;
                state.last_updated = Some(response.last_updated);
                state.loading = false;
                state.error = None;
                Ok(())
            }
            Err(error @ ApiError::Cancelled) => Err(error),
            Err(error) => {
                let mut state = self.write();
                state.loading = false;
                state.error = Some(error.user_message());
                Err(error)
            }
        }
    }

    /// Probe a single service and upsert its row. Does not flip the
    /// `loading` flag: single probes are background touch-ups, not page
    /// loads.
    pub async fn fetch_service_health(&self, service_name: &str) -> Result<(), ApiError> {
        if self.teardown.is_closed() {
            return Err(ApiError::Cancelled);
        }
        match self.teardown.race(self.api.one_service(service_name)).await {
            Ok(service) => {
                self.upsert_service(service);
                Ok(())
            }
            Err(error @ ApiError::Cancelled) => Err(error),
            Err(error) => {
                self.write().error = Some(error.user_message());
                Err(error)
            }
        }
    }

    /// Replace the row with the same service name, or append a new one.
    /// Stamps `last_updated` with the local clock.
    pub fn upsert_service(&self, service: ServiceHealthDto) {
        let mut state = self.write();
        match state
            .services
            .iter_mut()
            .find(|s| s.service == service.service)
        {
            Some(existing) => *existing = service,
            None => state.services.push(service),
        }
        state.last_updated = Some(Utc::now());
    }

    pub fn set_auto_refresh(&self, enabled: bool) {
        self.write().auto_refresh = enabled;
    }

    /// Zero intervals are ignored: the timer cannot tick at that rate.
    pub fn set_refresh_interval(&self, interval: Duration) {
        if interval.is_zero() {
            tracing::warn!("ignoring zero refresh interval");
            return;
        }
        self.write().refresh_interval = interval;
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }

    pub fn snapshot(&self) -> HealthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the store: cancels in-flight fetches and rejects new ones.
    pub fn close(&self) {
        self.teardown.close();
    }

    pub fn is_closed(&self) -> bool {
        self.teardown.is_closed()
    }

    fn write(&self) -> RwLockWriteGuard<'_, HealthState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HealthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthStore")
            .field("state", &self.snapshot())
            .finish()
    }
}
