//! Landing dashboard: headline stats, the recent-activity feed, and the
//! quick-action tiles, loaded together as one page.
//!
//! The three GET endpoints are fetched in parallel and the page renders
//! all-or-nothing: if any of them fails the whole load reports the error
//! and the previous data stays in place.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::collection::Teardown;
use crate::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: u64,
    pub system_health: f64,
    pub security_score: String,
    pub performance: f64,
    pub user_growth: f64,
    pub uptime: f64,
    pub last_audit: String,
    /// Milliseconds.
    pub response_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Login,
    Signup,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionColor {
    Primary,
    Secondary,
    Success,
    Warning,
    Error,
}

/// One tile on the dashboard. `action` is the backend's identifier for
/// what executing the tile does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAction {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub action: String,
    pub color: ActionColor,
}

/// Observable dashboard state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardState {
    pub stats: Option<DashboardStats>,
    pub activity: Vec<RecentActivity>,
    pub quick_actions: Vec<QuickAction>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Remote dashboard endpoints, as a seam for mocking.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn stats(&self) -> Result<DashboardStats, ApiError>;
    async fn recent_activity(&self) -> Result<Vec<RecentActivity>, ApiError>;
    async fn quick_actions(&self) -> Result<Vec<QuickAction>, ApiError>;
    async fn execute_quick_action(&self, action_id: &str) -> Result<(), ApiError>;
}

/// [`DashboardApi`] backed by the real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpDashboardApi {
    client: ApiClient,
}

impl HttpDashboardApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DashboardApi for HttpDashboardApi {
    async fn stats(&self) -> Result<DashboardStats, ApiError> {
        self.client.get_json("/dashboard/stats", &[]).await
    }

    async fn recent_activity(&self) -> Result<Vec<RecentActivity>, ApiError> {
        self.client.get_json("/dashboard/activity", &[]).await
    }

    async fn quick_actions(&self) -> Result<Vec<QuickAction>, ApiError> {
        self.client.get_json("/dashboard/quick-actions", &[]).await
    }

    async fn execute_quick_action(&self, action_id: &str) -> Result<(), ApiError> {
        self.client
            .post_unit(&format!("/dashboard/quick-actions/{action_id}/execute"))
            .await
    }
}

/// State container for the dashboard page.
pub struct DashboardStore {
    api: Arc<dyn DashboardApi>,
    state: RwLock<DashboardState>,
    load_seq: AtomicU64,
    teardown: Teardown,
}

impl DashboardStore {
    pub fn new(api: Arc<dyn DashboardApi>) -> Self {
        Self {
            api,
            state: RwLock::new(DashboardState::default()),
            load_seq: AtomicU64::new(0),
            teardown: Teardown::new(),
        }
    }

    /// Load stats, activity, and quick actions in parallel. Sequence gated
    /// like the list stores: a slower load cannot overwrite a newer one.
    pub async fn load(&self) -> Result<(), ApiError> {
        if self.teardown.is_closed() {
            return Err(ApiError::Cancelled);
        }
        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.write();
            state.loading = true;
            state.error = None;
        }

        let result = self
            .teardown
            .race(async {
                tokio::try_join!(
                    self.api.stats(),
                    self.api.recent_activity(),
                    self.api.quick_actions(),
                )
            })
            .await;

        if seq != self.load_seq.load(Ordering::SeqCst) {
            tracing::debug!(seq, "discarding superseded dashboard load");
            return Ok(());
        }
        match result {
            Ok((stats, activity, quick_actions)) => {
                let mut state = self.write();
                state.stats = Some(stats);
                state.activity = activity;
                state.quick_actions = quick_actions;
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

    /// Execute a quick action, then reload the dashboard so its effects
    /// show up. Failures surface to the caller without touching state.
    pub async fn execute_quick_action(&self, action_id: &str) -> Result<(), ApiError> {
        self.teardown
            .race(self.api.execute_quick_action(action_id))
            .await?;
        self.load().await
    }

    pub fn clear_error(&self) {
        self.write().error = None;
    }

    pub fn snapshot(&self) -> DashboardState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop the store: cancels in-flight loads and rejects new ones.
    pub fn close(&self) {
        self.teardown.close();
    }

    fn write(&self) -> RwLockWriteGuard<'_, DashboardState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DashboardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardStore")
            .field("state", &self.snapshot())
            .finish()
    }
}
