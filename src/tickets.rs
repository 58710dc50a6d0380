//! Support-ticket triage: paged listing with filters, a selected-ticket
//! detail slot, and the three moderation actions (status change, internal
//! note, assignment).
//!
//! Status changes and assignments patch the cached rows in place and bump
//! `last_updated_at` locally. Adding a note only bumps the selected
//! ticket's timestamp: the server composes the note record (id, author,
//! server clock), so the notes list is refreshed by a follow-up detail
//! fetch rather than guessed at locally.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::collection::{CollectionCore, CollectionState, Page};
use crate::error::ApiError;

/// Ticket lifecycle states, serialized as their exact wire spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    New,
    Open,
    PendingPlayerResponse,
    Closed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Open => "Open",
            Self::PendingPlayerResponse => "PendingPlayerResponse",
            Self::Closed => "Closed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueDetails {
    pub category: String,
    pub subject: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalNote {
    pub id: String,
    pub note: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportTicketDto {
    pub ticket_id: String,
    pub status: TicketStatus,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub assigned_to: Option<String>,
    pub player_info: PlayerInfo,
    pub issue_details: IssueDetails,
    #[serde(default)]
    pub internal_notes: Vec<InternalNote>,
}

/// List envelope for `GET /admin/support/tickets`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TicketsWire {
    tickets: Vec<SupportTicketDto>,
    total_count: u64,
    page: u32,
    total_pages: u32,
}

impl From<TicketsWire> for Page<SupportTicketDto> {
    fn from(wire: TicketsWire) -> Self {
        Self {
            items: wire.tickets,
            total_count: wire.total_count,
            current_page: wire.page,
            total_pages: wire.total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTicketStatusRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub new_status: TicketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddInternalNoteRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub note_content: String,
}

/// `assigned_to: None` (or an empty string at the call site) unassigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTicketRequest {
    pub assigned_to: Option<String>,
}

/// Acknowledgement body the mutation endpoints respond with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AckResponse {
    #[serde(default)]
    pub message: String,
}

/// Pagination and filter parameters for the tickets list. Empty strings
/// and `None` mean "not filtering on this" and are omitted from the query
/// string.
#[derive(Debug, Clone, PartialEq)]
pub struct TicketSearchParams {
    pub page: u32,
    pub page_size: u32,
    pub search: String,
    pub status: Option<TicketStatus>,
    pub category: String,
    pub assigned_to: String,
    pub from_date: String,
    pub to_date: String,
}

impl Default for TicketSearchParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            search: String::new(),
            status: None,
            category: String::new(),
            assigned_to: String::new(),
            from_date: String::new(),
            to_date: String::new(),
        }
    }
}

impl TicketSearchParams {
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".into(), self.page.to_string()),
            ("pageSize".into(), self.page_size.to_string()),
        ];
        if !self.search.is_empty() {
            pairs.push(("search".into(), self.search.clone()));
        }
        if let Some(status) = self.status {
            pairs.push(("status".into(), status.as_str().into()));
        }
        if !self.category.is_empty() {
            pairs.push(("category".into(), self.category.clone()));
        }
        if !self.assigned_to.is_empty() {
            pairs.push(("assignedTo".into(), self.assigned_to.clone()));
        }
        if !self.from_date.is_empty() {
            pairs.push(("fromDate".into(), self.from_date.clone()));
        }
        if !self.to_date.is_empty() {
            pairs.push(("toDate".into(), self.to_date.clone()));
        }
        pairs
    }
}

/// Partial update for [`TicketSearchParams`]: `Some` fields replace the
/// current value, `None` fields are left alone.
#[derive(Debug, Clone, Default)]
pub struct TicketSearchPatch {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
    pub status: Option<Option<TicketStatus>>,
    pub category: Option<String>,
    pub assigned_to: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
}

/// Remote ticket endpoints, as a seam for mocking.
#[async_trait]
pub trait TicketsApi: Send + Sync {
    async fn list(&self, params: &TicketSearchParams) -> Result<Page<SupportTicketDto>, ApiError>;
    async fn by_id(&self, ticket_id: &str) -> Result<SupportTicketDto, ApiError>;
    async fn update_status(
        &self,
        ticket_id: &str,
        request: &UpdateTicketStatusRequest,
    ) -> Result<AckResponse, ApiError>;
    async fn add_note(
        &self,
        ticket_id: &str,
        request: &AddInternalNoteRequest,
    ) -> Result<AckResponse, ApiError>;
    async fn assign(
        &self,
        ticket_id: &str,
        request: &AssignTicketRequest,
    ) -> Result<AckResponse, ApiError>;
    async fn export(&self, params: &TicketSearchParams) -> Result<Vec<u8>, ApiError>;
}

/// [`TicketsApi`] backed by the real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpTicketsApi {
    client: ApiClient,
}

impl HttpTicketsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TicketsApi for HttpTicketsApi {
    async fn list(&self, params: &TicketSearchParams) -> Result<Page<SupportTicketDto>, ApiError> {
        let wire: TicketsWire = self
            .client
            .get_json("/admin/support/tickets", &params.query_pairs())
            .await?;
        Ok(wire.into())
    }

    async fn by_id(&self, ticket_id: &str) -> Result<SupportTicketDto, ApiError> {
        self.client
            .get_json(&format!("/admin/support/tickets/{ticket_id}"), &[])
            .await
    }

    async fn update_status(
        &self,
        ticket_id: &str,
        request: &UpdateTicketStatusRequest,
    ) -> Result<AckResponse, ApiError> {
        self.client
            .put_json(&format!("/admin/support/tickets/{ticket_id}/status"), request)
            .await
    }

    async fn add_note(
        &self,
        ticket_id: &str,
        request: &AddInternalNoteRequest,
    ) -> Result<AckResponse, ApiError> {
        self.client
            .post_json(&format!("/admin/support/tickets/{ticket_id}/notes"), request)
            .await
    }

    async fn assign(
        &self,
        ticket_id: &str,
        request: &AssignTicketRequest,
    ) -> Result<AckResponse, ApiError> {
        self.client
            .put_json(&format!("/admin/support/tickets/{ticket_id}/assign"), request)
            .await
    }

    async fn export(&self, params: &TicketSearchParams) -> Result<Vec<u8>, ApiError> {
        self.client
            .get_bytes("/admin/support/tickets/export", &params.query_pairs())
            .await
    }
}

/// State container for the ticket queue and detail panel.
pub struct TicketsStore {
    api: Arc<dyn TicketsApi>,
    core: CollectionCore<SupportTicketDto>,
    params: RwLock<TicketSearchParams>,
}

impl TicketsStore {
    pub fn new(api: Arc<dyn TicketsApi>) -> Self {
        Self {
            api,
            core: CollectionCore::new(),
            params: RwLock::new(TicketSearchParams::default()),
        }
    }

    /// Shallow-merge a patch into the search parameters. Does not fetch.
    pub fn set_search_params(&self, patch: TicketSearchPatch) {
        let mut params = self.write_params();
        if let Some(page) = patch.page {
            params.page = page;
        }
        if let Some(page_size) = patch.page_size {
            params.page_size = page_size;
        }
        if let Some(search) = patch.search {
            params.search = search;
        }
        if let Some(status) = patch.status {
            params.status = status;
        }
        if let Some(category) = patch.category {
            params.category = category;
        }
        if let Some(assigned_to) = patch.assigned_to {
            params.assigned_to = assigned_to;
        }
        if let Some(from_date) = patch.from_date {
            params.from_date = from_date;
        }
        if let Some(to_date) = patch.to_date {
            params.to_date = to_date;
        }
    }

    pub fn search_params(&self) -> TicketSearchParams {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the page described by the current search parameters.
    pub async fn fetch_tickets(&self) -> Result<(), ApiError> {
        let seq = self.core.begin_list()?;
        let params = self.search_params();
        let result = self.core.race(self.api.list(&params)).await;
        self.core.finish_list(seq, result)
    }

    /// Fetch one ticket into the `selected` slot.
    pub async fn fetch_ticket_by_id(&self, ticket_id: &str) -> Result<(), ApiError> {
        let seq = self.core.begin_detail()?;
        let result = self.core.race(self.api.by_id(ticket_id)).await;
        self.core.finish_detail(seq, result)
    }

    /// Move a ticket to a new status. On success the matching row and the
    /// selected ticket (same id) get the new status and a fresh
    /// `last_updated_at`.
    pub async fn update_ticket_status(
        &self,
        ticket_id: &str,
        new_status: TicketStatus,
    ) -> Result<(), ApiError> {
        let request = UpdateTicketStatusRequest {
            ticket_id: Some(ticket_id.to_string()),
            new_status,
        };
        self.run_mutation(self.api.update_status(ticket_id, &request))
            .await?;

        let updated_at = Utc::now();
        self.core.patch(|state| {
            if let Some(ticket) = state.items.iter_mut().find(|t| t.ticket_id == ticket_id) {
                ticket.status = new_status;
                ticket.last_updated_at = updated_at;
            }
            if let Some(selected) = state.selected.as_mut() {
                if selected.ticket_id == ticket_id {
                    selected.status = new_status;
                    selected.last_updated_at = updated_at;
                }
            }
        });
        Ok(())
    }

    /// Attach an internal note. Only the selected ticket's timestamp is
    /// bumped; callers re-fetch the detail to see the server-composed note.
    pub async fn add_internal_note(
        &self,
        ticket_id: &str,
        note_content: &str,
    ) -> Result<(), ApiError> {
        let request = AddInternalNoteRequest {
            ticket_id: Some(ticket_id.to_string()),
            note_content: note_content.to_string(),
        };
        self.run_mutation(self.api.add_note(ticket_id, &request))
            .await?;

        let updated_at = Utc::now();
        self.core.patch(|state| {
            if let Some(selected) = state.selected.as_mut() {
                if selected.ticket_id == ticket_id {
                    selected.last_updated_at = updated_at;
                }
            }
        });
        Ok(())
    }

    /// Assign the ticket to an agent, or unassign it when `assigned_to`
    /// is `None` or empty.
    pub async fn assign_ticket(
        &self,
        ticket_id: &str,
        assigned_to: Option<String>,
    ) -> Result<(), ApiError> {
        let assigned_to = assigned_to.filter(|a| !a.is_empty());
        let request = AssignTicketRequest {
            assigned_to: assigned_to.clone(),
        };
        self.run_mutation(self.api.assign(ticket_id, &request))
            .await?;

        let updated_at = Utc::now();
        self.core.patch(|state| {
            if let Some(ticket) = state.items.iter_mut().find(|t| t.ticket_id == ticket_id) {
                ticket.assigned_to = assigned_to.clone();
                ticket.last_updated_at = updated_at;
            }
            if let Some(selected) = state.selected.as_mut() {
                if selected.ticket_id == ticket_id {
                    selected.assigned_to = assigned_to.clone();
                    selected.last_updated_at = updated_at;
                }
            }
        });
        Ok(())
    }

    /// Export the current view as a file download. Failures surface to the
    /// caller only.
    pub async fn export_tickets(&self) -> Result<Vec<u8>, ApiError> {
        let params = self.search_params();
        self.core.race(self.api.export(&params)).await
    }

    pub fn clear_selected_ticket(&self) {
        self.core.clear_selected();
    }

    pub fn clear_error(&self) {
        self.core.clear_error();
    }

    pub fn snapshot(&self) -> CollectionState<SupportTicketDto> {
        self.core.snapshot()
    }

    /// Stop the store: cancels in-flight fetches and rejects new ones.
    pub fn close(&self) {
        self.core.close();
    }

    async fn run_mutation<F>(&self, op: F) -> Result<(), ApiError>
    where
        F: std::future::Future<Output = Result<AckResponse, ApiError>>,
    {
        match self.core.race(op).await {
            Ok(_ack) => Ok(()),
            Err(error) => {
                self.core.set_error(&error);
                Err(error)
            }
        }
    }

    fn write_params(&self) -> RwLockWriteGuard<'_, TicketSearchParams> {
        self.params.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TicketsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketsStore")
            .field("core", &self.core)
            .field("params", &self.search_params())
            .finish()
    }
}
