//! Accounts administration: list/detail fetches, moderation actions
//! (ban, unban, disconnect), and subscription management.
//!
//! Mutations apply a targeted local patch to the cached rows instead of
//! re-fetching the whole page: a successful ban stamps `locked_out` on the
//! matching entry (and on the selected detail record when it is the same
//! account), leaving every other row and the pagination counters alone.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::collection::{CollectionCore, CollectionState, Page};
use crate::error::ApiError;

/// Wire values are numeric discriminants, as served by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Gender {
    Male = 0,
    Female = 1,
}

impl From<Gender> for u8 {
    fn from(value: Gender) -> u8 {
        value as u8
    }
}

impl TryFrom<u8> for Gender {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Male),
            1 => Ok(Self::Female),
            other => Err(format!("unknown gender {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RequiredActionType {
    Skip = 0,
    ConfirmEmail = 1,
    EnableMfa = 2,
    CompleteUserInformation = 3,
}

impl From<RequiredActionType> for u8 {
    fn from(value: RequiredActionType) -> u8 {
        value as u8
    }
}

impl TryFrom<u8> for RequiredActionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Skip),
            1 => Ok(Self::ConfirmEmail),
            2 => Ok(Self::EnableMfa),
            3 => Ok(Self::CompleteUserInformation),
            other => Err(format!("unknown required action type {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubscriptionType {
    Basic = 0,
    Premium = 1,
}

impl From<SubscriptionType> for u8 {
    fn from(value: SubscriptionType) -> u8 {
        value as u8
    }
}

impl TryFrom<u8> for SubscriptionType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Basic),
            1 => Ok(Self::Premium),
            other => Err(format!("unknown subscription type {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubscriptionStatus {
    Pending = 0,
    Active = 1,
    Expired = 2,
    Canceled = 3,
    Trial = 4,
}

impl From<SubscriptionStatus> for u8 {
    fn from(value: SubscriptionStatus) -> u8 {
        value as u8
    }
}

impl TryFrom<u8> for SubscriptionStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pending),
            1 => Ok(Self::Active),
            2 => Ok(Self::Expired),
            3 => Ok(Self::Canceled),
            4 => Ok(Self::Trial),
            other => Err(format!("unknown subscription status {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubscriptionPlan {
    Monthly = 0,
    Yearly = 1,
    Lifetime = 2,
}

impl From<SubscriptionPlan> for u8 {
    fn from(value: SubscriptionPlan) -> u8 {
        value as u8
    }
}

impl TryFrom<u8> for SubscriptionPlan {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Monthly),
            1 => Ok(Self::Yearly),
            2 => Ok(Self::Lifetime),
            other => Err(format!("unknown subscription plan {other}")),
        }
    }
}

/// Sort direction for the list query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDto {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Profile record attached to an account, when one exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub user_id: Option<String>,
    pub date_of_birth: Option<DateTime<Utc>>,
    pub display_name: Option<String>,
    pub gender: Option<Gender>,
    pub avatar: Option<String>,
    pub address: Option<AddressDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredActionDto {
    pub account_id: Option<String>,
    pub required_action_type: Option<RequiredActionType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDto {
    pub id: String,
    pub subscription_type: SubscriptionType,
    pub status: SubscriptionStatus,
    pub plan: SubscriptionPlan,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// One row of the accounts table. `locked_out` doubles as the ban flag: a
/// present timestamp means the account is currently banned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDto {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub email_confirmation: bool,
    #[serde(default)]
    pub required_actions: Vec<RequiredActionDto>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionDto>,
    pub user_id: Option<String>,
    pub locked_out: Option<DateTime<Utc>>,
    pub created_on: Option<DateTime<Utc>>,
}

/// Detail view: the account plus its profile, when the backend has one.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountDetailsResponse {
    pub account: AccountDto,
    pub user: Option<UserDto>,
}

/// The detail endpoint returns the account object itself with the profile
/// embedded under a `user` key, so it is split here rather than on the wire.
#[derive(Debug, Deserialize)]
struct AccountDetailsWire {
    #[serde(flatten)]
    account: AccountDto,
    #[serde(default)]
    user: Option<UserDto>,
}

impl From<AccountDetailsWire> for AccountDetailsResponse {
    fn from(wire: AccountDetailsWire) -> Self {
        Self {
            account: wire.account,
            user: wire.user,
        }
    }
}

/// List envelope for `GET /admin/accounts`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsWire {
    accounts: Vec<AccountDto>,
    total_count: u64,
    current_page: u32,
    total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubscriptionRequest {
    pub account_id: String,
    pub subscription_type: SubscriptionType,
    pub subscription_plan: SubscriptionPlan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub subscription_id: String,
}

/// Column filters for the accounts table. Empty strings and `None` mean
/// "not filtering on this" and are omitted from the query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountFilters {
    pub username: String,
    pub email: String,
    pub email_confirmation: Option<bool>,
    pub subscription_status: Option<SubscriptionStatus>,
    pub subscription_type: Option<SubscriptionType>,
    pub has_required_actions: Option<bool>,
    pub is_locked_out: Option<bool>,
    pub date_from: String,
    pub date_to: String,
}

impl AccountFilters {
    fn append_query_pairs(&self, pairs: &mut Vec<(String, String)>) {
        if !self.username.is_empty() {
            pairs.push(("username".into(), self.username.clone()));
        }
        if !self.email.is_empty() {
            pairs.push(("email".into(), self.email.clone()));
        }
        if let Some(confirmed) = self.email_confirmation {
            pairs.push(("emailConfirmation".into(), confirmed.to_string()));
        }
        if let Some(status) = self.subscription_status {
            pairs.push(("subscriptionStatus".into(), u8::from(status).to_string()));
        }
        if let Some(kind) = self.subscription_type {
            pairs.push(("subscriptionType".into(), u8::from(kind).to_string()));
        }
        if let Some(pending) = self.has_required_actions {
            pairs.push(("hasRequiredActions".into(), pending.to_string()));
        }
        if let Some(locked) = self.is_locked_out {
            pairs.push(("isLockedOut".into(), locked.to_string()));
        }
        if !self.date_from.is_empty() {
            pairs.push(("dateFrom".into(), self.date_from.clone()));
        }
        if !self.date_to.is_empty() {
            pairs.push(("dateTo".into(), self.date_to.clone()));
        }
    }
}

/// Pagination, sorting, and filter parameters for the accounts list.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSearchParams {
    pub page: u32,
    pub page_size: u32,
    pub search_term: String,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub filters: AccountFilters,
}

impl Default for AccountSearchParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 10,
            search_term: String::new(),
            sort_by: "createdOn".into(),
            sort_order: SortOrder::Desc,
            filters: AccountFilters::default(),
        }
    }
}

impl AccountSearchParams {
    /// Flatten into query pairs: pagination and sort always, search term
    /// and filters only when set.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".into(), self.page.to_string()),
            ("pageSize".into(), self.page_size.to_string()),
            ("sortBy".into(), self.sort_by.clone()),
            ("sortOrder".into(), self.sort_order.as_str().into()),
        ];
        if !self.search_term.is_empty() {
            pairs.push(("searchTerm".into(), self.search_term.clone()));
        }
        self.filters.append_query_pairs(&mut pairs);
        pairs
    }
}

/// Partial update for [`AccountSearchParams`]: `Some` fields replace the
/// current value, `None` fields are left alone. `filters` is replaced
/// wholesale, not merged field-by-field.
#[derive(Debug, Clone, Default)]
pub struct AccountSearchPatch {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search_term: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub filters: Option<AccountFilters>,
}

/// Remote accounts endpoints, as a seam so the store can be driven by a
/// mock in tests.
#[async_trait]
pub trait AccountsApi: Send + Sync {
    async fn list(&self, params: &AccountSearchParams) -> Result<Page<AccountDto>, ApiError>;
    async fn details(&self, account_id: &str) -> Result<AccountDetailsResponse, ApiError>;
    async fn ban(&self, account_id: &str) -> Result<(), ApiError>;
    async fn unban(&self, account_id: &str) -> Result<(), ApiError>;
    async fn disconnect(&self, account_id: &str) -> Result<(), ApiError>;
    async fn create_subscription(&self, request: &CreateSubscriptionRequest)
        -> Result<(), ApiError>;
    async fn cancel_subscription(&self, request: &CancelSubscriptionRequest)
        -> Result<(), ApiError>;
    async fn export(&self, params: &AccountSearchParams) -> Result<Vec<u8>, ApiError>;
}

/// [`AccountsApi`] backed by the real HTTP client.
#[derive(Debug, Clone)]
pub struct HttpAccountsApi {
    client: ApiClient,
}

impl HttpAccountsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AccountsApi for HttpAccountsApi {
    async fn list(&self, params: &AccountSearchParams) -> Result<Page<AccountDto>, ApiError> {
        let wire: AccountsWire = self
            .client
            .get_json("/admin/accounts", &params.query_pairs())
            .await?;
        Ok(Page {
            items: wire.accounts,
            total_count: wire.total_count,
            current_page: wire.current_page,
            total_pages: wire.total_pages,
        })
    }

    async fn details(&self, account_id: &str) -> Result<AccountDetailsResponse, ApiError> {
        let wire: AccountDetailsWire = self
            .client
            .get_json(&format!("/admin/accounts/{account_id}"), &[])
            .await?;
        Ok(wire.into())
    }

    async fn ban(&self, account_id: &str) -> Result<(), ApiError> {
        self.client
            .post_unit(&format!("/admin/accounts/{account_id}/ban"))
            .await
    }

    async fn unban(&self, account_id: &str) -> Result<(), ApiError> {
        self.client
            .delete_unit(&format!("/admin/accounts/{account_id}/ban"))
            .await
    }

    async fn disconnect(&self, account_id: &str) -> Result<(), ApiError> {
        self.client
            .post_unit(&format!("/admin/accounts/{account_id}/disconnect"))
            .await
    }

    async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<(), ApiError> {
        self.client.post_json_unit("/admin/subscriptions", request).await
    }

    async fn cancel_subscription(
        &self,
        request: &CancelSubscriptionRequest,
    ) -> Result<(), ApiError> {
        self.client
            .post_json_unit("/admin/subscriptions/cancel", request)
            .await
    }

    async fn export(&self, params: &AccountSearchParams) -> Result<Vec<u8>, ApiError> {
        self.client
            .get_bytes("/admin/accounts/export", &params.query_pairs())
            .await
    }
}

/// State container for the accounts table and detail panel.
pub struct AccountsStore {
    api: Arc<dyn AccountsApi>,
    core: CollectionCore<AccountDto, AccountDetailsResponse>,
    params: RwLock<AccountSearchParams>,
}

impl AccountsStore {
    pub fn new(api: Arc<dyn AccountsApi>) -> Self {
        Self {
            api,
            core: CollectionCore::new(),
            params: RwLock::new(AccountSearchParams::default()),
        }
    }

    /// Shallow-merge a patch into the search parameters. Does not fetch:
    /// callers decide when to re-issue [`fetch_accounts`](Self::fetch_accounts).
    pub fn set_search_params(&self, patch: AccountSearchPatch) {
        let mut params = self.write_params();
        if let Some(page) = patch.page {
            params.page = page;
        }
        if let Some(page_size) = patch.page_size {
            params.page_size = page_size;
        }
        if let Some(search_term) = patch.search_term {
            params.search_term = search_term;
        }
        if let Some(sort_by) = patch.sort_by {
            params.sort_by = sort_by;
        }
        if let Some(sort_order) = patch.sort_order {
            params.sort_order = sort_order;
        }
        if let Some(filters) = patch.filters {
            params.filters = filters;
        }
    }

    pub fn search_params(&self) -> AccountSearchParams {
        self.params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the page described by the current search parameters. On
    /// failure the previous rows stay visible and `error` carries the
    /// user-facing message.
    pub async fn fetch_accounts(&self) -> Result<(), ApiError> {
        let seq = self.core.begin_list()?;
        let params = self.search_params();
        let result = self.core.race(self.api.list(&params)).await;
        self.core.finish_list(seq, result)
    }

    /// Fetch one account into the `selected` slot.
    pub async fn fetch_account_details(&self, account_id: &str) -> Result<(), ApiError> {
        let seq = self.core.begin_detail()?;
        let result = self.core.race(self.api.details(account_id)).await;
        self.core.finish_detail(seq, result)
    }

    /// Ban an account. On success the matching row (and the selected
    /// detail record, if it is the same account) is stamped `locked_out`
    /// locally; nothing else changes and no re-fetch is issued.
    pub async fn ban_account(&self, account_id: &str) -> Result<(), ApiError> {
        self.run_mutation(self.api.ban(account_id)).await?;
        let banned_at = Utc::now();
        self.core.patch(|state| {
            if let Some(account) = state.items.iter_mut().find(|a| a.id == account_id) {
                account.locked_out = Some(banned_at);
            }
            if let Some(selected) = state.selected.as_mut() {
                if selected.account.id == account_id {
                    selected.account.locked_out = Some(banned_at);
                }
            }
        });
        Ok(())
    }

    /// Lift a ban: clears `locked_out` on the matching row and selected
    /// detail record.
    pub async fn unban_account(&self, account_id: &str) -> Result<(), ApiError> {
        self.run_mutation(self.api.unban(account_id)).await?;
        self.core.patch(|state| {
            if let Some(account) = state.items.iter_mut().find(|a| a.id == account_id) {
                account.locked_out = None;
            }
            if let Some(selected) = state.selected.as_mut() {
                if selected.account.id == account_id {
                    selected.account.locked_out = None;
                }
            }
        });
        Ok(())
    }

    /// Force-disconnect the account's live session. Carries no local state
    /// change: the row has nothing to reflect it.
    pub async fn disconnect_player(&self, account_id: &str) -> Result<(), ApiError> {
        self.run_mutation(self.api.disconnect(account_id)).await
    }

    /// Grant a subscription. Callers that need the new subscription row
    /// visible re-fetch the list or details afterwards.
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<(), ApiError> {
        self.run_mutation(self.api.create_subscription(request)).await
    }

    pub async fn cancel_subscription(
        &self,
        request: &CancelSubscriptionRequest,
    ) -> Result<(), ApiError> {
        self.run_mutation(self.api.cancel_subscription(request)).await
    }

    /// Export the current view as a file download. Failures surface to the
    /// caller only; store state is not involved.
    pub async fn export_accounts(&self) -> Result<Vec<u8>, ApiError> {
        let params = self.search_params();
        self.core.race(self.api.export(&params)).await
    }

    pub fn clear_selected_account(&self) {
        self.core.clear_selected();
    }

    pub fn clear_error(&self) {
        self.core.clear_error();
    }

    pub fn snapshot(&self) -> CollectionState<AccountDto, AccountDetailsResponse> {
        self.core.snapshot()
    }

    /// Stop the store: cancels in-flight fetches and rejects new ones.
    pub fn close(&self) {
        self.core.close();
    }

    async fn run_mutation<F>(&self, op: F) -> Result<(), ApiError>
    where
        F: std::future::Future<Output = Result<(), ApiError>>,
    {
        match self.core.race(op).await {
            Ok(()) => Ok(()),
            Err(error) => {
                self.core.set_error(&error);
                Err(error)
            }
        }
    }

    fn write_params(&self) -> RwLockWriteGuard<'_, AccountSearchParams> {
        self.params.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for AccountsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountsStore")
            .field("core", &self.core)
            .field("params", &self.search_params())
            .finish()
    }
}
