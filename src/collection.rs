//! Shared machinery for paged resource stores.
//!
//! Every resource store (accounts, tickets) keeps a [`CollectionState`]
//! behind a lock and runs its fetches through a [`CollectionCore`], which
//! provides the two guarantees the stores rely on:
//!
//! * **Monotonic results.** Each fetch takes a sequence ticket when it
//!   starts; a result whose ticket is no longer the latest is discarded, so
//!   a slow response can never overwrite a newer one.
//! * **Cancellation.** Closing the core wakes every in-flight
//!   [`race`](CollectionCore::race) with [`ApiError::Cancelled`], and later
//!   fetch attempts fail fast.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;

use crate::error::ApiError;

/// One page of a listing, after the endpoint-specific envelope has been
/// stripped off.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Observable state of a paged collection with an optional selected detail
/// record (`S`, which defaults to the list item type).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T, S = T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub current_page: u32,
    pub total_pages: u32,
    pub loading: bool,
    pub error: Option<String>,
    pub selected: Option<S>,
}

impl<T, S> Default for CollectionState<T, S> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            current_page: 1,
            total_pages: 0,
            loading: false,
            error: None,
            selected: None,
        }
    }
}

/// Cancellation handle shared by every store: a closed teardown wakes
/// in-flight [`race`](Teardown::race) calls and marks the owner as shut
/// down for good.
pub(crate) struct Teardown {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl Teardown {
    pub(crate) fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Run `fut` against the shutdown signal. Returns
    /// [`ApiError::Cancelled`] if the owner is closed before (or while)
    /// the future resolves.
    pub(crate) async fn race<F, R>(&self, fut: F) -> Result<R, ApiError>
    where
        F: Future<Output = Result<R, ApiError>>,
    {
        let mut shutdown = self.rx.clone();
        if *shutdown.borrow() {
            return Err(ApiError::Cancelled);
        }
        tokio::select! {
            _ = shutdown.changed() => Err(ApiError::Cancelled),
            result = fut => result,
        }
    }

    /// Idempotent.
    pub(crate) fn close(&self) {
        let _ = self.tx.send(true);
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.rx.borrow()
    }
}

/// State cell plus fetch bookkeeping, shared by the resource stores.
pub(crate) struct CollectionCore<T, S = T> {
    state: RwLock<CollectionState<T, S>>,
    list_seq: AtomicU64,
    detail_seq: AtomicU64,
    teardown: Teardown,
}

impl<T, S> CollectionCore<T, S> {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(CollectionState::default()),
            list_seq: AtomicU64::new(0),
            detail_seq: AtomicU64::new(0),
            teardown: Teardown::new(),
        }
    }

    /// Start a list fetch: flips `loading` on, clears the error, and hands
    /// back the sequence ticket the matching [`finish_list`] must present.
    pub(crate) fn begin_list(&self) -> Result<u64, ApiError> {
        if self.is_closed() {
            return Err(ApiError::Cancelled);
        }
        let seq = self.list_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.write();
        state.loading = true;
        state.error = None;
        Ok(seq)
    }

    /// Record the outcome of a list fetch.
    ///
    /// A ticket that is no longer the latest means a newer fetch has
    /// started; the result (success or failure) is dropped on the floor. A
    /// cancelled fetch leaves state untouched, since the store is closing.
    ///
    /// [`finish_list`]: Self::finish_list
    pub(crate) fn finish_list(
        &self,
        seq: u64,
        result: Result<Page<T>, ApiError>,
    ) -> Result<(), ApiError> {
        if seq != self.list_seq.load(Ordering::SeqCst) {
            tracing::debug!(seq, "discarding superseded list result");
            return Ok(());
        }
        match result {
            Ok(page) => {
                let mut state = self.write();
                state.items = page.items;
                state.total_count = page.total_count;
                state.current_page = page.current_page;
                state.total_pages = page.total_pages;
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

    /// Start a detail fetch. Same contract as [`begin_list`](Self::begin_list),
    /// with its own ticket sequence so list and detail fetches never gate
    /// each other.
    pub(crate) fn begin_detail(&self) -> Result<u64, ApiError> {
        if self.is_closed() {
            return Err(ApiError::Cancelled);
        }
        let seq = self.detail_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.write();
        state.loading = true;
        state.error = None;
        Ok(seq)
    }

    /// Record the outcome of a detail fetch into `selected`.
    pub(crate) fn finish_detail(&self, seq: u64, result: Result<S, ApiError>) -> Result<(), ApiError> {
        if seq != self.detail_seq.load(Ordering::SeqCst) {
            tracing::debug!(seq, "discarding superseded detail result");
            return Ok(());
        }
        match result {
            Ok(detail) => {
                let mut state = self.write();
                state.selected = Some(detail);
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

    /// Run `fut` against the shutdown signal. Returns
    /// [`ApiError::Cancelled`] if the core is closed before (or while) the
    /// future resolves.
    pub(crate) async fn race<F, R>(&self, fut: F) -> Result<R, ApiError>
    where
        F: Future<Output = Result<R, ApiError>>,
    {
        self.teardown.race(fut).await
    }

    /// Apply an in-place mutation to the state. Used for optimistic patches
    /// after a mutation endpoint succeeds.
    pub(crate) fn patch(&self, f: impl FnOnce(&mut CollectionState<T, S>)) {
        f(&mut self.write());
    }

    /// Record a mutation failure. Unlike a fetch failure this leaves
    /// `loading` alone: mutations never flipped it on. Cancellation is
    /// teardown, not a user-visible failure, and is not recorded.
    pub(crate) fn set_error(&self, error: &ApiError) {
        if matches!(error, ApiError::Cancelled) {
            return;
        }
        self.write().error = Some(error.user_message());
    }

    pub(crate) fn clear_selected(&self) {
        self.write().selected = None;
    }

    pub(crate) fn clear_error(&self) {
        self.write().error = None;
    }

    /// Stop the core: wakes in-flight races and makes future `begin_*`
    /// calls fail with [`ApiError::Cancelled`]. Idempotent.
    pub(crate) fn close(&self) {
        self.teardown.close();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.teardown.is_closed()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, CollectionState<T, S>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CollectionState<T, S>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone, S: Clone> CollectionCore<T, S> {
    pub(crate) fn snapshot(&self) -> CollectionState<T, S> {
        self.read().clone()
    }
}

impl<T, S> std::fmt::Debug for CollectionCore<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionCore")
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(items: Vec<&str>) -> Page<String> {
        Page {
            total_count: items.len() as u64,
            current_page: 1,
            total_pages: 1,
            items: items.into_iter().map(String::from).collect(),
        }
    }

    fn fetch_error() -> ApiError {
        ApiError::Api {
            status: 500,
            message: "backend down".into(),
        }
    }

    #[test]
    fn list_fetch_happy_path_updates_items_and_clears_loading() {
        let core: CollectionCore<String> = CollectionCore::new();

        let seq = core.begin_list().expect("begin");
        assert!(core.snapshot().loading);

        core.finish_list(seq, Ok(page(vec!["a", "b"])))
            .expect("finish");

        let state = core.snapshot();
        assert_eq!(state.items, vec!["a", "b"]);
        assert_eq!(state.total_count, 2);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[test]
    fn superseded_success_is_discarded() {
        let core: CollectionCore<String> = CollectionCore::new();

        let first = core.begin_list().expect("begin first");
        let second = core.begin_list().expect("begin second");

        // The slow first response arrives after the second fetch started.
        core.finish_list(first, Ok(page(vec!["stale"]))).expect("finish");
        assert!(core.snapshot().items.is_empty());
        assert!(core.snapshot().loading, "second fetch is still in flight");

        core.finish_list(second, Ok(page(vec!["fresh"]))).expect("finish");
        assert_eq!(core.snapshot().items, vec!["fresh"]);
        assert!(!core.snapshot().loading);
    }

    #[test]
    fn superseded_failure_is_discarded() {
        let core: CollectionCore<String> = CollectionCore::new();

        let first = core.begin_list().expect("begin first");
        let _second = core.begin_list().expect("begin second");

        core.finish_list(first, Err(fetch_error())).expect("discarded");
        assert!(core.snapshot().error.is_none());
    }

    #[test]
    fn list_failure_records_user_message() {
        let core: CollectionCore<String> = CollectionCore::new();

        let seq = core.begin_list().expect("begin");
        let err = core
            .finish_list(seq, Err(fetch_error()))
            .expect_err("failure should propagate");
        assert!(err.is_status(500));

        let state = core.snapshot();
        assert_eq!(state.error.as_deref(), Some("backend down"));
        assert!(!state.loading);
    }

    #[test]
    fn begin_clears_previous_error() {
        let core: CollectionCore<String> = CollectionCore::new();

        let seq = core.begin_list().expect("begin");
        let _ = core.finish_list(seq, Err(fetch_error()));
        assert!(core.snapshot().error.is_some());

        let _ = core.begin_list().expect("begin again");
        assert!(core.snapshot().error.is_none());
    }

    #[test]
    fn detail_fetch_sets_selected_without_touching_items() {
        let core: CollectionCore<String> = CollectionCore::new();
        let seq = core.begin_list().expect("begin");
        core.finish_list(seq, Ok(page(vec!["a"]))).expect("finish");

        let seq = core.begin_detail().expect("begin detail");
        core.finish_detail(seq, Ok("detail".to_string()))
            .expect("finish detail");

        let state = core.snapshot();
        assert_eq!(state.selected.as_deref(), Some("detail"));
        assert_eq!(state.items, vec!["a"]);
    }

    #[test]
    fn closed_core_rejects_new_fetches() {
        let core: CollectionCore<String> = CollectionCore::new();
        core.close();

        let err = core.begin_list().expect_err("closed");
        assert!(matches!(err, ApiError::Cancelled));
        let err = core.begin_detail().expect_err("closed");
        assert!(matches!(err, ApiError::Cancelled));
    }

    #[test]
    fn close_is_idempotent() {
        let core: CollectionCore<String> = CollectionCore::new();
        core.close();
        core.close();
        assert!(core.is_closed());
    }

    #[tokio::test]
    async fn race_returns_cancelled_when_already_closed() {
        let core: CollectionCore<String> = CollectionCore::new();
        core.close();

        let err = core
            .race(std::future::pending::<Result<(), ApiError>>())
            .await
            .expect_err("closed core cancels immediately");
        assert!(matches!(err, ApiError::Cancelled));
    }

    #[tokio::test]
    async fn race_is_woken_by_close() {
        let core: std::sync::Arc<CollectionCore<String>> = std::sync::Arc::new(CollectionCore::new());

        let closer = core.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            closer.close();
        });

        let err = core
            .race(std::future::pending::<Result<(), ApiError>>())
            .await
            .expect_err("close should cancel the in-flight future");
        assert!(matches!(err, ApiError::Cancelled));
    }

    #[tokio::test]
    async fn race_passes_through_a_resolved_future() {
        let core: CollectionCore<String> = CollectionCore::new();
        let value = core.race(async { Ok(7u32) }).await.expect("resolves");
        assert_eq!(value, 7);
    }

    #[test]
    fn cancelled_finish_leaves_state_untouched() {
        let core: CollectionCore<String> = CollectionCore::new();
        let seq = core.begin_list().expect("begin");
        core.close();

        let err = core
            .finish_list(seq, Err(ApiError::Cancelled))
            .expect_err("cancellation propagates");
        assert!(matches!(err, ApiError::Cancelled));
        assert!(core.snapshot().error.is_none(), "teardown is not a user error");
    }

    #[test]
    fn set_error_leaves_loading_alone() {
        let core: CollectionCore<String> = CollectionCore::new();
        let _ = core.begin_list().expect("begin");

        core.set_error(&fetch_error());

        let state = core.snapshot();
        assert_eq!(state.error.as_deref(), Some("backend down"));
        assert!(state.loading, "mutation failures do not clear the fetch flag");
    }

    #[test]
    fn set_error_ignores_cancellation() {
        let core: CollectionCore<String> = CollectionCore::new();
        core.set_error(&ApiError::Cancelled);
        assert!(core.snapshot().error.is_none());
    }

    #[test]
    fn patch_and_clear_helpers() {
        let core: CollectionCore<String> = CollectionCore::new();
        core.patch(|state| {
            state.selected = Some("picked".to_string());
            state.error = Some("boom".to_string());
        });

        core.clear_error();
        assert!(core.snapshot().error.is_none());

        core.clear_selected();
        assert!(core.snapshot().selected.is_none());
    }
}
