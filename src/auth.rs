//! Shared, refreshable bearer-token slot read by the HTTP client.

use std::sync::{Arc, PoisonError, RwLock};

/// Shared slot holding the current bearer token as a refreshable string.
///
/// The cell is cloned into the HTTP client at construction and read
/// synchronously at request-build time. Only session transitions write it:
/// login/signup success set the token, logout and the 401 path clear it.
/// An empty string means "no auth" and suppresses the `Authorization`
/// header entirely.
///
/// Lock poisoning is recovered by taking the inner value; the cell holds a
/// plain string, so a writer panicking mid-update cannot leave it in a
/// torn state.
#[derive(Clone, Debug, Default)]
pub struct TokenCell {
    token: Arc<RwLock<String>>,
}

impl TokenCell {
    /// Create an empty cell (no token).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell pre-loaded with a token. Used when restoring a
    /// persisted session.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.into())),
        }
    }

    /// Replace the stored token. Visible to every clone of this cell on
    /// the next request.
    pub fn set(&self, token: &str) {
        let mut slot = self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = token.to_string();
    }

    /// Reset to "no auth".
    pub fn clear(&self) {
        self.set("");
    }

    /// The current token, or `None` when the cell is empty.
    pub fn bearer(&self) -> Option<String> {
        let slot = self
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_empty() {
            None
        } else {
            Some(slot.clone())
        }
    }

    /// True when a token is present.
    pub fn is_set(&self) -> bool {
        self.bearer().is_some()
    }
}
