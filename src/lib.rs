//! Headless state layer for the GameHub admin console.
//!
//! Wraps the console backend in typed async stores: one session store that
//! owns authentication, one store per admin resource (accounts, service
//! health, support tickets, dashboard), plus route guarding and background
//! polling. Stores expose snapshots of observable state; callers render
//! them however they like.
//!
//! [`Console`] assembles the whole thing; the individual stores can also
//! be wired by hand against any [`ApiClient`].

pub mod accounts;
pub use accounts::AccountsStore;
mod auth;
pub use auth::TokenCell;
pub mod client;
pub use client::{ApiClient, ApiClientBuilder};
pub mod collection;
pub use collection::{CollectionState, Page};
mod console;
pub use console::{Console, ConsoleBuilder};
pub mod dashboard;
pub use dashboard::DashboardStore;
mod error;
pub use error::{ApiError, ConfigError};
pub mod guard;
pub use guard::{Layout, RouteDecision};
pub mod health;
pub use health::HealthStore;
pub mod persist;
pub use persist::{FileSessionStorage, MemorySessionStorage, SessionStorage};
mod poll;
pub use poll::PollingController;
pub mod session;
pub use session::{SessionState, SessionStore, UserIdentity};
pub mod tickets;
pub use tickets::TicketsStore;
