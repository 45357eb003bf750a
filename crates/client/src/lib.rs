//! Bugdesk client library.
//!
//! Session and server-state synchronization for the Bugdesk bug tracker:
//!
//! - [`session`] - authentication lifecycle and persistence
//! - [`guard`] / [`views`] - role-gated navigation
//! - [`cache`] / [`queries`] - keyed, de-duplicated remote reads
//! - [`mutations`] - remote writes with targeted cache invalidation
//! - [`search`] - debounced search input
//! - [`previews`] - transient local handles for attachment previews
//! - [`scope`] - exactly-once release of a view's resources
//!
//! [`Bugdesk`] wires all of them together around one [`ApiClient`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod mutations;
pub mod permissions;
pub mod previews;
pub mod queries;
pub mod scope;
pub mod search;
pub mod session;
pub mod state;
pub mod views;

pub use api::ApiClient;
pub use config::{CacheConfig, ClientConfig, ConfigError};
pub use error::{ClientError, PreviewError};
pub use state::Bugdesk;
