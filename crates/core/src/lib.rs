//! Bugdesk Core - Shared domain types.
//!
//! This crate provides the types exchanged between the Bugdesk client layer
//! and the remote bug-tracking service:
//! - `client` - Session, cache and mutation layer over the remote API
//! - `cli` - Terminal front end driving the client layer
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, emails, roles, bug records and paginated results

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
