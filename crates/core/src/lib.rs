//! Bazaar Core - Shared domain types.
//!
//! This crate provides the types exchanged between the Bazaar components:
//! - `client` - HTTP client, session store and data-fetch helpers
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients, no storage.
//! Wire-format quirks of the backend (envelopes, numeric vs string ids) are
//! handled in the client crate; everything here is the canonical shape.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, prices, users, catalog entries and auth status

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
