//! Core types for Bazaar.
//!
//! This module provides type-safe wrappers for the marketplace domain.

pub mod catalog;
pub mod email;
pub mod id;
pub mod price;
pub mod status;
pub mod user;

pub use catalog::{Category, Page, PageMeta, Product, Seller};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use status::AuthStatus;
pub use user::User;
