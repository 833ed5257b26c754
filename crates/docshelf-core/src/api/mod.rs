//! REST client module for the docshelf service.
//!
//! This module provides the `ApiClient` for the authentication endpoints
//! and the workspace data the cache coordinator is fed with. The client
//! also implements `TokenRefresher`, making it the production transport
//! behind the refresh scheduler.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
