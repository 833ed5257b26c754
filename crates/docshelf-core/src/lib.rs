//! Docshelf core - client session and cache layer for the docshelf OCR
//! document service.
//!
//! This crate owns the parts of the client with real failure modes:
//! persisting bearer credentials, renewing the access token in the
//! background without racing itself, reacting to forced-expiration
//! signals, and keeping workspace-scoped cache state consistent as the
//! user moves between workspaces. Rendering, upload forms, and the rest
//! of the UI live in the app crates and talk to this one through
//! `SessionManager`, `WorkspaceCache`, and `ApiClient`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
