//! Library crate for balderdash-back, exposing modules for binaries and integration tests.

/// Configuration file loading.
pub mod config;
/// Session stores and write batches.
pub mod dao;
/// HTTP request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// axum routers.
pub mod routes;
/// Services behind the routes.
pub mod services;
/// Round engine and shared application state.
pub mod state;
