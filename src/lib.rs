//! Library crate for olympia-back, exposing modules for binaries and integration tests.

/// Runtime configuration loaded at startup.
pub mod config;
/// Persistence layer.
pub mod dao;
mod dto;
mod error;
/// HTTP surface.
pub mod routes;
/// Point rules of every round.
pub mod scoring;
/// Business operations behind the routes.
pub mod services;
/// Shared application state and the session state machine.
pub mod state;
