//! Swatch import API server library.
//!
//! Exposes configuration, state, error handling, routes and the import
//! engine so integration tests and the binary entrypoint share them.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod storage;
