//! Quib daemon: HTTP API over the shared progression engine and store.

pub mod ai;
pub mod auth;
pub mod chain;
pub mod config;
pub mod middleware;
pub mod routes;
pub mod server;
