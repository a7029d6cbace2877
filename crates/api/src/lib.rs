//! HTTP API: routing, auth, provider callbacks and error mapping.

pub mod app;
pub mod context;
pub mod middleware;
