//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store, gateways, notifier and the services built on them
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use jobboard_auth::Hs256JwtValidator;
use jobboard_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, BootstrapError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: AppConfig) -> Result<Router, BootstrapError> {
    let services = services::build_services(config).await?;
    Ok(build_router(Arc::new(services)))
}

/// Router over already-built services.
pub fn build_router(services: Arc<AppServices>) -> Router {
    let jwt = Arc::new(Hs256JwtValidator::new(services.config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState { jwt };

    routes::router()
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(axum::middleware::from_fn_with_state(
                    auth_state,
                    middleware::auth_middleware,
                )),
        )
        .route("/health", get(routes::system::health))
}
