//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs, parameter parsing and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};

use khata_core::BusinessZone;
use khata_infra::LedgerServices;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the router over a fresh in-memory store (dev and tests).
pub fn build_app(jwt_secret: String) -> Router {
    build_app_with(LedgerServices::in_memory(BusinessZone::utc()), jwt_secret)
}

/// Build the full HTTP router over already-wired services.
pub fn build_app_with(services: LedgerServices, jwt_secret: String) -> Router {
    let jwt = Arc::new(khata_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    // Protected routes: require a valid bearer token.
    let protected = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
