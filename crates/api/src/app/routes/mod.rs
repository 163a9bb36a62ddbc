use axum::{routing::get, Router};

pub mod customers;
pub mod entries;
pub mod system;

/// Router for all authenticated (user-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/customers", customers::router())
        .nest("/ledger-entries", entries::router())
}
