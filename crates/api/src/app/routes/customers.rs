use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use khata_core::CustomerId;
use khata_infra::LedgerServices;

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/search", get(search_customers))
        .route("/:id", get(get_customer).patch(update_customer).delete(delete_customer))
        .route("/:id/summary", get(customer_summary))
}

fn parse_id(raw: &str) -> Result<CustomerId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid customer id"))
}

pub async fn create_customer(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    payload: Result<Json<dto::CreateCustomerRequest>, JsonRejection>,
) -> ApiResult {
    let input = dto::body(payload)?
        .into_domain()
        .map_err(errors::domain_error_to_response)?;

    let customer = services
        .customers
        .create(user.user_id(), input)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((StatusCode::CREATED, Json(dto::customer_to_json(&customer))).into_response())
}

pub async fn list_customers(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
) -> ApiResult {
    let items = services
        .customers
        .list(user.user_id())
        .await
        .map_err(errors::service_error_to_response)?
        .iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn search_customers(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<dto::SearchQueryParams>,
) -> ApiResult {
    let items = services
        .customers
        .search(user.user_id(), params.q.as_deref().unwrap_or_default())
        .await
        .map_err(errors::service_error_to_response)?
        .iter()
        .map(dto::customer_to_json)
        .collect::<Vec<_>>();
    Ok((StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response())
}

pub async fn get_customer(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let customer = services
        .customers
        .get(id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::customer_to_json(&customer))).into_response())
}

pub async fn update_customer(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::UpdateCustomerRequest>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let patch = dto::body(payload)?.into_domain();

    let customer = services
        .customers
        .update(id, user.user_id(), patch)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::customer_to_json(&customer))).into_response())
}

pub async fn delete_customer(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    services
        .customers
        .delete(id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Summary is recomputed from the entries on every request.
pub async fn customer_summary(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let summary = services
        .aggregation
        .summarize(id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::summary_to_json(&summary))).into_response())
}
