use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use khata_core::EntryId;
use khata_infra::{LedgerServices, services::parse_customer_scope};

use crate::app::dto;
use crate::app::errors::{self, ApiResult};
use crate::context::UserContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_entry))
        .route("/by-customer", get(by_customer))
        .route("/filter-by-date", get(filter_by_date))
        .route("/filter-by-type", get(filter_by_type))
        .route("/statistics", get(statistics))
        .route("/:id", get(get_entry).patch(update_entry).delete(delete_entry))
}

fn parse_id(raw: &str) -> Result<EntryId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid ledger entry id"))
}

pub async fn create_entry(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    payload: Result<Json<dto::CreateEntryRequest>, JsonRejection>,
) -> ApiResult {
    let input = dto::body(payload)?
        .into_domain()
        .map_err(errors::domain_error_to_response)?;

    let created = services
        .entries
        .append(user.user_id(), input)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((StatusCode::CREATED, Json(dto::entry_to_json(&created, services.zone))).into_response())
}

pub async fn get_entry(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let entry = services
        .entries
        .get(id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::entry_to_json(&entry, services.zone))).into_response())
}

pub async fn update_entry(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::UpdateEntryRequest>, JsonRejection>,
) -> ApiResult {
    let id = parse_id(&id)?;
    let patch = dto::body(payload)?
        .into_domain()
        .map_err(errors::domain_error_to_response)?;

    let entry = services
        .entries
        .update(id, user.user_id(), patch)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::entry_to_json(&entry, services.zone))).into_response())
}

pub async fn delete_entry(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> ApiResult {
    let id = parse_id(&id)?;
    services
        .entries
        .delete(id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// A customer's entries with the summary over exactly those entries.
pub async fn by_customer(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<dto::CustomerScopeParams>,
) -> ApiResult {
    let customer_id =
        parse_customer_scope(params.customer_id.as_deref()).map_err(errors::domain_error_to_response)?;

    let statement = services
        .aggregation
        .customer_ledger(customer_id, user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::statement_to_json(&statement, services.zone))).into_response())
}

pub async fn filter_by_date(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<dto::DateFilterParams>,
) -> ApiResult {
    let customer_id =
        parse_customer_scope(params.customer_id.as_deref()).map_err(errors::domain_error_to_response)?;
    let (start, end) = params.dates().map_err(errors::domain_error_to_response)?;

    let ledger = services
        .queries
        .filter_by_date(customer_id, user.user_id(), start, end)
        .await
        .map_err(errors::service_error_to_response)?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "customer": dto::customer_ref(&ledger.customer),
            "date_range": {
                "start": start.map(|d| d.to_string()),
                "end": end.map(|d| d.to_string()),
            },
            "entries": dto::entries_to_json(&ledger.entries, services.zone),
            "total_entries": ledger.entries.len(),
        })),
    )
        .into_response())
}

pub async fn filter_by_type(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
    Query(params): Query<dto::TypeFilterParams>,
) -> ApiResult {
    let customer_id =
        parse_customer_scope(params.customer_id.as_deref()).map_err(errors::domain_error_to_response)?;
    let entry_type = params.entry_type().map_err(errors::domain_error_to_response)?;

    let result = services
        .queries
        .filter_by_type(customer_id, user.user_id(), entry_type)
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::type_filter_to_json(&result, services.zone))).into_response())
}

pub async fn statistics(
    Extension(services): Extension<Arc<LedgerServices>>,
    Extension(user): Extension<UserContext>,
) -> ApiResult {
    let stats = services
        .aggregation
        .statistics(user.user_id())
        .await
        .map_err(errors::service_error_to_response)?;
    Ok((StatusCode::OK, Json(dto::statistics_to_json(&stats))).into_response())
}
