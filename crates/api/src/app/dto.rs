use core::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, SecondsFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use khata_core::{Amount, BusinessZone, CustomerId, DomainError, DomainResult};
use khata_customers::{Customer, CustomerPatch, NewCustomer};
use khata_infra::services::{CustomerStatement, TypeFilterResult};
use khata_ledger::{CustomerSummary, EntryPatch, EntryType, LedgerEntry, NewEntry, Statistics, parse_date};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// `amount` is accepted as a JSON string (`"150.25"`) or number (`150.25`).
/// Entry ids are always assigned by the server.
#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    #[serde(alias = "customer")]
    pub customer_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub amount: Option<Value>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntryRequest {
    #[serde(alias = "customer")]
    pub customer_id: Option<Value>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
    pub amount: Option<Value>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerScopeParams {
    pub customer_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DateFilterParams {
    pub customer_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TypeFilterParams {
    pub customer_id: Option<String>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

// -------------------------
// Request parsing
// -------------------------

/// Unwrap a JSON body, reporting malformed bodies as 400.
pub fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text()))
}

impl CreateCustomerRequest {
    pub fn into_domain(self) -> DomainResult<NewCustomer> {
        let name = self
            .name
            .ok_or_else(|| DomainError::validation("name is required"))?;
        Ok(NewCustomer {
            name,
            phone: self.phone,
            address: self.address,
        })
    }
}

impl UpdateCustomerRequest {
    pub fn into_domain(self) -> CustomerPatch {
        CustomerPatch {
            name: self.name,
            phone: self.phone,
            address: self.address,
        }
    }
}

impl CreateEntryRequest {
    pub fn into_domain(self) -> DomainResult<NewEntry> {
        let customer_id: CustomerId = self
            .customer_id
            .as_deref()
            .ok_or_else(|| DomainError::validation("customer_id is required"))?
            .parse()?;
        let entry_type = self
            .entry_type
            .as_deref()
            .ok_or_else(|| DomainError::validation("type must be CREDIT or DEBIT"))?
            .parse()?;
        let amount = parse_amount(
            self.amount
                .as_ref()
                .ok_or_else(|| DomainError::validation("amount is required"))?,
        )?;

        Ok(NewEntry {
            customer_id,
            entry_type,
            amount,
            note: self.note,
        })
    }
}

impl UpdateEntryRequest {
    pub fn into_domain(self) -> DomainResult<EntryPatch> {
        if self.customer_id.is_some() {
            return Err(DomainError::validation("an entry cannot be moved to another customer"));
        }
        Ok(EntryPatch {
            entry_type: self.entry_type.as_deref().map(EntryType::from_str).transpose()?,
            amount: self.amount.as_ref().map(parse_amount).transpose()?,
            note: self.note,
        })
    }
}

impl DateFilterParams {
    pub fn dates(&self) -> DomainResult<(Option<NaiveDate>, Option<NaiveDate>)> {
        let start = non_blank(&self.start_date)
            .map(|raw| parse_date("start_date", raw))
            .transpose()?;
        let end = non_blank(&self.end_date)
            .map(|raw| parse_date("end_date", raw))
            .transpose()?;
        Ok((start, end))
    }
}

impl TypeFilterParams {
    pub fn entry_type(&self) -> DomainResult<EntryType> {
        non_blank(&self.entry_type)
            .ok_or_else(|| DomainError::validation("type must be CREDIT or DEBIT"))?
            .parse()
    }
}

fn non_blank(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Parse an amount from a JSON string or number. Numbers keep their source text
/// (`arbitrary_precision`), so they never pass through `f64`.
pub fn parse_amount(raw: &Value) -> DomainResult<Amount> {
    match raw {
        Value::String(s) => s.parse(),
        Value::Number(n) => {
            let text = n.to_string();
            let value = Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|_| DomainError::validation(format!("amount '{text}' is not a decimal number")))?;
            Amount::new(value)
        }
        _ => Err(DomainError::validation("amount must be a decimal number or string")),
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn customer_to_json(c: &Customer) -> Value {
    json!({
        "id": c.id_typed().to_string(),
        "name": c.name(),
        "phone": c.phone(),
        "address": c.address(),
        "created_at": c.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
        "updated_at": c.updated_at().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

pub fn customer_ref(c: &Customer) -> Value {
    json!({
        "id": c.id_typed().to_string(),
        "name": c.name(),
    })
}

pub fn entry_to_json(e: &LedgerEntry, zone: BusinessZone) -> Value {
    json!({
        "id": e.id_typed().to_string(),
        "customer_id": e.customer_id().to_string(),
        "type": e.entry_type().as_str(),
        "type_display": e.entry_type().label(),
        "amount": e.amount().to_string(),
        "note": e.note(),
        "entry_date": e.entry_date(zone).to_string(),
        "created_at": e.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
        "updated_at": e.updated_at().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

pub fn entries_to_json(entries: &[LedgerEntry], zone: BusinessZone) -> Vec<Value> {
    entries.iter().map(|e| entry_to_json(e, zone)).collect()
}

/// Customer details plus account figures.
pub fn summary_to_json(s: &CustomerSummary) -> Value {
    let c = &s.customer;
    json!({
        "id": c.id_typed().to_string(),
        "name": c.name(),
        "phone": c.phone(),
        "address": c.address(),
        "total_credit": s.total_credit.to_string(),
        "total_debit": s.total_debit.to_string(),
        "balance": s.balance.to_string(),
        "entries_count": s.entries_count,
        "created_at": c.created_at().to_rfc3339_opts(SecondsFormat::Micros, true),
    })
}

pub fn statement_to_json(statement: &CustomerStatement, zone: BusinessZone) -> Value {
    let s = &statement.summary;
    json!({
        "customer": customer_ref(statement.customer()),
        "entries": entries_to_json(&statement.entries, zone),
        "summary": {
            "total_credit": s.total_credit.to_string(),
            "total_debit": s.total_debit.to_string(),
            "balance": s.balance.to_string(),
            "entries_count": s.entries_count,
        },
    })
}

pub fn type_filter_to_json(result: &TypeFilterResult, zone: BusinessZone) -> Value {
    json!({
        "customer": customer_ref(&result.customer),
        "type": result.entry_type.as_str(),
        "entries": entries_to_json(&result.entries, zone),
        "total_amount": result.total_amount.to_string(),
        "entries_count": result.entries_count,
    })
}

pub fn statistics_to_json(s: &Statistics) -> Value {
    json!({
        "total_customers": s.total_customers,
        "total_credit": s.total_credit.to_string(),
        "total_debit": s.total_debit.to_string(),
        "total_balance": s.total_balance.to_string(),
        "total_entries": s.total_entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_parse_from_strings_and_numbers() {
        assert_eq!(parse_amount(&json!("150.25")).unwrap().to_string(), "150.25");
        assert_eq!(parse_amount(&json!(150.25)).unwrap().to_string(), "150.25");
        assert_eq!(parse_amount(&json!(7)).unwrap().to_string(), "7.00");
    }

    #[test]
    fn number_amounts_keep_their_source_digits() {
        let body: Value = serde_json::from_str(r#"{"a": 1.0000000000000001, "b": 1234567890.12}"#).unwrap();
        assert!(matches!(parse_amount(&body["a"]), Err(DomainError::Validation(_))));
        assert_eq!(parse_amount(&body["b"]).unwrap().to_string(), "1234567890.12");
    }

    #[test]
    fn bad_amounts_are_validation_errors() {
        for raw in [json!("0"), json!(-1), json!("1.005"), json!("ten"), json!(true), json!(null)] {
            assert!(
                matches!(parse_amount(&raw), Err(DomainError::Validation(_))),
                "amount {raw}"
            );
        }
    }

    #[test]
    fn entry_request_requires_customer_type_and_amount() {
        let req = CreateEntryRequest {
            customer_id: None,
            entry_type: Some("CREDIT".into()),
            amount: Some(json!("1")),
            note: None,
        };
        assert!(matches!(req.into_domain(), Err(DomainError::Validation(_))));

        let req = CreateEntryRequest {
            customer_id: Some(CustomerId::new().to_string()),
            entry_type: Some("credit".into()),
            amount: Some(json!("1")),
            note: None,
        };
        assert!(matches!(req.into_domain(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn entry_update_cannot_change_customer() {
        let req = UpdateEntryRequest {
            customer_id: Some(json!(CustomerId::new().to_string())),
            entry_type: None,
            amount: None,
            note: None,
        };
        assert!(matches!(req.into_domain(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn blank_date_bounds_are_open() {
        let params = DateFilterParams {
            customer_id: None,
            start_date: Some(" ".into()),
            end_date: Some("2024-03-10".into()),
        };
        let (start, end) = params.dates().unwrap();
        assert_eq!(start, None);
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 10));

        let params = DateFilterParams {
            customer_id: None,
            start_date: Some("10/03/2024".into()),
            end_date: None,
        };
        assert!(matches!(params.dates(), Err(DomainError::Validation(_))));
    }
}
