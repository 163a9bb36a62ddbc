//! Postgres-backed ledger store.
//!
//! ## Error Mapping
//!
//! | SQLx error | PostgreSQL code | Result |
//! |------------|-----------------|--------|
//! | Database (unique violation) | `23505` | `WriteOutcome::Duplicate` on inserts, else `Backend` |
//! | Database (serialization failure / deadlock) | `40001` / `40P01` | `Transient` |
//! | Database (connection exception, admin shutdown) | `08xxx` / `57P01` | `Transient` |
//! | Database (other) | any other | `Backend` |
//! | PoolTimedOut, Io | N/A | `Transient` |
//! | Decode / ColumnDecode | N/A | `Corrupt` |
//! | Other | N/A | `Backend` |
//!
//! ## Locking
//!
//! Entry writes take the parent customer row `FOR SHARE` in the same transaction,
//! and customer deletion takes it `FOR UPDATE`. An append therefore either sees
//! the customer and commits before the delete proceeds, or waits and then finds
//! it gone. Multi-query reads run in one `REPEATABLE READ` transaction so a
//! summary never mixes two states.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use khata_core::{BusinessZone, CustomerId, EntryId, Owned, UserId};
use khata_customers::{Customer, CustomerPatch, SearchQuery};
use khata_ledger::{CustomerLedger, EntryFilter, EntryPatch, EntryType, LedgerEntry};

use super::{LedgerStore, StoreError, StoreResult, WriteOutcome};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS customers (
        id          uuid PRIMARY KEY,
        owner_id    uuid NOT NULL,
        name        text NOT NULL CHECK (char_length(name) BETWEEN 1 AND 255),
        phone       text NULL CHECK (phone IS NULL OR char_length(phone) <= 20),
        address     text NULL,
        created_at  timestamptz NOT NULL,
        updated_at  timestamptz NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS customers_owner_created_idx ON customers (owner_id, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id           uuid PRIMARY KEY,
        customer_id  uuid NOT NULL REFERENCES customers (id),
        entry_type   text NOT NULL CHECK (entry_type IN ('CREDIT', 'DEBIT')),
        amount       numeric(12, 2) NOT NULL CHECK (amount > 0),
        note         text NULL,
        created_at   timestamptz NOT NULL,
        updated_at   timestamptz NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_customer_created_idx ON ledger_entries (customer_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS ledger_entries_type_idx ON ledger_entries (entry_type)",
];

const CUSTOMER_COLUMNS: &str = "id, owner_id, name, phone, address, created_at, updated_at";
const ENTRY_COLUMNS: &str =
    "e.id, e.customer_id, e.entry_type, e.amount, e.note, e.created_at, e.updated_at";

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `url`. The URL is never logged.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip_all, err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        tracing::info!("ledger schema ready");
        Ok(())
    }

    async fn begin(&self, operation: &str) -> StoreResult<Transaction<'_, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(operation, e))
    }

    async fn begin_snapshot(&self, operation: &str) -> StoreResult<Transaction<'_, Postgres>> {
        let mut tx = self.begin(operation).await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(tx)
    }
}

/// An id clash with a row the caller cannot see is reported like a missing row.
fn collision<T>(owned_by_caller: bool) -> WriteOutcome<T> {
    if owned_by_caller {
        WriteOutcome::Duplicate
    } else {
        WriteOutcome::NotFound
    }
}

async fn commit(tx: Transaction<'_, Postgres>, operation: &str) -> StoreResult<()> {
    tx.commit().await.map_err(|e| map_sqlx_error(operation, e))
}

async fn rollback(tx: Transaction<'_, Postgres>, operation: &str) -> StoreResult<()> {
    tx.rollback().await.map_err(|e| map_sqlx_error(operation, e))
}

/// Lock the customer row if `owner` owns it. `None` otherwise.
async fn lock_owned_customer(
    tx: &mut Transaction<'_, Postgres>,
    owner: UserId,
    id: CustomerId,
    mode: &str,
    operation: &str,
) -> StoreResult<Option<PgRow>> {
    let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND owner_id = $2 {mode}");
    sqlx::query(&sql)
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error(operation, e))
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(skip_all, fields(user_id = %customer.owner(), customer_id = %customer.id_typed()), err)]
    async fn insert_customer(&self, customer: &Customer) -> StoreResult<WriteOutcome<Customer>> {
        let result = sqlx::query(
            r#"
            INSERT INTO customers (id, owner_id, name, phone, address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(customer.id_typed().as_uuid())
        .bind(customer.owner().as_uuid())
        .bind(customer.name())
        .bind(customer.phone())
        .bind(customer.address())
        .bind(customer.created_at())
        .bind(customer.updated_at())
        .execute(&*self.pool)
        .await;

        match result {
            Ok(_) => Ok(WriteOutcome::Applied(customer.clone())),
            Err(e) if is_unique_violation(&e) => {
                let owned = self.find_customer(customer.owner(), customer.id_typed()).await?;
                Ok(collision(owned.is_some()))
            }
            Err(e) => Err(map_sqlx_error("insert_customer", e)),
        }
    }

    #[instrument(skip_all, fields(user_id = %owner, customer_id = %id), err)]
    async fn find_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND owner_id = $2");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(owner.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_customer", e))?;

        row.as_ref().map(customer_from_row).transpose()
    }

    #[instrument(skip_all, fields(user_id = %owner), err)]
    async fn list_customers(&self, owner: UserId) -> StoreResult<Vec<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_customers", e))?;

        rows.iter().map(customer_from_row).collect()
    }

    #[instrument(skip_all, fields(user_id = %owner), err)]
    async fn search_customers(&self, owner: UserId, query: &SearchQuery) -> StoreResult<Vec<Customer>> {
        let sql = format!(
            r#"
            SELECT {CUSTOMER_COLUMNS}
            FROM customers
            WHERE owner_id = $1
                AND (name ILIKE $2 ESCAPE '\' OR phone ILIKE $2 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .bind(query.like_pattern())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("search_customers", e))?;

        let customers: Vec<Customer> = rows.iter().map(customer_from_row).collect::<StoreResult<_>>()?;
        tracing::debug!(matches = customers.len(), "customer search");
        Ok(customers)
    }

    #[instrument(skip_all, fields(user_id = %owner, customer_id = %id), err)]
    async fn update_customer(
        &self,
        owner: UserId,
        id: CustomerId,
        patch: &CustomerPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<Customer>> {
        let mut tx = self.begin("update_customer").await?;

        let Some(row) = lock_owned_customer(&mut tx, owner, id, "FOR UPDATE", "update_customer").await? else {
            rollback(tx, "update_customer").await?;
            return Ok(WriteOutcome::NotFound);
        };
        let current = customer_from_row(&row)?;
        let updated = match current.apply_patch(patch, now) {
            Ok(c) => c,
            Err(e) => {
                rollback(tx, "update_customer").await?;
                return Ok(WriteOutcome::Rejected(e));
            }
        };

        sqlx::query(
            r#"
            UPDATE customers
            SET name = $2, phone = $3, address = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(updated.name())
        .bind(updated.phone())
        .bind(updated.address())
        .bind(updated.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_customer", e))?;

        commit(tx, "update_customer").await?;
        Ok(WriteOutcome::Applied(updated))
    }

    #[instrument(skip_all, fields(user_id = %owner, customer_id = %id), err)]
    async fn delete_customer(&self, owner: UserId, id: CustomerId) -> StoreResult<WriteOutcome<u64>> {
        let mut tx = self.begin("delete_customer").await?;

        if lock_owned_customer(&mut tx, owner, id, "FOR UPDATE", "delete_customer")
            .await?
            .is_none()
        {
            rollback(tx, "delete_customer").await?;
            return Ok(WriteOutcome::NotFound);
        }

        let removed = sqlx::query("DELETE FROM ledger_entries WHERE customer_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer_entries", e))?
            .rows_affected();

        sqlx::query("DELETE FROM customers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_customer", e))?;

        commit(tx, "delete_customer").await?;
        Ok(WriteOutcome::Applied(removed))
    }

    #[instrument(
        skip_all,
        fields(user_id = %owner, customer_id = %entry.customer_id(), entry_id = %entry.id_typed()),
        err
    )]
    async fn insert_entry(&self, owner: UserId, entry: &LedgerEntry) -> StoreResult<WriteOutcome<LedgerEntry>> {
        let mut tx = self.begin("insert_entry").await?;

        if lock_owned_customer(&mut tx, owner, entry.customer_id(), "FOR SHARE", "insert_entry")
            .await?
            .is_none()
        {
            rollback(tx, "insert_entry").await?;
            return Ok(WriteOutcome::NotFound);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, customer_id, entry_type, amount, note, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id_typed().as_uuid())
        .bind(entry.customer_id().as_uuid())
        .bind(entry.entry_type().as_str())
        .bind(entry.amount().value())
        .bind(entry.note())
        .bind(entry.created_at())
        .bind(entry.updated_at())
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                rollback(tx, "insert_entry").await?;
                let owned = self.find_entry(owner, entry.id_typed()).await?;
                return Ok(collision(owned.is_some()));
            }
            Err(e) => return Err(map_sqlx_error("insert_entry", e)),
        }

        commit(tx, "insert_entry").await?;
        Ok(WriteOutcome::Applied(entry.clone()))
    }

    #[instrument(skip_all, fields(user_id = %owner, entry_id = %id), err)]
    async fn find_entry(&self, owner: UserId, id: EntryId) -> StoreResult<Option<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries e
            JOIN customers c ON c.id = e.customer_id
            WHERE e.id = $1 AND c.owner_id = $2
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(owner.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_entry", e))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    #[instrument(skip_all, fields(user_id = %owner, entry_id = %id), err)]
    async fn update_entry(
        &self,
        owner: UserId,
        id: EntryId,
        patch: &EntryPatch,
        now: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome<LedgerEntry>> {
        let mut tx = self.begin("update_entry").await?;

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries e
            JOIN customers c ON c.id = e.customer_id
            WHERE e.id = $1 AND c.owner_id = $2
            FOR UPDATE OF e FOR SHARE OF c
            "#
        );
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(owner.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_entry", e))?;

        let Some(row) = row else {
            rollback(tx, "update_entry").await?;
            return Ok(WriteOutcome::NotFound);
        };
        let updated = entry_from_row(&row)?.apply_patch(patch, now);

        sqlx::query(
            r#"
            UPDATE ledger_entries
            SET entry_type = $2, amount = $3, note = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(updated.entry_type().as_str())
        .bind(updated.amount().value())
        .bind(updated.note())
        .bind(updated.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_entry", e))?;

        commit(tx, "update_entry").await?;
        Ok(WriteOutcome::Applied(updated))
    }

    #[instrument(skip_all, fields(user_id = %owner, entry_id = %id), err)]
    async fn delete_entry(&self, owner: UserId, id: EntryId) -> StoreResult<WriteOutcome<()>> {
        let affected = sqlx::query(
            r#"
            DELETE FROM ledger_entries e
            USING customers c
            WHERE e.id = $1 AND c.id = e.customer_id AND c.owner_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(owner.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_entry", e))?
        .rows_affected();

        if affected == 0 {
            Ok(WriteOutcome::NotFound)
        } else {
            Ok(WriteOutcome::Applied(()))
        }
    }

    #[instrument(skip_all, fields(user_id = %owner, customer_id = %customer_id), err)]
    async fn customer_ledger(
        &self,
        owner: UserId,
        customer_id: CustomerId,
        filter: &EntryFilter,
        zone: BusinessZone,
    ) -> StoreResult<Option<CustomerLedger>> {
        let mut tx = self.begin_snapshot("customer_ledger").await?;

        let Some(row) = lock_owned_customer(&mut tx, owner, customer_id, "", "customer_ledger").await? else {
            rollback(tx, "customer_ledger").await?;
            return Ok(None);
        };
        let customer = customer_from_row(&row)?;

        let (from, until) = filter
            .date_range
            .map(|r| r.utc_bounds(zone))
            .unwrap_or((None, None));
        let entry_type = filter.entry_type.map(|t| t.as_str());

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries e
            WHERE e.customer_id = $1
                AND ($2::timestamptz IS NULL OR e.created_at >= $2)
                AND ($3::timestamptz IS NULL OR e.created_at < $3)
                AND ($4::text IS NULL OR e.entry_type = $4)
            ORDER BY e.created_at DESC, e.id DESC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(customer_id.as_uuid())
            .bind(from)
            .bind(until)
            .bind(entry_type)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("customer_ledger", e))?;
        let entries = rows.iter().map(entry_from_row).collect::<StoreResult<Vec<_>>>()?;

        commit(tx, "customer_ledger").await?;
        tracing::debug!(entries = entries.len(), "customer ledger loaded");
        Ok(Some(CustomerLedger { customer, entries }))
    }

    #[instrument(skip_all, fields(user_id = %owner), err)]
    async fn owner_ledgers(&self, owner: UserId) -> StoreResult<Vec<CustomerLedger>> {
        let mut tx = self.begin_snapshot("owner_ledgers").await?;

        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let customer_rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("owner_ledgers", e))?;

        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries e
            JOIN customers c ON c.id = e.customer_id
            WHERE c.owner_id = $1
            ORDER BY e.created_at DESC, e.id DESC
            "#
        );
        let entry_rows = sqlx::query(&sql)
            .bind(owner.as_uuid())
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("owner_ledgers", e))?;

        commit(tx, "owner_ledgers").await?;

        let mut by_customer: HashMap<CustomerId, Vec<LedgerEntry>> = HashMap::new();
        for row in &entry_rows {
            let entry = entry_from_row(row)?;
            by_customer.entry(entry.customer_id()).or_default().push(entry);
        }

        customer_rows
            .iter()
            .map(|row| {
                let customer = customer_from_row(row)?;
                let entries = by_customer.remove(&customer.id_typed()).unwrap_or_default();
                Ok(CustomerLedger { customer, entries })
            })
            .collect()
    }
}

fn customer_from_row(row: &PgRow) -> StoreResult<Customer> {
    let get = |e: sqlx::Error| StoreError::Corrupt(format!("customer row: {e}"));
    Ok(Customer::from_parts(
        CustomerId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        UserId::from_uuid(row.try_get::<Uuid, _>("owner_id").map_err(get)?),
        row.try_get("name").map_err(get)?,
        row.try_get("phone").map_err(get)?,
        row.try_get("address").map_err(get)?,
        row.try_get("created_at").map_err(get)?,
        row.try_get("updated_at").map_err(get)?,
    ))
}

fn entry_from_row(row: &PgRow) -> StoreResult<LedgerEntry> {
    let get = |e: sqlx::Error| StoreError::Corrupt(format!("ledger entry row: {e}"));
    let raw_type: String = row.try_get("entry_type").map_err(get)?;
    let entry_type = EntryType::from_str(&raw_type)
        .map_err(|e| StoreError::Corrupt(format!("ledger entry row: {e}")))?;
    let amount: Decimal = row.try_get("amount").map_err(get)?;

    LedgerEntry::from_parts(
        EntryId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id").map_err(get)?),
        entry_type,
        amount,
        row.try_get("note").map_err(get)?,
        row.try_get("created_at").map_err(get)?,
        row.try_get("updated_at").map_err(get)?,
    )
    .map_err(|e| StoreError::Corrupt(format!("ledger entry row: {e}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected, admin_shutdown
                Some("40001") | Some("40P01") | Some("57P01") => StoreError::Transient(msg),
                // connection_exception class
                Some(code) if code.starts_with("08") => StoreError::Transient(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::Io(e) => StoreError::Transient(format!("io error in {}: {}", operation, e)),
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        e @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, e))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}
