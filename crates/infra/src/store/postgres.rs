//! Postgres-backed transactional store.
//!
//! One [`StoreTransaction`] is one Postgres transaction. Row locks are real
//! `SELECT ... FOR UPDATE` locks, bounded by `SET LOCAL lock_timeout`, and
//! document numbers are protected by a unique index, so the guarantees of
//! [`PersistenceStore`] hold across processes sharing the database.
//!
//! ## Row layout
//!
//! Every table keeps the columns it is filtered, locked or indexed on, plus a
//! `document` JSONB column holding the serialized row. Rows are rebuilt from
//! `document`; the typed columns exist for predicates, constraints and
//! reporting.
//!
//! ## Error mapping
//!
//! | SQLSTATE | meaning | [`StoreError`] |
//! |---|---|---|
//! | `23505` | unique violation | `UniqueViolation` |
//! | `55P03` | lock not available (`lock_timeout` hit) | `LockTimeout` |
//! | `40P01` | deadlock detected | `LockTimeout` |
//! | other / driver errors | | `Backend` |
//!
//! ## Runtime
//!
//! The store trait is synchronous; each statement is driven to completion
//! on the [`Handle`] given at construction. Call it from a thread that is
//! not itself a runtime worker (e.g. inside `spawn_blocking`).

use std::time::Duration;

use serde::de::DeserializeOwned;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow, Postgres};
use sqlx::types::Json;
use sqlx::{Row, Transaction};
use tokio::runtime::Handle;
use uuid::Uuid;

use stockflow_auth::RowPredicate;
use stockflow_core::{AggregateRoot, CompanyId, ProductId, WarehouseId};
use stockflow_inventory::{
    Company, DocumentType, Product, SequenceKey, StockKey, StockMovementRecord, StockTransfer,
    TransferId, Warehouse, WarehouseStock,
};

use super::r#trait::{LockMode, PersistenceStore, StoreResult, StoreTransaction};
use crate::error::StoreError;

/// Tables and indexes used by [`PostgresStore`]. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS companies (
    id          UUID PRIMARY KEY,
    tenant_id   UUID NOT NULL,
    document    JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS warehouses (
    id          UUID PRIMARY KEY,
    tenant_id   UUID NOT NULL,
    company_id  UUID NOT NULL REFERENCES companies (id),
    active      BOOLEAN NOT NULL,
    document    JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    id          UUID PRIMARY KEY,
    tenant_id   UUID NOT NULL,
    company_id  UUID NOT NULL REFERENCES companies (id),
    active      BOOLEAN NOT NULL,
    document    JSONB NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_transfers (
    id            UUID PRIMARY KEY,
    tenant_id     UUID NOT NULL,
    company_id    UUID NOT NULL REFERENCES companies (id),
    number        TEXT,
    number_prefix TEXT,
    number_year   INTEGER,
    number_seq    BIGINT,
    status        TEXT NOT NULL,
    version       BIGINT NOT NULL,
    document      JSONB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS stock_transfers_number_uq
    ON stock_transfers (tenant_id, company_id, number);

CREATE INDEX IF NOT EXISTS stock_transfers_series_idx
    ON stock_transfers (tenant_id, company_id, number_prefix, number_year);

CREATE TABLE IF NOT EXISTS warehouse_stock (
    warehouse_id UUID NOT NULL REFERENCES warehouses (id),
    product_id   UUID NOT NULL REFERENCES products (id),
    tenant_id    UUID NOT NULL,
    company_id   UUID NOT NULL,
    quantity     NUMERIC(28, 4) NOT NULL CHECK (quantity >= 0),
    updated_at   TIMESTAMPTZ NOT NULL,
    document     JSONB NOT NULL,
    PRIMARY KEY (warehouse_id, product_id)
);

CREATE TABLE IF NOT EXISTS stock_movements (
    position     BIGSERIAL PRIMARY KEY,
    id           UUID NOT NULL UNIQUE,
    tenant_id    UUID NOT NULL,
    company_id   UUID NOT NULL,
    warehouse_id UUID NOT NULL,
    product_id   UUID NOT NULL,
    transfer_id  UUID,
    occurred_at  TIMESTAMPTZ NOT NULL,
    document     JSONB NOT NULL
);

CREATE INDEX IF NOT EXISTS stock_movements_key_idx
    ON stock_movements (warehouse_id, product_id, position);

CREATE TABLE IF NOT EXISTS document_sequences (
    tenant_id   UUID NOT NULL,
    company_id  UUID NOT NULL,
    doc_type    TEXT NOT NULL,
    year        INTEGER NOT NULL,
    last_issued BIGINT,
    PRIMARY KEY (tenant_id, company_id, doc_type, year)
);
"#;

/// Predicate columns shared by every scoped read: `$1` tenant, `$2` company.
const SCOPE_FILTER: &str =
    "($1::uuid IS NULL OR tenant_id = $1) AND ($2::uuid IS NULL OR company_id = $2)";

/// Postgres implementation of [`PersistenceStore`].
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    runtime: Handle,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(pool: PgPool, runtime: Handle) -> Self {
        Self {
            pool,
            runtime,
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Pool that connects on first use; no I/O happens here.
    pub fn connect_lazy(database_url: &str, runtime: Handle) -> StoreResult<Self> {
        let _entered = runtime.enter();
        let pool = PgPoolOptions::new()
            .connect_lazy(database_url)
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, runtime))
    }

    /// Create missing tables and indexes.
    pub fn ensure_schema(&self) -> StoreResult<()> {
        self.runtime
            .block_on(sqlx::raw_sql(SCHEMA).execute(&self.pool))
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        tracing::info!("stock schema ensured");
        Ok(())
    }
}

impl PersistenceStore for PostgresStore {
    fn begin(&self) -> StoreResult<Box<dyn StoreTransaction + '_>> {
        let mut tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(|e| map_sqlx_error("begin", e))?;

        let timeout = format!("{}ms", self.lock_timeout.as_millis());
        self.runtime
            .block_on(
                sqlx::query("SELECT set_config('lock_timeout', $1, true)")
                    .bind(timeout)
                    .execute(&mut *tx),
            )
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PostgresTransaction {
            tx,
            runtime: self.runtime.clone(),
        }))
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
    runtime: Handle,
}

impl PostgresTransaction {
    fn conn(&mut self) -> (&Handle, &mut PgConnection) {
        (&self.runtime, &mut *self.tx)
    }

    fn fetch_document<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        sql: &str,
        predicate: &RowPredicate,
        id: Uuid,
    ) -> StoreResult<Option<T>> {
        let (tenant_id, company_id) = predicate_binds(predicate);
        let (runtime, conn) = self.conn();
        let row = runtime
            .block_on(
                sqlx::query(sql)
                    .bind(tenant_id)
                    .bind(company_id)
                    .bind(id)
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|r| document(operation, &r)).transpose()
    }

    fn execute(
        &mut self,
        operation: &'static str,
        query: sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments>,
    ) -> StoreResult<u64> {
        let (runtime, conn) = self.conn();
        let done = runtime
            .block_on(query.execute(conn))
            .map_err(|e| map_sqlx_error(operation, e))?;
        Ok(done.rows_affected())
    }
}

impl StoreTransaction for PostgresTransaction {
    fn load_company(&mut self, predicate: &RowPredicate, id: CompanyId) -> StoreResult<Option<Company>> {
        // Companies carry no company column; the company half of the predicate
        // is matched against the id itself.
        self.fetch_document(
            "load_company",
            "SELECT document FROM companies \
             WHERE ($1::uuid IS NULL OR tenant_id = $1) AND ($2::uuid IS NULL OR id = $2) AND id = $3",
            predicate,
            *id.as_uuid(),
        )
    }

    fn insert_company(&mut self, company: Company) -> StoreResult<()> {
        let query = sqlx::query("INSERT INTO companies (id, tenant_id, document) VALUES ($1, $2, $3)")
            .bind(*company.id.as_uuid())
            .bind(*company.tenant_id.as_uuid())
            .bind(Json(company));
        self.execute("insert_company", query).map(|_| ())
    }

    fn load_warehouse(
        &mut self,
        predicate: &RowPredicate,
        id: WarehouseId,
    ) -> StoreResult<Option<Warehouse>> {
        self.fetch_document(
            "load_warehouse",
            &format!("SELECT document FROM warehouses WHERE {SCOPE_FILTER} AND id = $3"),
            predicate,
            *id.as_uuid(),
        )
    }

    fn insert_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO warehouses (id, tenant_id, company_id, active, document) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*warehouse.id.as_uuid())
        .bind(*warehouse.tenant_id.as_uuid())
        .bind(*warehouse.company_id.as_uuid())
        .bind(warehouse.active)
        .bind(Json(warehouse));
        self.execute("insert_warehouse", query).map(|_| ())
    }

    fn update_warehouse(&mut self, warehouse: Warehouse) -> StoreResult<()> {
        let id = warehouse.id;
        let query = sqlx::query(
            "UPDATE warehouses SET active = $4, document = $5 \
             WHERE id = $1 AND tenant_id = $2 AND company_id = $3",
        )
        .bind(*warehouse.id.as_uuid())
        .bind(*warehouse.tenant_id.as_uuid())
        .bind(*warehouse.company_id.as_uuid())
        .bind(warehouse.active)
        .bind(Json(warehouse));
        match self.execute("update_warehouse", query)? {
            0 => Err(StoreError::TenantIsolation(format!(
                "update of missing warehouse {id}"
            ))),
            _ => Ok(()),
        }
    }

    fn load_product(&mut self, predicate: &RowPredicate, id: ProductId) -> StoreResult<Option<Product>> {
        self.fetch_document(
            "load_product",
            &format!("SELECT document FROM products WHERE {SCOPE_FILTER} AND id = $3"),
            predicate,
            *id.as_uuid(),
        )
    }

    fn insert_product(&mut self, product: Product) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO products (id, tenant_id, company_id, active, document) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(*product.id.as_uuid())
        .bind(*product.tenant_id.as_uuid())
        .bind(*product.company_id.as_uuid())
        .bind(product.active)
        .bind(Json(product));
        self.execute("insert_product", query).map(|_| ())
    }

    fn load_transfer(
        &mut self,
        predicate: &RowPredicate,
        id: TransferId,
        mode: LockMode,
    ) -> StoreResult<Option<StockTransfer>> {
        self.fetch_document(
            "load_transfer",
            &format!(
                "SELECT document FROM stock_transfers WHERE {SCOPE_FILTER} AND id = $3{}",
                lock_clause(mode)
            ),
            predicate,
            *id.0.as_uuid(),
        )
    }

    fn insert_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()> {
        let header = TransferHeader::of(&transfer);
        let query = sqlx::query(
            "INSERT INTO stock_transfers \
             (id, tenant_id, company_id, number, number_prefix, number_year, number_seq, status, version, document) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        );
        let query = header.bind(query).bind(Json(transfer));
        self.execute("insert_transfer", query).map(|_| ())
    }

    fn update_transfer(&mut self, transfer: StockTransfer) -> StoreResult<()> {
        let header = TransferHeader::of(&transfer);
        let id = transfer.id_typed();
        let query = sqlx::query(
            "UPDATE stock_transfers SET number = $4, number_prefix = $5, number_year = $6, \
             number_seq = $7, status = $8, version = $9, document = $10 \
             WHERE id = $1 AND tenant_id = $2 AND company_id = $3",
        );
        let query = header.bind(query).bind(Json(transfer));
        match self.execute("update_transfer", query)? {
            0 => Err(StoreError::TenantIsolation(format!(
                "update of missing transfer {id}"
            ))),
            _ => Ok(()),
        }
    }

    fn delete_transfer(&mut self, predicate: &RowPredicate, id: TransferId) -> StoreResult<bool> {
        let (tenant_id, company_id) = predicate_binds(predicate);
        let sql = format!("DELETE FROM stock_transfers WHERE {SCOPE_FILTER} AND id = $3");
        let query = sqlx::query(&sql)
            .bind(tenant_id)
            .bind(company_id)
            .bind(*id.0.as_uuid());
        Ok(self.execute("delete_transfer", query)? > 0)
    }

    fn list_transfers(&mut self, predicate: &RowPredicate) -> StoreResult<Vec<StockTransfer>> {
        let (tenant_id, company_id) = predicate_binds(predicate);
        let sql = format!(
            "SELECT document FROM stock_transfers WHERE {SCOPE_FILTER} \
             ORDER BY number_prefix NULLS FIRST, number_year NULLS FIRST, number_seq NULLS FIRST, id"
        );
        let (runtime, conn) = self.conn();
        let rows = runtime
            .block_on(sqlx::query(&sql).bind(tenant_id).bind(company_id).fetch_all(conn))
            .map_err(|e| map_sqlx_error("list_transfers", e))?;
        rows.iter().map(|r| document("list_transfers", r)).collect()
    }

    fn load_stock(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
        mode: LockMode,
    ) -> StoreResult<Option<WarehouseStock>> {
        if mode == LockMode::ForUpdate {
            // FOR UPDATE can't lock a row that doesn't exist yet; the advisory
            // lock covers the first insert of a (warehouse, product) pair.
            let query = sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(advisory_key(key));
            self.execute("lock_stock_key", query)?;
        }

        let (tenant_id, company_id) = predicate_binds(predicate);
        let sql = format!(
            "SELECT document FROM warehouse_stock \
             WHERE {SCOPE_FILTER} AND warehouse_id = $3 AND product_id = $4{}",
            lock_clause(mode)
        );
        let (runtime, conn) = self.conn();
        let row = runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(company_id)
                    .bind(*key.warehouse_id.as_uuid())
                    .bind(*key.product_id.as_uuid())
                    .fetch_optional(conn),
            )
            .map_err(|e| map_sqlx_error("load_stock", e))?;
        row.map(|r| document("load_stock", &r)).transpose()
    }

    fn upsert_stock(&mut self, row: WarehouseStock) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO warehouse_stock \
             (warehouse_id, product_id, tenant_id, company_id, quantity, updated_at, document) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (warehouse_id, product_id) DO UPDATE SET \
             quantity = EXCLUDED.quantity, updated_at = EXCLUDED.updated_at, document = EXCLUDED.document \
             WHERE warehouse_stock.tenant_id = EXCLUDED.tenant_id \
             AND warehouse_stock.company_id = EXCLUDED.company_id",
        )
        .bind(*row.warehouse_id.as_uuid())
        .bind(*row.product_id.as_uuid())
        .bind(*row.tenant_id.as_uuid())
        .bind(*row.company_id.as_uuid())
        .bind(row.quantity().value())
        .bind(row.updated_at)
        .bind(Json(row.clone()));
        match self.execute("upsert_stock", query)? {
            0 => Err(StoreError::TenantIsolation(format!(
                "{} is owned by another company",
                row.key()
            ))),
            _ => Ok(()),
        }
    }

    fn append_movement(&mut self, record: StockMovementRecord) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO stock_movements \
             (id, tenant_id, company_id, warehouse_id, product_id, transfer_id, occurred_at, document) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(*record.tenant_id.as_uuid())
        .bind(*record.company_id.as_uuid())
        .bind(*record.warehouse_id.as_uuid())
        .bind(*record.product_id.as_uuid())
        .bind(record.transfer_id.map(|t| *t.0.as_uuid()))
        .bind(record.occurred_at)
        .bind(Json(record));
        self.execute("append_movement", query).map(|_| ())
    }

    fn list_movements(
        &mut self,
        predicate: &RowPredicate,
        key: StockKey,
    ) -> StoreResult<Vec<StockMovementRecord>> {
        let (tenant_id, company_id) = predicate_binds(predicate);
        let sql = format!(
            "SELECT document FROM stock_movements \
             WHERE {SCOPE_FILTER} AND warehouse_id = $3 AND product_id = $4 ORDER BY position"
        );
        let (runtime, conn) = self.conn();
        let rows = runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(company_id)
                    .bind(*key.warehouse_id.as_uuid())
                    .bind(*key.product_id.as_uuid())
                    .fetch_all(conn),
            )
            .map_err(|e| map_sqlx_error("list_movements", e))?;
        rows.iter().map(|r| document("list_movements", r)).collect()
    }

    fn lock_sequence(&mut self, key: &SequenceKey) -> StoreResult<Option<u64>> {
        // Make sure a row exists to lock; a concurrent first insert waits on
        // the primary key until the other transaction ends.
        let query = sqlx::query(
            "INSERT INTO document_sequences (tenant_id, company_id, doc_type, year, last_issued) \
             VALUES ($1, $2, $3, $4, NULL) ON CONFLICT DO NOTHING",
        );
        self.execute("seed_sequence", bind_sequence_key(query, key))?;

        let (runtime, conn) = self.conn();
        let row = runtime
            .block_on(
                bind_sequence_key(
                    sqlx::query(
                        "SELECT last_issued FROM document_sequences \
                         WHERE tenant_id = $1 AND company_id = $2 AND doc_type = $3 AND year = $4 \
                         FOR UPDATE",
                    ),
                    key,
                )
                .fetch_one(conn),
            )
            .map_err(|e| map_sqlx_error("lock_sequence", e))?;
        let last: Option<i64> = row
            .try_get("last_issued")
            .map_err(|e| map_sqlx_error("lock_sequence", e))?;
        Ok(last.map(|n| n as u64))
    }

    fn store_sequence(&mut self, key: &SequenceKey, last_issued: u64) -> StoreResult<()> {
        let query = sqlx::query(
            "UPDATE document_sequences SET last_issued = $5 \
             WHERE tenant_id = $1 AND company_id = $2 AND doc_type = $3 AND year = $4",
        );
        let query = bind_sequence_key(query, key).bind(last_issued as i64);
        match self.execute("store_sequence", query)? {
            0 => Err(StoreError::Backend(format!("{key} was never locked"))),
            _ => Ok(()),
        }
    }

    fn max_document_sequence(
        &mut self,
        predicate: &RowPredicate,
        doc_type: DocumentType,
        year: i32,
    ) -> StoreResult<Option<u64>> {
        let (tenant_id, company_id) = predicate_binds(predicate);
        let sql = format!(
            "SELECT MAX(number_seq) AS max_seq FROM stock_transfers \
             WHERE {SCOPE_FILTER} AND number_prefix = $3 AND number_year = $4"
        );
        let (runtime, conn) = self.conn();
        let row = runtime
            .block_on(
                sqlx::query(&sql)
                    .bind(tenant_id)
                    .bind(company_id)
                    .bind(doc_type.prefix())
                    .bind(year)
                    .fetch_one(conn),
            )
            .map_err(|e| map_sqlx_error("max_document_sequence", e))?;
        let max: Option<i64> = row
            .try_get("max_seq")
            .map_err(|e| map_sqlx_error("max_document_sequence", e))?;
        Ok(max.map(|n| n as u64))
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let Self { tx, runtime } = *self;
        runtime
            .block_on(tx.commit())
            .map_err(|e| map_sqlx_error("commit", e))
    }

    fn rollback(self: Box<Self>) -> StoreResult<()> {
        let Self { tx, runtime } = *self;
        runtime
            .block_on(tx.rollback())
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

/// Typed header columns of a transfer row.
struct TransferHeader {
    id: Uuid,
    tenant_id: Uuid,
    company_id: Uuid,
    number: Option<String>,
    prefix: Option<&'static str>,
    year: Option<i32>,
    sequence: Option<i64>,
    status: &'static str,
    version: i64,
}

impl TransferHeader {
    fn of(transfer: &StockTransfer) -> Self {
        let (tenant_id, company_id) = transfer.owner();
        let number = transfer.number();
        Self {
            id: *transfer.id_typed().0.as_uuid(),
            tenant_id: *tenant_id.as_uuid(),
            company_id: *company_id.as_uuid(),
            number: number.map(|n| n.to_string()),
            prefix: number.map(|n| n.doc_type().prefix()),
            year: number.map(|n| n.year()),
            sequence: number.map(|n| n.sequence() as i64),
            status: transfer.status().as_str(),
            version: transfer.version() as i64,
        }
    }

    /// Binds `$1..=$9` in column order.
    fn bind<'q>(
        self,
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    ) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
        query
            .bind(self.id)
            .bind(self.tenant_id)
            .bind(self.company_id)
            .bind(self.number)
            .bind(self.prefix)
            .bind(self.year)
            .bind(self.sequence)
            .bind(self.status)
            .bind(self.version)
    }
}

fn bind_sequence_key<'q>(
    query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    key: &SequenceKey,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    query
        .bind(*key.tenant_id.as_uuid())
        .bind(*key.company_id.as_uuid())
        .bind(key.doc_type.prefix())
        .bind(key.year)
}

fn predicate_binds(predicate: &RowPredicate) -> (Option<Uuid>, Option<Uuid>) {
    (
        predicate.tenant_id().map(|t| *t.as_uuid()),
        predicate.company_id().map(|c| *c.as_uuid()),
    )
}

fn lock_clause(mode: LockMode) -> &'static str {
    match mode {
        LockMode::Read => "",
        LockMode::ForUpdate => " FOR UPDATE",
    }
}

/// Stable 64-bit key of a (warehouse, product) pair for advisory locking.
///
/// Collisions only make two unrelated keys serialise.
fn advisory_key(key: StockKey) -> i64 {
    let (w_hi, w_lo) = key.warehouse_id.as_uuid().as_u64_pair();
    let (p_hi, p_lo) = key.product_id.as_uuid().as_u64_pair();
    (w_hi ^ w_lo ^ p_hi.rotate_left(21) ^ p_lo.rotate_left(43)) as i64
}

fn document<T: DeserializeOwned>(operation: &str, row: &PgRow) -> StoreResult<T> {
    let Json(value) = row
        .try_get::<Json<T>, _>("document")
        .map_err(|e| StoreError::Backend(format!("{operation}: undecodable row: {e}")))?;
    Ok(value)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation(msg),
                Some("55P03") | Some("40P01") => {
                    tracing::warn!(operation, "row lock wait failed");
                    StoreError::LockTimeout(msg)
                }
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Backend(format!("{operation}: timed out waiting for a connection"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
