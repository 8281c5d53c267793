//! Postgres-backed fact store.
//!
//! The target table is keyed by `(listing_id, updated_at)`. A merge runs in one
//! transaction: schema changes from the plan (`CREATE TABLE IF NOT EXISTS` or
//! `ALTER TABLE ... ADD COLUMN IF NOT EXISTS`) followed by
//! `INSERT ... ON CONFLICT DO NOTHING` per row. Postgres DDL is transactional,
//! so a failed merge leaves neither new columns nor rows behind.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | FactStoreError |
//! |------------|----------------------|----------------|
//! | PoolTimedOut | N/A | `Timeout` |
//! | Database (query canceled) | `57014` | `Timeout` |
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Database (datatype mismatch) | `42804` | `SchemaIncompatible` |
//! | Database (not null violation) | `23502` | `SchemaIncompatible` |
//! | Database (no unique constraint for ON CONFLICT) | `42P10` | `SchemaIncompatible` |
//! | ColumnDecode / Decode | N/A | `SchemaIncompatible` |
//! | Database (other) / PoolClosed / Io / Tls | Any other | `Unavailable` |

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::{Span, info, instrument};

use listing_facts_core::ListingFingerprint;
use listing_facts_listings::{CommittedState, FactRow};

use super::r#trait::{FactStore, FactStoreError, MergeOutcome, validate_rows};
use super::schema::{ColumnKind, ColumnSpec, KEY_COLUMNS, SchemaPlan, fact_columns, is_valid_identifier};

#[derive(Debug, Clone)]
pub struct PostgresFactStore {
    pool: Arc<PgPool>,
    table: String,
}

impl PostgresFactStore {
    /// Fails with `SchemaIncompatible` when `table` is not a plain identifier.
    pub fn new(pool: PgPool, table: impl Into<String>) -> Result<Self, FactStoreError> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(FactStoreError::SchemaIncompatible(format!(
                "'{table}' is not a valid table name"
            )));
        }
        Ok(Self {
            pool: Arc::new(pool),
            table,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table_sql(&self, columns: &[ColumnSpec]) -> String {
        let defs = columns
            .iter()
            .map(|c| {
                let null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{null}", c.name, c.kind.sql_type())
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({defs}, PRIMARY KEY ({}))",
            self.table,
            KEY_COLUMNS.join(", ")
        )
    }

    fn insert_sql(&self, columns: &[ColumnSpec]) -> String {
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        let params = (1..=names.len()).map(|i| format!("${i}")).collect::<Vec<_>>();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            self.table,
            names.join(", "),
            params.join(", "),
            KEY_COLUMNS.join(", ")
        )
    }

    async fn apply_plan(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        plan: &SchemaPlan,
    ) -> Result<usize, FactStoreError> {
        if plan.create_table {
            sqlx::query(&self.create_table_sql(&plan.desired))
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("create_table", e))?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS {0}_fingerprint_idx ON {0} (listing_fingerprint)",
                self.table
            ))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("create_index", e))?;
            return Ok(0);
        }

        for col in &plan.add_columns {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} {}",
                self.table,
                col.name,
                col.kind.sql_type()
            ))
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("add_column", e))?;
            info!(table = %self.table, column = %col.name, kind = %col.kind, "column added");
        }
        Ok(plan.add_columns.len())
    }
}

#[async_trait::async_trait]
impl FactStore for PostgresFactStore {
    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn max_updated_at(&self) -> Result<Option<DateTime<Utc>>, FactStoreError> {
        let result = sqlx::query(&format!(
            "SELECT MAX(updated_at) AS max_updated_at FROM {}",
            self.table
        ))
        .fetch_one(&*self.pool)
        .await;

        match result {
            Ok(row) => row
                .try_get::<Option<DateTime<Utc>>, _>("max_updated_at")
                .map_err(|e| map_sqlx_error("max_updated_at", e)),
            Err(e) if is_undefined_table(&e) => Ok(None),
            Err(e) => Err(map_sqlx_error("max_updated_at", e)),
        }
    }

    #[instrument(
        skip(self, fingerprints),
        fields(table = %self.table, fingerprint_count = fingerprints.len(), row_count),
        err
    )]
    async fn history(
        &self,
        fingerprints: &[ListingFingerprint],
    ) -> Result<Vec<CommittedState>, FactStoreError> {
        if fingerprints.is_empty() {
            return Ok(vec![]);
        }

        let keys: Vec<String> = fingerprints.iter().map(|f| f.as_str().to_string()).collect();
        let result = sqlx::query(&format!(
            r#"
            SELECT
                listing_fingerprint,
                stock_quantity,
                price_minor,
                is_approved,
                is_published,
                deleted_at,
                updated_at,
                extracted_at
            FROM {}
            WHERE listing_fingerprint = ANY($1)
            "#,
            self.table
        ))
        .bind(keys)
        .fetch_all(&*self.pool)
        .await;

        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(vec![]),
            Err(e) => return Err(map_sqlx_error("history", e)),
        };

        let mut states = Vec::with_capacity(rows.len());
        for row in rows {
            let state = committed_state_from_row(&row).map_err(|e| map_sqlx_error("decode_history", e))?;
            states.push(state);
        }

        Span::current().record("row_count", states.len());
        Ok(states)
    }

    #[instrument(skip(self), fields(table = %self.table), err)]
    async fn columns(&self) -> Result<Vec<ColumnSpec>, FactStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position ASC
            "#,
        )
        .bind(&self.table)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("columns", e))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("column_name").map_err(|e| map_sqlx_error("columns", e))?;
            let data_type: String = row.try_get("data_type").map_err(|e| map_sqlx_error("columns", e))?;
            let nullable: String = row.try_get("is_nullable").map_err(|e| map_sqlx_error("columns", e))?;
            columns.push(ColumnSpec::new(
                name,
                ColumnKind::from_information_schema(&data_type),
                nullable.eq_ignore_ascii_case("YES"),
            ));
        }
        Ok(columns)
    }

    #[instrument(
        skip(self, plan, rows),
        fields(
            table = %self.table,
            row_count = rows.len(),
            add_columns = plan.add_columns.len(),
            inserted,
            skipped_existing
        ),
        err
    )]
    async fn merge(
        &self,
        plan: &SchemaPlan,
        rows: Vec<FactRow>,
    ) -> Result<MergeOutcome, FactStoreError> {
        validate_rows(&rows)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let columns_added = self.apply_plan(&mut tx, plan).await?;

        let insert = self.insert_sql(&fact_columns());
        let mut outcome = MergeOutcome {
            columns_added,
            ..MergeOutcome::default()
        };

        for row in &rows {
            let done = sqlx::query(&insert)
                .bind(i64::from(row.listing_id))
                .bind(row.updated_at)
                .bind(row.fingerprint.as_str())
                .bind(row.keys.product_key.as_str())
                .bind(row.keys.variant_key.as_str())
                .bind(row.keys.store_key.as_str())
                .bind(row.keys.vendor_key.as_str())
                .bind(row.keys.channel_key.as_str())
                .bind(row.keys.created_date_key.as_str())
                .bind(row.keys.stock_location_key.as_str())
                .bind(row.keys.taxon_key.as_str())
                .bind(row.keys.event_key.as_str())
                .bind(i64::from(row.product_id))
                .bind(row.variant_id.map(i64::from))
                .bind(row.store_id.map(i64::from))
                .bind(row.vendor_id.map(i64::from))
                .bind(row.channel_id.map(i64::from))
                .bind(row.stock_location_id.map(i64::from))
                .bind(row.taxon_id.map(i64::from))
                .bind(row.event.event_type.as_str())
                .bind(row.event.event_action.as_str())
                .bind(row.stock_quantity)
                .bind(row.price.amount_minor)
                .bind(row.price.currency.as_deref())
                .bind(row.is_approved)
                .bind(row.is_published)
                .bind(row.is_active)
                .bind(row.has_stock)
                .bind(row.created_at)
                .bind(row.deleted_at)
                .bind(row.extracted_at)
                .bind(row.batch_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_fact", e))?;

            if done.rows_affected() == 0 {
                outcome.skipped_existing += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let span = Span::current();
        span.record("inserted", outcome.inserted);
        span.record("skipped_existing", outcome.skipped_existing);
        Ok(outcome)
    }
}

fn committed_state_from_row(row: &sqlx::postgres::PgRow) -> Result<CommittedState, sqlx::Error> {
    let deleted_at: Option<DateTime<Utc>> = row.try_get("deleted_at")?;
    Ok(CommittedState {
        fingerprint: ListingFingerprint::from_stored(row.try_get::<String, _>("listing_fingerprint")?),
        stock_quantity: row.try_get::<Option<i64>, _>("stock_quantity")?.unwrap_or(0),
        price_minor: row.try_get::<Option<i64>, _>("price_minor")?.unwrap_or(0),
        is_approved: row.try_get::<Option<bool>, _>("is_approved")?.unwrap_or(false),
        is_published: row.try_get::<Option<bool>, _>("is_published")?.unwrap_or(false),
        is_deleted: deleted_at.is_some(),
        updated_at: row.try_get("updated_at")?,
        extracted_at: row.try_get("extracted_at")?,
    })
}

fn is_undefined_table(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "42P01";
        }
    }
    false
}

/// Map SQLx errors to FactStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> FactStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            error_for_sqlstate(db_err.code().as_deref(), msg)
        }
        sqlx::Error::PoolTimedOut => {
            FactStoreError::Timeout(format!("connection pool timed out in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => FactStoreError::SchemaIncompatible(
            format!("stored column cannot be decoded in {}: {}", operation, err),
        ),
        sqlx::Error::PoolClosed => {
            FactStoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        _ => FactStoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn error_for_sqlstate(code: Option<&str>, msg: String) -> FactStoreError {
    match code {
        Some("57014") => FactStoreError::Timeout(msg),
        Some("23505") | Some("40001") => FactStoreError::Conflict(msg),
        // A retained NOT NULL column or a merge key without a unique constraint.
        Some("42804") | Some("23502") | Some("42P10") => FactStoreError::SchemaIncompatible(msg),
        _ => FactStoreError::Unavailable(msg),
    }
}
