//! Postgres-backed dimension lookups.
//!
//! Each keyed dimension is a `(natural_key TEXT PRIMARY KEY, surrogate_key TEXT)`
//! table; the event taxonomy lives in `dim_event (event_type, event_action,
//! surrogate_key)`.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::{instrument, warn};

use listing_facts_core::SurrogateKey;
use listing_facts_listings::{EventAction, EventPair, EventType};

use super::taxonomy::EventTaxonomy;
use super::r#trait::{Dimension, DimensionError, DimensionSource};

#[derive(Debug, Clone)]
pub struct PostgresDimensions {
    pool: Arc<PgPool>,
}

impl PostgresDimensions {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait::async_trait]
impl DimensionSource for PostgresDimensions {
    #[instrument(skip(self, dimension, natural_keys), fields(dimension = %dimension, key_count = natural_keys.len()), err)]
    async fn lookup_many(
        &self,
        dimension: Dimension,
        natural_keys: &[String],
    ) -> Result<HashMap<String, SurrogateKey>, DimensionError> {
        if natural_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(&format!(
            "SELECT natural_key, surrogate_key FROM {} WHERE natural_key = ANY($1)",
            dimension.table()
        ))
        .bind(natural_keys)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error(dimension.table(), e))?;

        let mut keys = HashMap::with_capacity(rows.len());
        for row in rows {
            let natural: String = row
                .try_get("natural_key")
                .map_err(|e| map_sqlx_error(dimension.table(), e))?;
            let surrogate: String = row
                .try_get("surrogate_key")
                .map_err(|e| map_sqlx_error(dimension.table(), e))?;
            keys.insert(natural, SurrogateKey::new(surrogate));
        }
        Ok(keys)
    }

    #[instrument(skip(self), err)]
    async fn event_taxonomy(&self) -> Result<EventTaxonomy, DimensionError> {
        let rows = sqlx::query("SELECT event_type, event_action, surrogate_key FROM dim_event")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("dim_event", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let event_type: String = row.try_get("event_type").map_err(|e| map_sqlx_error("dim_event", e))?;
            let event_action: String = row
                .try_get("event_action")
                .map_err(|e| map_sqlx_error("dim_event", e))?;
            let surrogate: String = row
                .try_get("surrogate_key")
                .map_err(|e| map_sqlx_error("dim_event", e))?;

            match (event_type.parse::<EventType>(), event_action.parse::<EventAction>()) {
                (Ok(t), Ok(a)) => entries.push((EventPair::new(t, a), SurrogateKey::new(surrogate))),
                _ => warn!(%event_type, %event_action, "undeclared event pair in dim_event ignored"),
            }
        }
        Ok(EventTaxonomy::from_entries(entries))
    }
}

fn map_sqlx_error(table: &str, err: sqlx::Error) -> DimensionError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error reading {}: {}", table, db_err.message());
            match db_err.code().as_deref() {
                // undefined_table, undefined_column
                Some("42P01") | Some("42703") => DimensionError::Misconfigured(msg),
                _ => DimensionError::Unavailable(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            DimensionError::Misconfigured(format!("unexpected column shape in {}: {}", table, err))
        }
        _ => DimensionError::Unavailable(format!("sqlx error reading {}: {}", table, err)),
    }
}
