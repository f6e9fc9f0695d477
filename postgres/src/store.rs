//! [`RecordStore`] over a single JSONB `documents` table.

use crate::sql;
use rsvp_core::document::{Collection, Document, ID_FIELD, ensure_id};
use rsvp_core::query::{Filter, QuerySpec};
use rsvp_core::store::{BatchOutcome, RecordStore, StoreError, StoreFuture, Update, WriteOp};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use uuid::Uuid;

const MIGRATION: &str = include_str!("../migrations/001_documents.sql");

/// `PostgreSQL`-backed primary store.
///
/// Every collection lives in one table keyed by `(collection, id)` with the
/// document body in a JSONB column. Guarded updates are single `UPDATE`
/// statements whose `WHERE` clause carries the guard, so concurrent writers
/// serialize on the row lock and each re-evaluates the guard against the
/// latest committed version.
///
/// # Example
///
/// ```no_run
/// use rsvp_postgres::PostgresStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), rsvp_core::store::StoreError> {
/// let store = PostgresStore::connect("postgres://localhost/rsvp", 10, Duration::from_secs(5)).await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool to `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if no connection can be established
    /// within `acquire_timeout`.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `documents` table and its indexes if missing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the schema cannot be applied.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        tracing::debug!("Document schema is up to date");
        Ok(())
    }
}

// ============================================================================
// Row helpers
// ============================================================================

fn database_error(e: &sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

fn sqlstate(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    sqlstate(e).as_deref() == Some("23505")
}

/// Casting a non-integer field, or overflowing one, while incrementing.
fn update_error(e: &sqlx::Error) -> StoreError {
    match sqlstate(e).as_deref() {
        Some("22P02" | "22003") => StoreError::InvalidUpdate(e.to_string()),
        _ => database_error(e),
    }
}

fn into_document(value: Value) -> Result<Document, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn check_update(update: &Update) -> Result<(), StoreError> {
    if update.set.contains_key(ID_FIELD) || update.inc.iter().any(|(f, _)| f == ID_FIELD) {
        return Err(StoreError::InvalidUpdate(format!(
            "{ID_FIELD} cannot be modified"
        )));
    }
    Ok(())
}

// ============================================================================
// Statements shared by single writes and batches
// ============================================================================

async fn insert_row(
    conn: &mut PgConnection,
    collection: Collection,
    mut document: Document,
) -> Result<Document, sqlx::Error> {
    let id = ensure_id(&mut document);
    sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
        .bind(collection.name())
        .bind(id)
        .bind(Value::Object(document.clone()))
        .execute(conn)
        .await?;
    Ok(document)
}

async fn update_row(
    conn: &mut PgConnection,
    collection: Collection,
    id: Uuid,
    update: &Update,
    guard: &Filter,
) -> Result<bool, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE documents SET data = ");
    sql::push_update_expression(&mut builder, update);
    builder
        .push(" WHERE collection = ")
        .push_bind(collection.name())
        .push(" AND id = ")
        .push_bind(id)
        .push(" AND (");
    sql::push_filter(&mut builder, guard);
    builder.push(")");

    let result = builder.build().execute(conn).await?;
    Ok(result.rows_affected() == 1)
}

async fn exists(
    conn: &mut PgConnection,
    collection: Collection,
    filter: &Filter,
) -> Result<bool, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT EXISTS (SELECT 1 FROM documents WHERE collection = ",
    );
    builder.push_bind(collection.name()).push(" AND (");
    sql::push_filter(&mut builder, filter);
    builder.push("))");

    let (found,): (bool,) = builder.build_query_as().fetch_one(conn).await?;
    Ok(found)
}

/// Outcome of one batch step inside the transaction.
enum Step {
    Applied(Option<Document>),
    Rejected,
}

async fn apply_step(conn: &mut PgConnection, op: WriteOp) -> Result<Step, StoreError> {
    match op {
        WriteOp::Insert {
            collection,
            document,
            unique,
        } => {
            if let Some(unique) = unique {
                // Serialize writers competing for the same key; the partial
                // unique indexes only cover the built-in keys.
                let key = format!("{collection}:{unique}");
                sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                    .bind(key)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| database_error(&e))?;
                if exists(conn, collection, &unique)
                    .await
                    .map_err(|e| database_error(&e))?
                {
                    return Ok(Step::Rejected);
                }
            }
            match insert_row(conn, collection, document).await {
                Ok(inserted) => Ok(Step::Applied(Some(inserted))),
                Err(e) if is_unique_violation(&e) => Ok(Step::Rejected),
                Err(e) => Err(database_error(&e)),
            }
        }
        WriteOp::Update {
            collection,
            id,
            update,
            guard,
        } => {
            check_update(&update)?;
            match update_row(conn, collection, id, &update, &guard).await {
                Ok(true) => Ok(Step::Applied(None)),
                Ok(false) => Ok(Step::Rejected),
                Err(e) if is_unique_violation(&e) => Ok(Step::Rejected),
                Err(e) => Err(update_error(&e)),
            }
        }
    }
}

// ============================================================================
// RecordStore
// ============================================================================

impl RecordStore for PostgresStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(())
        })
    }

    fn insert(&self, collection: Collection, document: Document) -> StoreFuture<'_, Document> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(|e| database_error(&e))?;
            let inserted = insert_row(&mut conn, collection, document)
                .await
                .map_err(|e| database_error(&e))?;
            tracing::debug!(%collection, "Document inserted");
            Ok(inserted)
        })
    }

    fn find<'a>(
        &'a self,
        collection: Collection,
        spec: &'a QuerySpec,
    ) -> StoreFuture<'a, Vec<Document>> {
        Box::pin(async move {
            let mut builder =
                QueryBuilder::<Postgres>::new("SELECT data FROM documents WHERE collection = ");
            builder.push_bind(collection.name()).push(" AND (");
            sql::push_filter(&mut builder, &spec.filter);
            builder.push(")");
            sql::push_sort(&mut builder, spec.sort.as_ref());
            sql::push_paging(&mut builder, spec);

            let rows: Vec<(Value,)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;

            tracing::trace!(%collection, filter = %spec.filter, rows = rows.len(), "Query executed");
            rows.into_iter().map(|(data,)| into_document(data)).collect()
        })
    }

    fn count<'a>(&'a self, collection: Collection, filter: &'a Filter) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut builder =
                QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents WHERE collection = ");
            builder.push_bind(collection.name()).push(" AND (");
            sql::push_filter(&mut builder, filter);
            builder.push(")");

            let (count,): (i64,) = builder
                .build_query_as()
                .fetch_one(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn update<'a>(
        &'a self,
        collection: Collection,
        id: Uuid,
        update: &'a Update,
        guard: &'a Filter,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            check_update(update)?;
            let mut conn = self.pool.acquire().await.map_err(|e| database_error(&e))?;
            update_row(&mut conn, collection, id, update, guard)
                .await
                .map_err(|e| update_error(&e))
        })
    }

    fn delete(&self, collection: Collection, id: Uuid) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.name())
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;
            Ok(result.rows_affected() == 1)
        })
    }

    fn commit(&self, ops: Vec<WriteOp>) -> StoreFuture<'_, BatchOutcome> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(|e| database_error(&e))?;
            let mut inserted = Vec::new();

            for (step, op) in ops.into_iter().enumerate() {
                let collection = op.collection();
                match apply_step(&mut *tx, op).await? {
                    Step::Applied(Some(document)) => inserted.push(document),
                    Step::Applied(None) => {}
                    Step::Rejected => {
                        tx.rollback().await.map_err(|e| database_error(&e))?;
                        tracing::debug!(step, %collection, "Batch rejected");
                        metrics::counter!(
                            "registry_store_batches_rejected_total",
                            "backend" => "postgres"
                        )
                        .increment(1);
                        return Ok(BatchOutcome::Rejected { step });
                    }
                }
            }

            tx.commit().await.map_err(|e| database_error(&e))?;
            Ok(BatchOutcome::Committed { inserted })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_updates_are_refused_before_reaching_the_database() {
        let update = Update::new().set(ID_FIELD, "other");
        assert!(matches!(
            check_update(&update),
            Err(StoreError::InvalidUpdate(_))
        ));
        assert!(check_update(&Update::new().inc("availableSeats", -1)).is_ok());
    }

    #[test]
    fn non_objects_are_not_documents() {
        assert!(into_document(serde_json::json!([1, 2])).is_err());
        assert!(into_document(serde_json::json!({"a": 1})).is_ok());
    }
}
