//! Postgres event backend.
//!
//! Each stream gets its own table, `es_<stream>`, with a unique index on
//! `(aggregate_id, version)`. A duplicate-key error on that index is the
//! version conflict signal.

use aggstore_events::EventRecord;
use aggstore_id::{AggregateVersion, EventDocId, StreamName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Connection, Postgres, Row, Transaction};
use tracing::{debug, info};

use super::{EventBackend, Session};
use crate::StoreError;

const UNIQUE_VIOLATION: &str = "23505";

/// Event backend over a Postgres connection pool.
#[derive(Clone)]
pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A Postgres transaction used as a store session.
pub struct PgSession {
    tx: Transaction<'static, Postgres>,
}

impl PgSession {
    /// The open transaction, for callers that want to write their own rows
    /// atomically with the events.
    pub fn transaction(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }
}

#[async_trait]
impl Session for PgSession {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::Query)
    }

    async fn abort(self) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(StoreError::Query)
    }
}

fn table_name(stream: &StreamName) -> String {
    format!("es_{stream}")
}

fn version_index_name(stream: &StreamName) -> String {
    format!("es_{stream}_agg_version")
}

/// A row from an `es_<stream>` table.
#[derive(Debug, Clone)]
struct EventDoc {
    id: String,
    aggregate_id: String,
    version: i32,
    event_type: String,
    payload: serde_json::Value,
    occurred_at: DateTime<Utc>,
    tenant_id: String,
    principal_id: String,
    correlation_id: String,
}

impl<'r> sqlx::FromRow<'r, PgRow> for EventDoc {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            version: row.try_get("version")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            occurred_at: row.try_get("occurred_at")?,
            tenant_id: row.try_get("tenant_id")?,
            principal_id: row.try_get("principal_id")?,
            correlation_id: row.try_get("correlation_id")?,
        })
    }
}

impl EventDoc {
    fn into_record(self, stream: &StreamName) -> Result<EventRecord, StoreError> {
        let corrupt = |message: String| StoreError::CorruptRow {
            stream: stream.to_string(),
            message,
        };

        let id =
            EventDocId::parse(&self.id).map_err(|e| corrupt(format!("id {}: {e}", self.id)))?;
        let version = AggregateVersion::new(self.version)
            .map_err(|e| corrupt(format!("event {}: {e}", self.id)))?;

        Ok(EventRecord {
            id,
            aggregate_id: self.aggregate_id,
            version,
            event_type: self.event_type,
            payload: self.payload,
            timestamp: self.occurred_at,
            tenant_id: self.tenant_id,
            principal_id: self.principal_id,
            correlation_id: self.correlation_id,
        })
    }
}

fn map_insert_error(e: sqlx::Error, stream: &StreamName, record: &EventRecord) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
            && db_err.constraint() == Some(version_index_name(stream).as_str())
        {
            return StoreError::VersionConflict {
                stream: stream.to_string(),
                aggregate_id: record.aggregate_id.clone(),
                version: record.version.value(),
            };
        }
    }
    StoreError::Query(e)
}

#[async_trait]
impl EventBackend for PgBackend {
    type Session = PgSession;

    async fn begin(&self) -> Result<PgSession, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::Query)?;
        Ok(PgSession { tx })
    }

    async fn ensure_stream(&self, stream: &StreamName) -> Result<(), StoreError> {
        let table = table_name(stream);
        let index = version_index_name(stream);

        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                aggregate_id TEXT NOT NULL,
                version INTEGER NOT NULL CHECK (version > 0),
                event_type TEXT NOT NULL,
                payload JSONB NOT NULL,
                occurred_at TIMESTAMPTZ NOT NULL,
                tenant_id TEXT NOT NULL,
                principal_id TEXT NOT NULL,
                correlation_id TEXT NOT NULL
            )
            "#
        );
        let create_index = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (aggregate_id, version)"
        );

        // Concurrent `IF NOT EXISTS` DDL can still collide in the catalog,
        // so setup is serialized per table across processes.
        let mut tx = self.pool.begin().await.map_err(StoreError::Query)?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&table)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;
        sqlx::query(&create_table)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;
        sqlx::query(&create_index)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;
        tx.commit().await.map_err(StoreError::Query)?;

        info!(stream = %stream, table = %table, "ensured event stream table");
        Ok(())
    }

    async fn load(
        &self,
        stream: &StreamName,
        aggregate_id: &str,
        session: Option<&mut PgSession>,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT
                id,
                aggregate_id,
                version,
                event_type,
                payload,
                occurred_at,
                tenant_id,
                principal_id,
                correlation_id
            FROM {}
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
            table_name(stream)
        );
        let query = sqlx::query_as::<_, EventDoc>(&sql).bind(aggregate_id);

        let rows = match session {
            Some(session) => query.fetch_all(&mut *session.tx).await,
            None => query.fetch_all(&self.pool).await,
        }
        .map_err(StoreError::Query)?;

        rows.into_iter()
            .map(|row| row.into_record(stream))
            .collect()
    }

    async fn insert(
        &self,
        stream: &StreamName,
        record: &EventRecord,
        session: Option<&mut PgSession>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                id,
                aggregate_id,
                version,
                event_type,
                payload,
                occurred_at,
                tenant_id,
                principal_id,
                correlation_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            table_name(stream)
        );
        let query = sqlx::query(&sql)
            .bind(record.id.to_string())
            .bind(&record.aggregate_id)
            .bind(record.version.value())
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.timestamp)
            .bind(&record.tenant_id)
            .bind(&record.principal_id)
            .bind(&record.correlation_id);

        match session {
            Some(session) => {
                // A failed statement poisons the whole transaction; the
                // savepoint keeps the session usable for the next attempt.
                let mut savepoint = Connection::begin(&mut *session.tx)
                    .await
                    .map_err(StoreError::Query)?;
                match query.execute(&mut *savepoint).await {
                    Ok(_) => savepoint.commit().await.map_err(StoreError::Query)?,
                    Err(e) => {
                        savepoint.rollback().await.map_err(StoreError::Query)?;
                        return Err(map_insert_error(e, stream, record));
                    }
                }
            }
            None => {
                query
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_insert_error(e, stream, record))?;
            }
        }

        debug!(
            stream = %stream,
            aggregate_id = %record.aggregate_id,
            version = record.version.value(),
            event_type = %record.event_type,
            "appended event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_and_index_names() {
        let stream = StreamName::parse("bank_account").unwrap();
        assert_eq!(table_name(&stream), "es_bank_account");
        assert_eq!(
            version_index_name(&stream),
            "es_bank_account_agg_version"
        );
    }

    #[test]
    fn test_index_name_fits_postgres_identifier_limit() {
        let stream = StreamName::parse(&"s".repeat(StreamName::MAX_LEN)).unwrap();
        assert!(version_index_name(&stream).len() <= 63);
    }
}
