use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    CorrelationId, InstanceRecord, InstanceStoreError, Result, Version, store::InstanceStore,
};

/// PostgreSQL-backed instance store implementation.
#[derive(Clone)]
pub struct PostgresInstanceStore {
    pool: PgPool,
}

impl PostgresInstanceStore {
    /// Creates a new PostgreSQL instance store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<InstanceRecord> {
        Ok(InstanceRecord {
            id: CorrelationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            saga_type: row.try_get("saga_type")?,
            version: Version::new(row.try_get("version")?),
            state: row.try_get("state")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn stored_version(&self, id: CorrelationId) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM saga_instances WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(version.map(Version::new).unwrap_or_default())
    }
}

#[async_trait]
impl InstanceStore for PostgresInstanceStore {
    async fn load(&self, id: CorrelationId) -> Result<Option<InstanceRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, saga_type, version, state, updated_at
            FROM saga_instances
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn compare_and_swap(
        &self,
        expected: Version,
        record: InstanceRecord,
    ) -> Result<Version> {
        let id = record.id;
        let new_version = expected.next();

        let rows_affected = if expected.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO saga_instances (id, saga_type, version, state, updated_at)
                VALUES ($1, $2, $3, $4, NOW())
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(id.as_uuid())
            .bind(&record.saga_type)
            .bind(new_version.as_i64())
            .bind(&record.state)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE saga_instances
                SET version = $3, state = $4, updated_at = NOW()
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(id.as_uuid())
            .bind(expected.as_i64())
            .bind(new_version.as_i64())
            .bind(&record.state)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            metrics::counter!("instance_store_conflicts_total").increment(1);
            let actual = self.stored_version(id).await?;
            tracing::debug!(%id, %expected, %actual, "compare-and-swap rejected");
            return Err(InstanceStoreError::VersionConflict {
                id,
                expected,
                actual,
            });
        }

        Ok(new_version)
    }

    async fn remove(&self, id: CorrelationId, expected: Version) -> Result<()> {
        let rows_affected = sqlx::query("DELETE FROM saga_instances WHERE id = $1 AND version = $2")
            .bind(id.as_uuid())
            .bind(expected.as_i64())
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            let actual = self.stored_version(id).await?;
            if actual.is_initial() {
                return Err(InstanceStoreError::InstanceNotFound(id));
            }
            return Err(InstanceStoreError::VersionConflict {
                id,
                expected,
                actual,
            });
        }

        Ok(())
    }
}
