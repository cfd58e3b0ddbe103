use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Row};
use std::time::Duration;
use tinylink_core::error::StorageError;
use tinylink_core::repository::{
    CreateOutcome, Link, LinkStats, ReadRepository, Repository, Result,
};
use tinylink_core::shortcode::ShortCode;
use typed_builder::TypedBuilder;
use uuid::Uuid;

/// DDL for the `links` table, safe to run repeatedly.
pub const SCHEMA: &str = include_str!("../ddl/postgres/links.sql");

const PRIMARY_KEY_CONSTRAINT: &str = "links_pkey";

/// Connection pool limits for [`PostgresRepository::connect_with`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PgPoolSettings {
    #[builder(default = 10)]
    max_connections: u32,
    /// Connections older than this are closed instead of being reused.
    #[builder(default, setter(strip_option))]
    max_lifetime: Option<Duration>,
    #[builder(default = Duration::from_secs(5))]
    acquire_timeout: Duration,
}

impl Default for PgPoolSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// PostgreSQL implementation of the repository contract.
///
/// Deletion is a soft delete through the `deleted` column; deleted rows keep
/// their short code forever. A partial unique index keeps at most one live
/// row per target, and `create_link` upserts against it so a duplicate target
/// hands back the row that was there first.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a pool with default settings.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::connect_with(database_url, &PgPoolSettings::default()).await
    }

    /// Creates a repository by opening a pool with the given settings.
    pub async fn connect_with(database_url: &str, settings: &PgPoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .max_lifetime(settings.max_lifetime)
            .acquire_timeout(settings.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `links` table and its indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_primary_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && db.constraint() == Some(PRIMARY_KEY_CONSTRAINT)
    })
}

fn map_insert_error(err: sqlx::Error, code: &ShortCode) -> StorageError {
    if is_primary_key_violation(&err) {
        StorageError::Conflict(code.to_string())
    } else {
        map_sqlx_error(err)
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn link_from_row(row: &PgRow) -> Result<Link> {
    let id: String = row.try_get("id").map_err(map_sqlx_error)?;
    let target: String = row.try_get("target").map_err(map_sqlx_error)?;
    let owner: Uuid = row.try_get("owner").map_err(map_sqlx_error)?;
    let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;

    Ok(Link {
        id: ShortCode::new_unchecked(id),
        target,
        owner,
        deleted,
    })
}

fn count_from_row(row: &PgRow, column: &str) -> Result<u64> {
    let count: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(count)
        .map_err(|e| StorageError::InvalidData(format!("invalid {column} count {count}: {e}")))
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn find_link(&self, code: &ShortCode) -> Result<Option<Link>> {
        let row = sqlx::query(
            r#"
            SELECT id, target, owner, deleted
            FROM links
            WHERE id = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(link_from_row).transpose()
    }

    async fn find_user_links(&self, owner: &Uuid) -> Result<Vec<Link>> {
        let rows = sqlx::query(
            r#"
            SELECT id, target, owner, deleted
            FROM links
            WHERE owner = $1
              AND NOT deleted
            ORDER BY id
            "#,
        )
        .bind(*owner)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(link_from_row).collect()
    }

    async fn status(&self) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(map_sqlx_error)?;
        conn.ping().await.map_err(map_sqlx_error)?;
        Ok(true)
    }

    async fn stats(&self) -> Result<LinkStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS links, COUNT(DISTINCT owner) AS owners
            FROM links
            WHERE NOT deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(LinkStats {
            links: count_from_row(&row, "links")?,
            owners: count_from_row(&row, "owners")?,
        })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_link(
        &self,
        code: &ShortCode,
        target: &str,
        owner: &Uuid,
    ) -> Result<CreateOutcome> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO links (id, target, owner, deleted)
            VALUES ($1, $2, $3, FALSE)
            ON CONFLICT (target) WHERE NOT deleted
            DO UPDATE SET target = EXCLUDED.target
            RETURNING id, target, owner, deleted
            "#,
        )
        .bind(code.as_str())
        .bind(target)
        .bind(*owner)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| map_insert_error(err, code))?;

        let link = link_from_row(&row)?;
        if link.id == *code {
            Ok(CreateOutcome::Created(link))
        } else {
            Ok(CreateOutcome::AlreadyExists(link))
        }
    }

    async fn batch_create(&self, links: Vec<Link>) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        // Dropping the transaction without committing rolls it back.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for link in &links {
            sqlx::query(
                r#"
                INSERT INTO links (id, target, owner, deleted)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(link.id.as_str())
            .bind(link.target.as_str())
            .bind(link.owner)
            .bind(link.deleted)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_insert_error(err, &link.id))?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn mark_deleted(&self, codes: &[ShortCode], owner: &Uuid) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = codes.iter().map(|code| code.as_str().to_owned()).collect();

        let result = sqlx::query(
            r#"
            UPDATE links
            SET deleted = TRUE
            WHERE id = ANY($1)
              AND owner = $2
              AND NOT deleted
            "#,
        )
        .bind(ids)
        .bind(*owner)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
