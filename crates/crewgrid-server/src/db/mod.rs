pub mod models;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use crewgrid_core::{AllocationTable, Assignment, RegistryEntry, UserId, WeekKey};
use crewgrid_sync::{AllocationRow, RemoteError, RemoteStore, WriteAck};
use sqlx::{postgres::PgPoolOptions, types::Json, PgConnection, PgPool};
use std::collections::HashMap;

use crate::error::remote_error;
use models::{AllocationRecord, RegistryRecord};

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Insert rows after the cell's current last position
async fn append_rows(
    conn: &mut PgConnection,
    table: AllocationTable,
    user: UserId,
    date: NaiveDate,
    assignments: &[Assignment],
) -> Result<(), sqlx::Error> {
    let next_position_sql = format!(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE user_id = $1 AND date = $2",
        table.name()
    );
    let next_position: i32 = sqlx::query_scalar(&next_position_sql)
        .bind(user)
        .bind(date)
        .fetch_one(&mut *conn)
        .await?;

    let insert_sql = format!(
        "INSERT INTO {} (user_id, date, position, assignment) VALUES ($1, $2, $3, $4)",
        table.name()
    );
    for (offset, assignment) in assignments.iter().enumerate() {
        sqlx::query(&insert_sql)
            .bind(user)
            .bind(date)
            .bind(next_position + offset as i32)
            .bind(Json(assignment))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn delete_rows(conn: &mut PgConnection, table: AllocationTable, user: UserId, date: NaiveDate) -> Result<u64, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE user_id = $1 AND date = $2", table.name());
    let result = sqlx::query(&sql).bind(user).bind(date).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Commit time as seen by the change trigger, taken after the write
async fn commit_time(conn: &mut PgConnection) -> Result<DateTime<Utc>, sqlx::Error> {
    sqlx::query_scalar("SELECT clock_timestamp()").fetch_one(&mut *conn).await
}

impl Database {
    /// Connect to the database
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn fetch_rows(&self, sql: &str, user: Option<UserId>, from: NaiveDate, to: NaiveDate) -> Result<Vec<AllocationRow>, sqlx::Error> {
        let mut query = sqlx::query_as::<_, AllocationRecord>(sql).bind(from).bind(to);
        if let Some(user) = user {
            query = query.bind(user);
        }
        let records = query.fetch_all(&self.pool).await?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Optionally clear a cell, append rows, and report the commit time, in one transaction
    async fn rewrite_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        clear_first: bool,
        assignments: &[Assignment],
    ) -> Result<WriteAck, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        if clear_first {
            let removed = delete_rows(&mut *tx, table, user, date).await?;
            tracing::debug!("Deleted {} rows from {} for {} on {}", removed, table, user, date);
        }
        if !assignments.is_empty() {
            append_rows(&mut *tx, table, user, date, assignments).await?;
        }
        let committed_at = commit_time(&mut *tx).await?;
        tx.commit().await?;
        Ok(WriteAck { committed_at })
    }
}

const ROW_COLUMNS: &str = "id, user_id, date, position, assignment, updated_at";

#[async_trait]
impl RemoteStore for Database {
    async fn fetch_week(&self, table: AllocationTable, week: WeekKey) -> Result<Vec<AllocationRow>, RemoteError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE date BETWEEN $1 AND $2 ORDER BY user_id, date, position, id",
            ROW_COLUMNS,
            table.name()
        );
        self.fetch_rows(&sql, None, week.start(), week.end())
            .await
            .map_err(remote_error)
    }

    async fn fetch_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
    ) -> Result<Vec<AllocationRow>, RemoteError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE date BETWEEN $1 AND $2 AND user_id = $3 ORDER BY position, id",
            ROW_COLUMNS,
            table.name()
        );
        self.fetch_rows(&sql, Some(user), date, date)
            .await
            .map_err(remote_error)
    }

    async fn delete_cell(&self, table: AllocationTable, user: UserId, date: NaiveDate) -> Result<WriteAck, RemoteError> {
        self.rewrite_cell(table, user, date, true, &[])
            .await
            .map_err(remote_error)
    }

    async fn insert_rows(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
    ) -> Result<WriteAck, RemoteError> {
        self.rewrite_cell(table, user, date, false, assignments)
            .await
            .map_err(remote_error)
    }

    /// Both steps run in one transaction, so readers never see the cell half-written
    async fn replace_cell(
        &self,
        table: AllocationTable,
        user: UserId,
        date: NaiveDate,
        assignments: &[Assignment],
    ) -> Result<WriteAck, RemoteError> {
        self.rewrite_cell(table, user, date, true, assignments)
            .await
            .map_err(remote_error)
    }

    async fn active_registry(&self, table: AllocationTable) -> Result<Vec<RegistryEntry>, RemoteError> {
        let sql = format!(
            "SELECT resource_id, user_id, returned_at FROM {} WHERE returned_at IS NULL",
            table.registry()
        );
        let records = sqlx::query_as::<_, RegistryRecord>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(remote_error)?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn user_names(&self, ids: &[UserId]) -> Result<HashMap<UserId, String>, RemoteError> {
        let rows: Vec<(UserId, String)> = sqlx::query_as("SELECT id, full_name FROM profiles WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().collect())
    }

    async fn resource_names(&self, table: AllocationTable, ids: &[i64]) -> Result<HashMap<i64, String>, RemoteError> {
        let sql = format!("SELECT id, name FROM {} WHERE id = ANY($1)", table.resources());
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(remote_error)?;
        Ok(rows.into_iter().collect())
    }
}
