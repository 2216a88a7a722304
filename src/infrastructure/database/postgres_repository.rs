use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::{DataItem, DataStats, ItemQuery, NewDataItem, Repository};

const COLUMNS: &str = "id, name, value, category, metadata, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct DataItemRow {
    id: Uuid,
    name: String,
    value: f64,
    category: String,
    metadata: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DataItemRow> for DataItem {
    fn from(r: DataItemRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            value: r.value,
            category: r.category,
            metadata: r.metadata,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total_items: i64,
    average_value: f64,
    min_value: f64,
    max_value: f64,
}

/// Build a Postgres repository over a lazily connected pool.
///
/// No connection is attempted here; the first query (normally
/// [`Repository::migrate`]) opens one.
pub fn create_postgres_repository(config: &DatabaseConfig) -> Result<PostgresRepository> {
    // ---
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy(&config.database_url)
        .context("invalid DATABASE_URL")?;

    Ok(PostgresRepository::new(pool, &config.table, config.retry_count))
}

pub struct PostgresRepository {
    // ---
    pool: PgPool,
    /// Validated identifier, safe to interpolate into SQL.
    table: String,
    retry_count: u32,
}

impl PostgresRepository {
    // ---
    pub fn new(pool: PgPool, table: &str, retry_count: u32) -> Self {
        // ---
        Self {
            pool,
            table: table.to_string(),
            retry_count,
        }
    }

    /// Remove every row from the table.
    pub async fn truncate(&self) -> Result<()> {
        // ---
        sqlx::query(&format!("TRUNCATE TABLE {}", self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_schema(&self) -> Result<()> {
        // ---
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                 id UUID PRIMARY KEY,
                 name TEXT NOT NULL,
                 value DOUBLE PRECISION NOT NULL,
                 category TEXT NOT NULL,
                 metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                 created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                 updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             )",
            table = self.table
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {table}_category_created_idx
             ON {table} (category, created_at DESC)",
            table = self.table
        );
        sqlx::query(&index).execute(&self.pool).await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for PostgresRepository {
    // ---
    async fn migrate(&self) -> Result<()> {
        // ---
        let attempts = self.retry_count.max(1);
        let mut attempt = 1;

        loop {
            match self.create_schema().await {
                Ok(()) => {
                    info!("Database schema ready (table {})", self.table);
                    return Ok(());
                }
                Err(err) if attempt < attempts => {
                    warn!("Database init attempt {attempt}/{attempts} failed: {err:#}");
                    attempt += 1;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => {
                    return Err(err.context(format!("database init failed after {attempts} attempts")));
                }
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        // ---
        let table_present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&self.table)
            .fetch_one(&self.pool)
            .await?;
        Ok(table_present)
    }

    async fn create_item(&self, input: NewDataItem) -> Result<DataItem> {
        // ---
        let item = DataItem::new(input);

        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            self.table
        );
        sqlx::query(&sql)
            .bind(item.id)
            .bind(&item.name)
            .bind(item.value)
            .bind(&item.category)
            .bind(&item.metadata)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&self.pool)
            .await?;

        info!("Created item with ID: {}", item.id);
        Ok(item)
    }

    async fn list_items(&self, query: &ItemQuery) -> Result<(Vec<DataItem>, i64)> {
        // ---
        let filter = "WHERE ($1::text IS NULL OR category = $1)";

        let count_sql = format!("SELECT COUNT(*) FROM {} {filter}", self.table);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(query.category.as_deref())
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT {COLUMNS} FROM {} {filter} ORDER BY created_at DESC, id LIMIT $2 OFFSET $3",
            self.table
        );
        let rows = sqlx::query_as::<_, DataItemRow>(&list_sql)
            .bind(query.category.as_deref())
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(DataItem::from).collect(), total))
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<DataItem>> {
        // ---
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE id = $1", self.table);
        let row = sqlx::query_as::<_, DataItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DataItem::from))
    }

    async fn update_item(&self, id: Uuid, input: NewDataItem) -> Result<Option<DataItem>> {
        // ---
        let metadata = input
            .metadata
            .unwrap_or_else(|| Value::Object(Default::default()));

        let sql = format!(
            "UPDATE {} SET name = $2, value = $3, category = $4, metadata = $5, updated_at = NOW()
             WHERE id = $1 RETURNING {COLUMNS}",
            self.table
        );
        let row = sqlx::query_as::<_, DataItemRow>(&sql)
            .bind(id)
            .bind(&input.name)
            .bind(input.value)
            .bind(&input.category)
            .bind(&metadata)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DataItem::from))
    }

    async fn delete_item(&self, id: Uuid) -> Result<Option<DataItem>> {
        // ---
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING {COLUMNS}", self.table);
        let row = sqlx::query_as::<_, DataItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(DataItem::from))
    }

    async fn statistics(&self) -> Result<DataStats> {
        // ---
        let totals_sql = format!(
            "SELECT COUNT(*) AS total_items,
                    COALESCE(AVG(value), 0)::float8 AS average_value,
                    COALESCE(MIN(value), 0)::float8 AS min_value,
                    COALESCE(MAX(value), 0)::float8 AS max_value
             FROM {}",
            self.table
        );
        let totals = sqlx::query_as::<_, TotalsRow>(&totals_sql)
            .fetch_one(&self.pool)
            .await?;

        let categories_sql = format!(
            "SELECT category, COUNT(*) FROM {} GROUP BY category",
            self.table
        );
        let categories: Vec<(String, i64)> = sqlx::query_as(&categories_sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(DataStats {
            total_items: totals.total_items,
            categories: categories.into_iter().collect(),
            average_value: totals.average_value,
            min_value: totals.min_value,
            max_value: totals.max_value,
        })
    }
}
