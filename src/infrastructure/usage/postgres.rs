//! PostgreSQL usage repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::api_key::{ApiKeyId, OwnerId};
use crate::domain::usage::{UsageQuery, UsageRecord, UsageRecordId, UsageRepository};
use crate::domain::DomainError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_records (
    id TEXT PRIMARY KEY,
    api_key_id TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    method TEXT NOT NULL,
    status_code INT NOT NULL,
    latency_ms BIGINT NOT NULL,
    user_agent TEXT,
    client_ip TEXT,
    error TEXT,
    timestamp TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS usage_records_api_key ON usage_records (api_key_id, timestamp);
CREATE INDEX IF NOT EXISTS usage_records_timestamp ON usage_records (timestamp);
"#;

/// PostgreSQL implementation of [`UsageRepository`]
#[derive(Debug, Clone)]
pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    fn build_filter(query: &UsageQuery) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut binds = Vec::new();

        if let Some(ref id) = query.api_key_id {
            binds.push(id.as_str().to_string());
            clauses.push(format!("api_key_id = ${}", binds.len()));
        }

        if let Some(ref owner) = query.owner_id {
            binds.push(owner.as_str().to_string());
            clauses.push(format!("owner_id = ${}", binds.len()));
        }

        if let Some(since) = query.since {
            binds.push(since.to_rfc3339());
            clauses.push(format!("timestamp >= ${}::timestamptz", binds.len()));
        }

        if let Some(until) = query.until {
            binds.push(until.to_rfc3339());
            clauses.push(format!("timestamp < ${}::timestamptz", binds.len()));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        (where_sql, binds)
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn record(&self, record: UsageRecord) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO usage_records (id, api_key_id, owner_id, endpoint, method, \
                 status_code, latency_ms, user_agent, client_ip, error, timestamp) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id().as_str())
        .bind(record.api_key_id.as_str())
        .bind(record.owner_id.as_str())
        .bind(&record.endpoint)
        .bind(&record.method)
        .bind(i32::from(record.status_code))
        .bind(record.latency_ms as i64)
        .bind(&record.user_agent)
        .bind(&record.client_ip)
        .bind(&record.error)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>, DomainError> {
        let (where_sql, binds) = Self::build_filter(query);

        let mut sql = format!(
            "SELECT id, api_key_id, owner_id, endpoint, method, status_code, \
                 latency_ms, user_agent, client_ip, error, timestamp \
             FROM usage_records{} ORDER BY timestamp DESC",
            where_sql
        );

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(storage_err)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self, query: &UsageQuery) -> Result<usize, DomainError> {
        let (where_sql, binds) = Self::build_filter(query);
        let sql = format!("SELECT COUNT(*) AS n FROM usage_records{}", where_sql);

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }

        let row = q.fetch_one(&self.pool).await.map_err(storage_err)?;
        let n: i64 = row.try_get("n").map_err(storage_err)?;

        Ok(n.max(0) as usize)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DomainError> {
        let result = sqlx::query("DELETE FROM usage_records WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(result.rows_affected() as usize)
    }
}

fn row_to_record(row: &PgRow) -> Result<UsageRecord, DomainError> {
    let status_code: i32 = row.try_get("status_code").map_err(storage_err)?;
    let latency_ms: i64 = row.try_get("latency_ms").map_err(storage_err)?;

    let mut record = UsageRecord::new(
        ApiKeyId::new(row.try_get::<String, _>("api_key_id").map_err(storage_err)?),
        OwnerId::new(row.try_get::<String, _>("owner_id").map_err(storage_err)?),
        row.try_get::<String, _>("endpoint").map_err(storage_err)?,
        row.try_get::<String, _>("method").map_err(storage_err)?,
        status_code.clamp(0, u16::MAX as i32) as u16,
    )
    .with_id(UsageRecordId::new(
        row.try_get::<String, _>("id").map_err(storage_err)?,
    ))
    .with_latency_ms(latency_ms.max(0) as u64)
    .with_timestamp(row.try_get("timestamp").map_err(storage_err)?);

    if let Some(user_agent) = row
        .try_get::<Option<String>, _>("user_agent")
        .map_err(storage_err)?
    {
        record = record.with_user_agent(user_agent);
    }

    if let Some(client_ip) = row
        .try_get::<Option<String>, _>("client_ip")
        .map_err(storage_err)?
    {
        record = record.with_client_ip(client_ip);
    }

    if let Some(error) = row
        .try_get::<Option<String>, _>("error")
        .map_err(storage_err)?
    {
        record = record.with_error(error);
    }

    Ok(record)
}

fn storage_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::storage(e.to_string())
}
