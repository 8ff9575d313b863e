//! PostgreSQL API key repository
//!
//! Counters are committed with a single conditional `UPDATE … RETURNING`, so
//! the window reset and increment happen as one statement inside the
//! database rather than a read-then-write pair.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::api_key::{
    ApiKey, ApiKeyId, ApiKeyParts, ApiKeyRepository, OwnerId, UsageCounters,
};
use crate::domain::tier::Tier;
use crate::domain::DomainError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    key_prefix TEXT NOT NULL UNIQUE,
    secret_hash TEXT NOT NULL UNIQUE,
    tier TEXT NOT NULL,
    requests_per_day BIGINT,
    requests_per_minute BIGINT NOT NULL,
    requests_used_today BIGINT NOT NULL DEFAULT 0,
    requests_used_this_minute BIGINT NOT NULL DEFAULT 0,
    day_window_start TIMESTAMPTZ NOT NULL,
    minute_window_start TIMESTAMPTZ NOT NULL,
    ip_allowlist TEXT,
    endpoint_allowlist TEXT,
    active BOOLEAN NOT NULL DEFAULT TRUE,
    last_used_at TIMESTAMPTZ,
    expires_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS api_keys_owner_active_name
    ON api_keys (owner_id, name) WHERE active;

CREATE INDEX IF NOT EXISTS api_keys_owner ON api_keys (owner_id);
"#;

const SELECT_COLUMNS: &str = "id, owner_id, name, key_prefix, secret_hash, tier, \
     requests_per_day, requests_per_minute, requests_used_today, \
     requests_used_this_minute, day_window_start, minute_window_start, \
     ip_allowlist, endpoint_allowlist, active, last_used_at, expires_at, \
     created_at, updated_at";

/// PostgreSQL implementation of [`ApiKeyRepository`]
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the api_keys table and indexes if missing
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn fetch_one_where(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<ApiKey>, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE {} = $1",
            SELECT_COLUMNS, column
        );

        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        row.map(|r| row_to_key(&r)).transpose()
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn get(&self, id: &ApiKeyId) -> Result<Option<ApiKey>, DomainError> {
        self.fetch_one_where("id", id.as_str()).await
    }

    async fn get_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, DomainError> {
        self.fetch_one_where("key_prefix", prefix).await
    }

    async fn create(&self, api_key: ApiKey) -> Result<ApiKey, DomainError> {
        let parts = api_key.to_parts();

        let result = sqlx::query(
            "INSERT INTO api_keys (id, owner_id, name, key_prefix, secret_hash, tier, \
                 requests_per_day, requests_per_minute, requests_used_today, \
                 requests_used_this_minute, day_window_start, minute_window_start, \
                 ip_allowlist, endpoint_allowlist, active, last_used_at, expires_at, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, \
                 $16, $17, $18, $19)",
        )
        .bind(parts.id.as_str())
        .bind(parts.owner_id.as_str())
        .bind(&parts.name)
        .bind(&parts.key_prefix)
        .bind(&parts.secret_hash)
        .bind(parts.tier.as_str())
        .bind(parts.requests_per_day.map(i64::from))
        .bind(i64::from(parts.requests_per_minute))
        .bind(i64::from(parts.requests_used_today))
        .bind(i64::from(parts.requests_used_this_minute))
        .bind(parts.day_window_start)
        .bind(parts.minute_window_start)
        .bind(encode_json(&parts.ip_allowlist)?)
        .bind(encode_json(&parts.endpoint_allowlist)?)
        .bind(parts.active)
        .bind(parts.last_used_at)
        .bind(parts.expires_at)
        .bind(parts.created_at)
        .bind(parts.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(api_key),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                DomainError::conflict("API key prefix or name already in use"),
            ),
            Err(e) => Err(storage_err(e)),
        }
    }

    async fn update(&self, api_key: &ApiKey) -> Result<ApiKey, DomainError> {
        let parts = api_key.to_parts();

        let result = sqlx::query(
            "UPDATE api_keys SET owner_id = $2, name = $3, key_prefix = $4, \
                 secret_hash = $5, tier = $6, requests_per_day = $7, \
                 requests_per_minute = $8, requests_used_today = $9, \
                 requests_used_this_minute = $10, day_window_start = $11, \
                 minute_window_start = $12, ip_allowlist = $13, \
                 endpoint_allowlist = $14, active = $15, last_used_at = $16, \
                 expires_at = $17, updated_at = $18 \
             WHERE id = $1",
        )
        .bind(parts.id.as_str())
        .bind(parts.owner_id.as_str())
        .bind(&parts.name)
        .bind(&parts.key_prefix)
        .bind(&parts.secret_hash)
        .bind(parts.tier.as_str())
        .bind(parts.requests_per_day.map(i64::from))
        .bind(i64::from(parts.requests_per_minute))
        .bind(i64::from(parts.requests_used_today))
        .bind(i64::from(parts.requests_used_this_minute))
        .bind(parts.day_window_start)
        .bind(parts.minute_window_start)
        .bind(encode_json(&parts.ip_allowlist)?)
        .bind(encode_json(&parts.endpoint_allowlist)?)
        .bind(parts.active)
        .bind(parts.last_used_at)
        .bind(parts.expires_at)
        .bind(parts.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            )));
        }

        Ok(api_key.clone())
    }

    async fn deactivate(&self, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        let sql = format!(
            "UPDATE api_keys SET active = FALSE, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            SELECT_COLUMNS
        );

        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        row_to_key(&row)
    }

    async fn list_by_owner(&self, owner_id: &OwnerId) -> Result<Vec<ApiKey>, DomainError> {
        let sql = format!(
            "SELECT {} FROM api_keys WHERE owner_id = $1 ORDER BY created_at DESC",
            SELECT_COLUMNS
        );

        let rows = sqlx::query(&sql)
            .bind(owner_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        rows.iter().map(row_to_key).collect()
    }

    async fn commit_usage(
        &self,
        id: &ApiKeyId,
        now: DateTime<Utc>,
    ) -> Result<UsageCounters, DomainError> {
        // One statement: the same window-boundary checks as the admit path,
        // applied together with the increment.
        let row = sqlx::query(
            "UPDATE api_keys SET \
                 requests_used_this_minute = CASE \
                     WHEN $2 - minute_window_start >= interval '60 seconds' THEN 1 \
                     ELSE requests_used_this_minute + 1 END, \
                 minute_window_start = CASE \
                     WHEN $2 - minute_window_start >= interval '60 seconds' THEN $2 \
                     ELSE minute_window_start END, \
                 requests_used_today = CASE \
                     WHEN ($2 AT TIME ZONE 'UTC')::date <> (day_window_start AT TIME ZONE 'UTC')::date THEN 1 \
                     ELSE requests_used_today + 1 END, \
                 day_window_start = CASE \
                     WHEN ($2 AT TIME ZONE 'UTC')::date <> (day_window_start AT TIME ZONE 'UTC')::date THEN $2 \
                     ELSE day_window_start END, \
                 last_used_at = $2, \
                 updated_at = $2 \
             WHERE id = $1 \
             RETURNING requests_used_today, requests_used_this_minute",
        )
        .bind(id.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?
        .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))?;

        let today: i64 = row.try_get("requests_used_today").map_err(storage_err)?;
        let this_minute: i64 = row
            .try_get("requests_used_this_minute")
            .map_err(storage_err)?;

        Ok(UsageCounters {
            requests_used_today: to_u32(today),
            requests_used_this_minute: to_u32(this_minute),
        })
    }
}

fn row_to_key(row: &PgRow) -> Result<ApiKey, DomainError> {
    let tier_str: String = row.try_get("tier").map_err(storage_err)?;
    let tier: Tier = tier_str
        .parse()
        .map_err(|e| DomainError::storage(format!("Corrupt tier column: {}", e)))?;

    let requests_per_day: Option<i64> = row.try_get("requests_per_day").map_err(storage_err)?;

    let parts = ApiKeyParts {
        id: ApiKeyId::new(row.try_get::<String, _>("id").map_err(storage_err)?),
        owner_id: OwnerId::new(row.try_get::<String, _>("owner_id").map_err(storage_err)?),
        name: row.try_get("name").map_err(storage_err)?,
        key_prefix: row.try_get("key_prefix").map_err(storage_err)?,
        secret_hash: row.try_get("secret_hash").map_err(storage_err)?,
        tier,
        requests_per_day: requests_per_day.map(to_u32),
        requests_per_minute: to_u32(row.try_get("requests_per_minute").map_err(storage_err)?),
        requests_used_today: to_u32(row.try_get("requests_used_today").map_err(storage_err)?),
        requests_used_this_minute: to_u32(
            row.try_get("requests_used_this_minute")
                .map_err(storage_err)?,
        ),
        day_window_start: row.try_get("day_window_start").map_err(storage_err)?,
        minute_window_start: row.try_get("minute_window_start").map_err(storage_err)?,
        ip_allowlist: decode_json(row.try_get("ip_allowlist").map_err(storage_err)?)?,
        endpoint_allowlist: decode_json(row.try_get("endpoint_allowlist").map_err(storage_err)?)?,
        active: row.try_get("active").map_err(storage_err)?,
        last_used_at: row.try_get("last_used_at").map_err(storage_err)?,
        expires_at: row.try_get("expires_at").map_err(storage_err)?,
        created_at: row.try_get("created_at").map_err(storage_err)?,
        updated_at: row.try_get("updated_at").map_err(storage_err)?,
    };

    Ok(ApiKey::from_parts(parts))
}

fn encode_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, DomainError> {
    value
        .as_ref()
        .map(|v| {
            serde_json::to_string(v)
                .map_err(|e| DomainError::internal(format!("Failed to encode allow-list: {}", e)))
        })
        .transpose()
}

fn decode_json<T: serde::de::DeserializeOwned>(
    value: Option<String>,
) -> Result<Option<T>, DomainError> {
    value
        .map(|v| {
            serde_json::from_str(&v)
                .map_err(|e| DomainError::storage(format!("Corrupt allow-list column: {}", e)))
        })
        .transpose()
}

fn to_u32(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

fn storage_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::storage(e.to_string())
}
