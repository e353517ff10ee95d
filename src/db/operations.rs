use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use super::models::{LedgerEntry, LiveRenewal, NewLedgerEntry, Principal, RateKey, RenewalRecord, Role};
use super::{DbResult, LedgerStore, PrincipalStore, RateWindowStore, RenewalStore};
use crate::error::DatabaseError;

/// Postgres-backed implementation of every store trait.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: StdDuration,
    ) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;

        Ok(Self { pool: Arc::new(pool) })
    }

    pub async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| DatabaseError::ConnectionError(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn begin_transaction(&self) -> DbResult<Transaction<'_, Postgres>> {
        Ok(self.pool.as_ref().begin().await?)
    }
}

fn parse_role(raw: &str) -> DbResult<Role> {
    raw.parse::<Role>()
        .map_err(|e| DatabaseError::Corrupt(e.to_string()))
}

fn principal_from_row(row: &PgRow) -> DbResult<Principal> {
    let role: String = row.try_get("role")?;
    Ok(Principal {
        id: row.try_get("id")?,
        identity: row.try_get("identity")?,
        secret_hash: row.try_get("secret_hash")?,
        role: parse_role(&role)?,
        created_at: row.try_get("created_at")?,
    })
}

fn ledger_entry_from_row(row: &PgRow) -> DbResult<LedgerEntry> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl PrincipalStore for PgStore {
    async fn find_by_identity(&self, identity: &str) -> DbResult<Option<Principal>> {
        let row = sqlx::query(
            "SELECT id, identity, secret_hash, role, created_at FROM principals WHERE identity = $1",
        )
        .bind(identity)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.as_ref().map(principal_from_row).transpose()
    }

    async fn insert(&self, principal: &Principal) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO principals (id, identity, secret_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(principal.id)
        .bind(&principal.identity)
        .bind(&principal.secret_hash)
        .bind(principal.role.as_str())
        .bind(principal.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

async fn insert_renewal(
    transaction: &mut Transaction<'_, Postgres>,
    record: &RenewalRecord,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO renewal_tokens (principal_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(record.principal_id)
    .bind(&record.token_hash)
    .bind(record.expires_at)
    .bind(record.created_at)
    .execute(&mut **transaction)
    .await?;

    Ok(())
}

#[async_trait]
impl RenewalStore for PgStore {
    async fn insert(&self, record: &RenewalRecord) -> DbResult<()> {
        let mut transaction = self.begin_transaction().await?;
        insert_renewal(&mut transaction, record).await?;
        transaction.commit().await?;
        Ok(())
    }

    async fn find_live(
        &self,
        owner: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<LiveRenewal>> {
        let row = sqlx::query(
            r#"
            SELECT r.principal_id, p.role, r.expires_at
            FROM renewal_tokens r
            JOIN principals p ON p.id = r.principal_id
            WHERE r.principal_id = $1 AND r.token_hash = $2 AND r.expires_at > $3
            "#,
        )
        .bind(owner)
        .bind(token_hash)
        .bind(now)
        .fetch_optional(self.pool.as_ref())
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let role: String = row.try_get("role")?;
        Ok(Some(LiveRenewal {
            principal_id: row.try_get("principal_id")?,
            role: parse_role(&role)?,
            expires_at: row.try_get("expires_at")?,
        }))
    }

    async fn delete(&self, owner: Uuid, token_hash: &str) -> DbResult<u64> {
        let result =
            sqlx::query("DELETE FROM renewal_tokens WHERE principal_id = $1 AND token_hash = $2")
                .bind(owner)
                .bind(token_hash)
                .execute(self.pool.as_ref())
                .await?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        owner: Uuid,
        old_hash: &str,
        replacement: &RenewalRecord,
    ) -> DbResult<bool> {
        let mut transaction = self.begin_transaction().await?;

        let deleted =
            sqlx::query("DELETE FROM renewal_tokens WHERE principal_id = $1 AND token_hash = $2")
                .bind(owner)
                .bind(old_hash)
                .execute(&mut *transaction)
                .await?
                .rows_affected();

        if deleted == 0 {
            transaction.rollback().await?;
            return Ok(false);
        }

        insert_renewal(&mut transaction, replacement).await?;
        transaction.commit().await?;
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM renewal_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RateWindowStore for PgStore {
    async fn record_hit(
        &self,
        key: &RateKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> DbResult<i64> {
        let cutoff = now - window;
        let mut transaction = self.begin_transaction().await?;

        sqlx::query(
            "DELETE FROM rate_windows WHERE client_key = $1 AND endpoint = $2 AND window_start <= $3",
        )
        .bind(&key.client_key)
        .bind(&key.endpoint)
        .bind(cutoff)
        .execute(&mut *transaction)
        .await?;

        // The unique (client_key, endpoint) index serializes concurrent
        // writers on the same key; different keys never touch the same row.
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO rate_windows (client_key, endpoint, window_start, request_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (client_key, endpoint)
            DO UPDATE SET request_count = rate_windows.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(&key.client_key)
        .bind(&key.endpoint)
        .bind(now)
        .fetch_one(&mut *transaction)
        .await?;

        transaction.commit().await?;
        Ok(count)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM rate_windows WHERE window_start < $1")
            .bind(cutoff)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn create(&self, entry: &NewLedgerEntry, actor: &str) -> DbResult<LedgerEntry> {
        let mut transaction = self.begin_transaction().await?;

        let row = sqlx::query(
            r#"
            INSERT INTO ledger (amount, description)
            VALUES ($1, $2)
            RETURNING id, amount, description, created_at
            "#,
        )
        .bind(entry.amount)
        .bind(&entry.description)
        .fetch_one(&mut *transaction)
        .await?;
        let created = ledger_entry_from_row(&row)?;

        sqlx::query("INSERT INTO ledger_audit (ledger_id, actor, action) VALUES ($1, $2, 'INSERT')")
            .bind(created.id)
            .bind(actor)
            .execute(&mut *transaction)
            .await?;

        transaction.commit().await?;
        Ok(created)
    }

    async fn list(&self) -> DbResult<Vec<LedgerEntry>> {
        let rows =
            sqlx::query("SELECT id, amount, description, created_at FROM ledger ORDER BY id")
                .fetch_all(self.pool.as_ref())
                .await?;

        rows.iter().map(ledger_entry_from_row).collect()
    }

    async fn get(&self, id: i64) -> DbResult<Option<LedgerEntry>> {
        let row = sqlx::query("SELECT id, amount, description, created_at FROM ledger WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        row.as_ref().map(ledger_entry_from_row).transpose()
    }
}
