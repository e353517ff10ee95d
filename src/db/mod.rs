//! Durable state: principals, renewal records, rate windows and the ledger.
//!
//! Each relation is reached through its own trait so the core can run
//! against Postgres ([`PgStore`]) or the in-process [`MemoryStore`].

pub mod memory;
pub mod models;
pub mod operations;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;

pub use memory::MemoryStore;
pub use models::{
    LedgerEntry, LiveRenewal, NewLedgerEntry, Principal, RateKey, RateWindow, RenewalRecord, Role,
};
pub use operations::PgStore;

pub type DbResult<T> = std::result::Result<T, DatabaseError>;

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> DbResult<Option<Principal>>;

    /// Fails with [`DatabaseError::Duplicate`] if the identity is taken.
    async fn insert(&self, principal: &Principal) -> DbResult<()>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenewalStore: Send + Sync {
    async fn insert(&self, record: &RenewalRecord) -> DbResult<()>;

    /// Returns the record for `(owner, token_hash)` if it has not expired at `now`.
    async fn find_live(
        &self,
        owner: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<LiveRenewal>>;

    async fn delete(&self, owner: Uuid, token_hash: &str) -> DbResult<u64>;

    /// Deletes `(owner, old_hash)` and inserts `replacement` in one unit of
    /// work. Returns `false` and changes nothing if the old record is gone.
    async fn rotate(
        &self,
        owner: Uuid,
        old_hash: &str,
        replacement: &RenewalRecord,
    ) -> DbResult<bool>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Counts one request against `key` and returns the count of the live
    /// window afterwards. A window older than `window` is discarded first.
    async fn record_hit(&self, key: &RateKey, now: DateTime<Utc>, window: Duration)
        -> DbResult<i64>;

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts the entry and its audit row, attributed to `actor`.
    async fn create(&self, entry: &NewLedgerEntry, actor: &str) -> DbResult<LedgerEntry>;

    async fn list(&self) -> DbResult<Vec<LedgerEntry>>;

    async fn get(&self, id: i64) -> DbResult<Option<LedgerEntry>>;
}
