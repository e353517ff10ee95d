//! In-process store with the same semantics as [`super::PgStore`].
//!
//! Every operation takes one lock over all tables, which makes each call a
//! serialized unit of work. Meant for tests and single-process development;
//! state does not survive a restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    LedgerEntry, LiveRenewal, NewLedgerEntry, Principal, RateKey, RateWindow, RenewalRecord,
};
use super::{DbResult, LedgerStore, PrincipalStore, RateWindowStore, RenewalStore};
use crate::error::DatabaseError;

#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub ledger_id: i64,
    pub actor: String,
    pub action: String,
}

#[derive(Debug, Default)]
struct Tables {
    principals: HashMap<Uuid, Principal>,
    // keyed by token hash, which is unique
    renewals: HashMap<String, RenewalRecord>,
    rate_windows: HashMap<RateKey, RateWindow>,
    ledger: Vec<LedgerEntry>,
    audit: Vec<AuditRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn renewal_count(&self) -> usize {
        self.tables.lock().await.renewals.len()
    }

    pub async fn has_renewal(&self, token_hash: &str) -> bool {
        self.tables.lock().await.renewals.contains_key(token_hash)
    }

    pub async fn rate_window(&self, key: &RateKey) -> Option<RateWindow> {
        self.tables.lock().await.rate_windows.get(key).cloned()
    }

    pub async fn audit_log(&self) -> Vec<AuditRecord> {
        self.tables.lock().await.audit.clone()
    }
}

fn insert_renewal(tables: &mut Tables, record: &RenewalRecord) -> DbResult<()> {
    if tables.renewals.contains_key(&record.token_hash) {
        return Err(DatabaseError::Duplicate);
    }
    tables
        .renewals
        .insert(record.token_hash.clone(), record.clone());
    Ok(())
}

#[async_trait]
impl PrincipalStore for MemoryStore {
    async fn find_by_identity(&self, identity: &str) -> DbResult<Option<Principal>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .principals
            .values()
            .find(|p| p.identity == identity)
            .cloned())
    }

    async fn insert(&self, principal: &Principal) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.principals.contains_key(&principal.id)
            || tables
                .principals
                .values()
                .any(|p| p.identity == principal.identity)
        {
            return Err(DatabaseError::Duplicate);
        }
        tables.principals.insert(principal.id, principal.clone());
        Ok(())
    }
}

#[async_trait]
impl RenewalStore for MemoryStore {
    async fn insert(&self, record: &RenewalRecord) -> DbResult<()> {
        let mut tables = self.tables.lock().await;
        if !tables.principals.contains_key(&record.principal_id) {
            return Err(DatabaseError::QueryError(format!(
                "renewal owner {} does not exist",
                record.principal_id
            )));
        }
        insert_renewal(&mut tables, record)
    }

    async fn find_live(
        &self,
        owner: Uuid,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<LiveRenewal>> {
        let tables = self.tables.lock().await;
        let Some(record) = tables
            .renewals
            .get(token_hash)
            .filter(|r| r.principal_id == owner && !r.is_expired(now))
        else {
            return Ok(None);
        };
        Ok(tables.principals.get(&owner).map(|p| LiveRenewal {
            principal_id: owner,
            role: p.role,
            expires_at: record.expires_at,
        }))
    }

    async fn delete(&self, owner: Uuid, token_hash: &str) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let owned = tables
            .renewals
            .get(token_hash)
            .is_some_and(|r| r.principal_id == owner);
        if !owned {
            return Ok(0);
        }
        tables.renewals.remove(token_hash);
        Ok(1)
    }

    async fn rotate(
        &self,
        owner: Uuid,
        old_hash: &str,
        replacement: &RenewalRecord,
    ) -> DbResult<bool> {
        let mut tables = self.tables.lock().await;
        let owned = tables
            .renewals
            .get(old_hash)
            .is_some_and(|r| r.principal_id == owner);
        if !owned {
            return Ok(false);
        }
        if tables.renewals.contains_key(&replacement.token_hash) {
            return Err(DatabaseError::Duplicate);
        }
        tables.renewals.remove(old_hash);
        insert_renewal(&mut tables, replacement)?;
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.renewals.len();
        tables.renewals.retain(|_, r| !r.is_expired(now));
        Ok((before - tables.renewals.len()) as u64)
    }
}

#[async_trait]
impl RateWindowStore for MemoryStore {
    async fn record_hit(
        &self,
        key: &RateKey,
        now: DateTime<Utc>,
        window: Duration,
    ) -> DbResult<i64> {
        let cutoff = now - window;
        let mut tables = self.tables.lock().await;

        if tables
            .rate_windows
            .get(key)
            .is_some_and(|w| w.window_start <= cutoff)
        {
            tables.rate_windows.remove(key);
        }

        let entry = tables
            .rate_windows
            .entry(key.clone())
            .and_modify(|w| w.request_count += 1)
            .or_insert(RateWindow {
                window_start: now,
                request_count: 1,
            });
        Ok(entry.request_count)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let mut tables = self.tables.lock().await;
        let before = tables.rate_windows.len();
        tables.rate_windows.retain(|_, w| w.window_start >= cutoff);
        Ok((before - tables.rate_windows.len()) as u64)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create(&self, entry: &NewLedgerEntry, actor: &str) -> DbResult<LedgerEntry> {
        let mut tables = self.tables.lock().await;
        let id = tables.ledger.last().map_or(1, |e| e.id + 1);
        let created = LedgerEntry {
            id,
            amount: entry.amount,
            description: entry.description.clone(),
            created_at: Utc::now(),
        };
        tables.ledger.push(created.clone());
        tables.audit.push(AuditRecord {
            ledger_id: id,
            actor: actor.to_string(),
            action: "INSERT".to_string(),
        });
        Ok(created)
    }

    async fn list(&self) -> DbResult<Vec<LedgerEntry>> {
        Ok(self.tables.lock().await.ledger.clone())
    }

    async fn get(&self, id: i64) -> DbResult<Option<LedgerEntry>> {
        Ok(self
            .tables
            .lock()
            .await
            .ledger
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Role;

    fn principal(identity: &str) -> Principal {
        Principal::new(identity.into(), "hash".into(), Role::Viewer, Utc::now())
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let store = MemoryStore::new();
        PrincipalStore::insert(&store, &principal("alice")).await.unwrap();
        let err = PrincipalStore::insert(&store, &principal("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Duplicate));
    }

    #[tokio::test]
    async fn rate_window_resets_after_it_elapses() {
        let store = MemoryStore::new();
        let key = RateKey::new("1.2.3.4", "GET /ledger");
        let window = Duration::seconds(60);
        let t0 = Utc::now();

        assert_eq!(store.record_hit(&key, t0, window).await.unwrap(), 1);
        assert_eq!(
            store
                .record_hit(&key, t0 + Duration::seconds(59), window)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .record_hit(&key, t0 + Duration::seconds(60), window)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn find_live_ignores_expired_and_foreign_records() {
        let store = MemoryStore::new();
        let owner = principal("bob");
        PrincipalStore::insert(&store, &owner).await.unwrap();
        let now = Utc::now();
        let record = RenewalRecord {
            principal_id: owner.id,
            token_hash: "digest".into(),
            expires_at: now + Duration::days(7),
            created_at: now,
        };
        RenewalStore::insert(&store, &record).await.unwrap();

        let live = store.find_live(owner.id, "digest", now).await.unwrap();
        assert_eq!(live.map(|l| l.role), Some(Role::Viewer));
        assert!(store
            .find_live(Uuid::new_v4(), "digest", now)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_live(owner.id, "digest", now + Duration::days(7))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.delete(Uuid::new_v4(), "digest").await.unwrap(), 0);
        assert_eq!(store.delete(owner.id, "digest").await.unwrap(), 1);
    }
}
