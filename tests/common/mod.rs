#![allow(dead_code)]

use chrono::Utc;
use ledger_server::clock::ManualClock;
use ledger_server::db::{MemoryStore, Principal, PrincipalStore, Role};
use ledger_server::{AppState, Settings, Stores};
use std::sync::Arc;

pub const ADMIN: (&str, &str) = ("admin", "admin_password");
pub const VIEWER: (&str, &str) = ("viewer", "viewer_password");

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
}

pub async fn test_app_with(configure: impl FnOnce(&mut Settings)) -> TestApp {
    let mut settings = Settings::new_for_test().expect("Failed to load test config");
    configure(&mut settings);

    let store = MemoryStore::new();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::from_parts(settings, Stores::memory(store.clone()), clock.clone())
        .expect("Failed to build app state");

    for ((identity, secret), role) in [(ADMIN, Role::Admin), (VIEWER, Role::Viewer)] {
        let hash = state.auth_service.hasher().hash(secret).unwrap();
        let principal = Principal::new(identity.to_string(), hash, role, Utc::now());
        PrincipalStore::insert(&store, &principal).await.unwrap();
    }

    TestApp {
        state,
        store,
        clock,
    }
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}
