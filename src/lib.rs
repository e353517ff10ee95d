pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod sweeper;
pub mod telemetry;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use std::time::Duration;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, RateLimiter, TokenCodec};
use clock::{Clock, SystemClock};
use db::{LedgerStore, MemoryStore, PgStore, PrincipalStore, RateWindowStore, RenewalStore};
use sweeper::RetentionSweeper;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// The stores the application runs against.
#[derive(Clone)]
pub struct Stores {
    pub principals: Arc<dyn PrincipalStore>,
    pub renewals: Arc<dyn RenewalStore>,
    pub rate_windows: Arc<dyn RateWindowStore>,
    pub ledger: Arc<dyn LedgerStore>,
}

impl Stores {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            principals: store.clone(),
            renewals: store.clone(),
            rate_windows: store.clone(),
            ledger: store,
        }
    }

    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            principals: store.clone(),
            renewals: store.clone(),
            rate_windows: store.clone(),
            ledger: store,
        }
    }
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub clock: Arc<dyn Clock>,
    pub stores: Stores,
    pub codec: Arc<TokenCodec>,
    pub auth_service: Arc<AuthService>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Connects to Postgres, applies migrations and wires the core.
    pub async fn new(config: Settings) -> Result<Self> {
        let store = PgStore::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.acquire_timeout_secs),
        )
        .await?;
        store.migrate().await?;

        Self::from_parts(config, Stores::postgres(store), Arc::new(SystemClock))
    }

    pub fn from_parts(config: Settings, stores: Stores, clock: Arc<dyn Clock>) -> Result<Self> {
        let codec = Arc::new(TokenCodec::new(config.auth.jwt_secret.as_bytes(), clock.clone()));
        let auth_service = AuthService::new(
            stores.principals.clone(),
            stores.renewals.clone(),
            codec.clone(),
            auth::SecretHasher::from_config(&config.auth)?,
            (&config.auth).into(),
        )?;
        let rate_limiter = RateLimiter::new(
            stores.rate_windows.clone(),
            clock.clone(),
            (&config.rate_limit).into(),
        );

        Ok(Self {
            config: Arc::new(config),
            clock,
            stores,
            codec,
            auth_service: Arc::new(auth_service),
            rate_limiter: Arc::new(rate_limiter),
        })
    }

    pub fn retention_sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(
            self.stores.renewals.clone(),
            self.stores.rate_windows.clone(),
            self.clock.clone(),
            &self.config.retention,
        )
    }
}

/// Registers every route. Rate limiting is applied by the caller with
/// `middleware::from_fn(auth::middleware::rate_limit)`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::ValidationError(format!("invalid request body: {err}")).into()
    }))
    .route("/health", web::get().to(health_check))
    .route("/auth/login", web::post().to(auth::handlers::login))
    .route("/auth/refresh", web::post().to(auth::handlers::refresh))
    .route("/auth/logout", web::post().to(auth::handlers::logout))
    .route("/ledger", web::post().to(ledger::create_entry))
    .route("/ledger", web::get().to(ledger::list_entries))
    .route("/ledger/{id}", web::get().to(ledger::get_entry));
}
