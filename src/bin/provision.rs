//! Registers a principal that can log in to the ledger service.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use ledger_server::auth::SecretHasher;
use ledger_server::db::{PgStore, Principal, PrincipalStore, Role};
use ledger_server::{telemetry, Settings};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "provision", about = "Create a ledger principal")]
struct Args {
    /// Login identity, unique across principals.
    #[arg(long)]
    identity: String,

    /// `admin` or `viewer`.
    #[arg(long, value_parser = parse_role)]
    role: Role,

    #[arg(long, env = "PROVISION_SECRET", hide_env_values = true)]
    secret: String,
}

fn parse_role(raw: &str) -> Result<Role, String> {
    raw.parse::<Role>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    let settings = Settings::new().context("failed to load settings")?;
    telemetry::init(&settings.log_level);

    if args.identity.trim().is_empty() {
        bail!("identity must not be empty");
    }
    if args.secret.len() < 8 {
        bail!("secret must be at least 8 characters");
    }

    let store = PgStore::new_with_options(
        &settings.database.url,
        1,
        Duration::from_secs(settings.database.acquire_timeout_secs),
    )
    .await
    .context("failed to connect to the database")?;
    store.migrate().await.context("failed to run migrations")?;

    let hasher = SecretHasher::from_config(&settings.auth)?;
    let principal = Principal::new(
        args.identity.trim().to_string(),
        hasher.hash(&args.secret)?,
        args.role,
        chrono::Utc::now(),
    );
    store
        .insert(&principal)
        .await
        .with_context(|| format!("failed to create principal {}", principal.identity))?;

    info!(id = %principal.id, identity = %principal.identity, role = %principal.role, "principal created");
    store.close().await;
    Ok(())
}
