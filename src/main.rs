use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenv::dotenv;
use ledger_server::auth::middleware::rate_limit;
use ledger_server::config::CorsConfig;
use ledger_server::{configure_routes, telemetry, AppError, AppState, Settings};
use std::net::TcpListener;
use tracing::{info, warn};

fn cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        return Cors::default();
    }

    let cors = config
        .allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin));
    cors.allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec!["Authorization", "Content-Type"])
        .max_age(config.max_age as usize)
}

#[actix_web::main]
async fn main() -> ledger_server::Result<()> {
    dotenv().ok();

    let config = Settings::new()?;
    telemetry::init(&config.log_level);
    info!(environment = %config.environment, "configuration loaded");

    if !config.is_production() && config.auth.jwt_secret == ledger_server::config::DEVELOPMENT_JWT_SECRET {
        warn!("using the development JWT secret; set APP_AUTH__JWT_SECRET outside development");
    }

    let state = AppState::new(config.clone()).await?;
    let sweeper = state.retention_sweeper().spawn();
    let state = web::Data::new(state);

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);
    warn!("TLS is expected to be terminated in front of this service");

    let cors_config = config.cors.clone();
    let result = HttpServer::new(move || {
        App::new()
            .wrap(middleware::from_fn(rate_limit))
            .wrap(cors(&cors_config))
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()));

    sweeper.abort();
    info!("server stopped");
    result
}
