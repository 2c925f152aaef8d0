//! Paddock - a small multi-user garage manager with a Telegram sidekick

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use paddock::{
    bot,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxExpiryRepository, SqlxMaintenanceRepository, SqlxSessionRepository,
            SqlxUserRepository, SqlxVehicleRepository,
        },
    },
    services::{ExpiryService, MaintenanceService, UserService, VehicleService},
    web::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paddock=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Paddock...");

    // Load configuration (file, then environment overrides)
    let mut config = Config::load_with_env(Path::new("config.yaml"))?;
    if config.session.secret.is_empty() {
        // Sessions won't survive a restart without a configured secret
        tracing::warn!("No session secret configured; generating a random one");
        config.session.secret =
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    }
    let config = Arc::new(config);
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database ready at {}", config.database.path.display());

    web::ensure_upload_dirs(&config.uploads.path).await?;

    // Repositories and services
    let user_repo = Arc::new(SqlxUserRepository::new(pool.clone()));
    let session_repo = Arc::new(SqlxSessionRepository::new(pool.clone()));
    let vehicle_repo = Arc::new(SqlxVehicleRepository::new(pool.clone()));
    let maintenance_repo = Arc::new(SqlxMaintenanceRepository::new(pool.clone()));
    let expiry_repo = Arc::new(SqlxExpiryRepository::new(pool.clone()));

    let user_service = Arc::new(UserService::with_session_ttl(
        user_repo,
        session_repo,
        config.session.ttl_days,
    ));
    let vehicle_service = Arc::new(VehicleService::new(vehicle_repo.clone()));
    let maintenance_service = Arc::new(MaintenanceService::new(
        maintenance_repo,
        vehicle_repo.clone(),
    ));
    let expiry_service = Arc::new(ExpiryService::new(expiry_repo, vehicle_repo));

    // The superadmin account always exists
    let superadmin = user_service.ensure_superadmin().await?;
    tracing::info!(username = %superadmin.username, "Superadmin ready");

    // Expired session sweep (runs every hour)
    {
        let service = user_service.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match service.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(count = n, "Removed expired sessions"),
                    Err(e) => tracing::warn!(error = %e, "Session cleanup failed"),
                }
            }
        });
    }

    // Telegram bot, only when a token is configured
    if config.bot.token.is_some() {
        let bot_config = config.clone();
        let bot_users = user_service.clone();
        let bot_vehicles = vehicle_service.clone();
        let bot_maintenance = maintenance_service.clone();
        let bot_expiries = expiry_service.clone();
        tokio::spawn(async move {
            if let Err(e) = bot::run(
                bot_config,
                bot_users,
                bot_vehicles,
                bot_maintenance,
                bot_expiries,
            )
            .await
            {
                tracing::error!(error = %e, "Telegram bot stopped");
            }
        });
    } else {
        tracing::info!("No bot token configured, Telegram bot disabled");
    }

    // Build application state and router
    let templates = Arc::new(web::build_templates()?);
    let state = AppState {
        config: config.clone(),
        templates,
        user_service,
        vehicle_service,
        maintenance_service,
        expiry_service,
    };
    let app = web::build_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
