use std::error::Error;

use novelshelf::app::build_router;
use novelshelf::core::config::{Config, Storage};
use novelshelf::core::db::pool::health_check;
use novelshelf::core::db::{
    MemoryPrincipalRepository, MemoryShelfRepository, PgPrincipalRepository, PgShelfRepository,
    create_pool_with_migrations,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Secrets are redacted by the Debug impls
    let config = Config::from_env()?;
    tracing::info!("Config loaded: {:?}", config);

    let app = match &config.storage {
        Storage::Postgres(database) => {
            let pool = create_pool_with_migrations(database).await?;
            health_check(&pool).await?;

            build_router(
                &config,
                PgPrincipalRepository::new(pool.clone()),
                PgShelfRepository::new(pool),
            )
        }
        Storage::Memory => {
            tracing::warn!("Using in-memory storage, all data is lost on shutdown");
            build_router(
                &config,
                MemoryPrincipalRepository::new(),
                MemoryShelfRepository::new(),
            )
        }
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
    }
    tracing::info!("Gracefully shutdown");
}
