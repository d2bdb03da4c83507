//! Sluice Pipeline Service
//!
//! Runs user-defined transformations over datasource data.
//!
//! Architecture:
//! - Configuration: settings from the environment with defaults
//! - Store: Postgres transactions over the repositories and the outbox
//! - Services: config management with event emission, trigger fan-out,
//!   transformed data reads
//! - API: thin HTTP layer over the services

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;
pub mod store;

use crate::api::AppState;
use crate::config::Config;
use crate::service::{JsonSchemaValidator, PipelineConfigManager, TransformedDataService};
use crate::store::{PgStore, Store};
use sluice_lua::PipelineExecutor;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sluice_pipeline=debug,sluice_lua=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Sluice Pipeline...");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    info!(
        "Loaded configuration: bind_addr={}, sandbox_timeout={:?}",
        config.bind_addr, config.sandbox_timeout
    );

    // Create database connection pool
    info!("Connecting to database...");
    let pool = connect_with_retry(&config).await?;
    info!("Database connection pool created");

    // Run migrations
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    // Wire store, executor and services
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let executor = Arc::new(PipelineExecutor::lua(config.sandbox_options()));
    info!("Pipeline executor {} ready", executor.version());

    let manager = PipelineConfigManager::new(
        store.clone(),
        executor,
        Arc::new(JsonSchemaValidator),
        config.routing_keys.clone(),
    );
    let state = AppState {
        manager,
        transformed_data: TransformedDataService::new(store),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    // Start server
    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

/// Connects to the database with retry logic and exponential backoff
///
/// The database may not be ready yet when the service starts (common in
/// container environments).
async fn connect_with_retry(config: &Config) -> Result<PgPool> {
    const MAX_DELAY: Duration = Duration::from_secs(30);

    let mut attempt = 0;
    let mut delay = config.connection_backoff;

    loop {
        attempt += 1;

        match db::create_pool(&config.database_url, config.db_max_connections).await {
            Ok(pool) => {
                if attempt > 1 {
                    info!("Connected to database after {} attempt(s)", attempt);
                }
                return Ok(pool);
            }
            Err(e) => {
                if attempt >= config.connection_retries {
                    error!(
                        "Failed to connect to database after {} attempts",
                        config.connection_retries
                    );
                    return Err(anyhow::anyhow!("Failed to connect to database: {}", e));
                }

                warn!(
                    "Failed to connect to database (attempt {}/{}): {}",
                    attempt, config.connection_retries, e
                );
                warn!("Retrying in {:?}...", delay);

                tokio::time::sleep(delay).await;

                // Exponential backoff with cap
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}
