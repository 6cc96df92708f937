use std::sync::Arc;

use pactum_agent::{AgreementAssistant, AssistantSettings};
use pactum_backends::{build_services, BuildError};
use pactum_core::config::{AppConfig, ConfigError};
use pactum_db::{connect_with_settings, migrations, DbPool, SessionRepository, SqlSessionRepository};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub assistant: Arc<AgreementAssistant>,
    pub sessions: Arc<dyn SessionRepository>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("backend wiring failed: {0}")]
    Backends(#[from] BuildError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let services = build_services(&config)?;
    let assistant = AgreementAssistant::new(services, AssistantSettings::from_config(&config));
    info!(
        event_name = "system.bootstrap.backends_ready",
        correlation_id = "bootstrap",
        llm_provider = ?config.llm.provider,
        search_index = %config.search.index,
        "assistant backends wired"
    );

    Ok(Application {
        sessions: Arc::new(SqlSessionRepository::new(db_pool.clone())),
        assistant: Arc::new(assistant),
        config,
        db_pool,
    })
}
