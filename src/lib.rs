//! Market Data Gateway
//!
//! API-key authentication and tiered rate limiting in front of a trading
//! data API:
//! - Opaque prefixed credentials, Argon2-hashed at rest
//! - Static tier registry (free/starter/pro/enterprise) gating endpoints
//! - Fixed minute/day quota windows with atomic counter commits
//! - Fire-and-forget usage telemetry with retention

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;

use std::sync::Arc;

use rand::Rng;
use tracing::{info, warn};

use api::middleware::SessionAuth;
use api::state::{ApiKeyServiceTrait, AppState};
use domain::usage::UsageRepository;
use infrastructure::api_key::{
    ApiKeyService, CredentialGenerator, Environment, InMemoryApiKeyRepository,
    PostgresApiKeyRepository,
};
use infrastructure::usage::{
    InMemoryUsageRepository, PostgresUsageRepository, UsageRecorder,
};

/// Create the application state with default configuration
pub async fn create_app_state() -> anyhow::Result<AppState> {
    create_app_state_with_config(&AppConfig::default()).await
}

/// Create the application state with custom configuration
pub async fn create_app_state_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    let environment = key_environment();
    let generator = CredentialGenerator::new(environment);

    let use_postgres = config.storage.backend.eq_ignore_ascii_case("postgres");

    let (api_key_service, usage_repository): (
        Arc<dyn ApiKeyServiceTrait>,
        Arc<dyn UsageRepository>,
    ) = if use_postgres {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        info!("Connecting to PostgreSQL...");
        let pool = sqlx::PgPool::connect(&database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to PostgreSQL: {}", e))?;
        info!("PostgreSQL connection established");

        let key_repository = PostgresApiKeyRepository::new(pool.clone());
        key_repository.ensure_schema().await?;

        let usage_repository = PostgresUsageRepository::new(pool);
        usage_repository.ensure_schema().await?;

        (
            Arc::new(ApiKeyService::new(Arc::new(key_repository), generator)),
            Arc::new(usage_repository),
        )
    } else {
        info!("Using in-memory storage");

        (
            Arc::new(ApiKeyService::new(
                Arc::new(InMemoryApiKeyRepository::new()),
                generator,
            )),
            Arc::new(InMemoryUsageRepository::default()),
        )
    };

    let retention = chrono::Duration::days(config.usage.retention_days.max(1));
    let usage_recorder = UsageRecorder::spawn(usage_repository.clone(), retention);

    let session_auth = Arc::new(SessionAuth::new(&session_secret(config)));

    Ok(AppState::new(
        api_key_service,
        usage_repository,
        usage_recorder,
        session_auth,
    ))
}

/// Environment marker baked into minted credentials
fn key_environment() -> Environment {
    match std::env::var("API_KEY_ENVIRONMENT").as_deref() {
        Ok("test") => Environment::Test,
        _ => Environment::Live,
    }
}

/// Session secret from config, env, or a random fallback
fn session_secret(config: &AppConfig) -> String {
    config
        .auth
        .session_secret
        .clone()
        .or_else(|| std::env::var("SESSION_SECRET").ok())
        .unwrap_or_else(|| {
            warn!(
                "No session secret configured. Generating a random secret; \
                owner sessions will NOT survive restarts. \
                Set SESSION_SECRET or auth.session_secret."
            );
            generate_random_secret()
        })
}

fn generate_random_secret() -> String {
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}
