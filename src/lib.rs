pub mod auth;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpResponse;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::{AuthService, LoginThrottle, ThrottleConfig, TokenService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use db::{DbOperations, PublicProfile, User, UserRepository};
pub use store::{MemoryThrottleStore, RedisThrottleStore, ThrottleStore};

use auth::PasswordHasher;
use config::ThrottleBackend;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    pub throttle: Arc<LoginThrottle>,
}

impl AppState {
    /// Connects to Postgres and the configured throttle store, then wires the services.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = DbOperations::new_with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(5),
        )
        .await?;
        db.run_migrations().await?;
        info!("Database ready");

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let throttle_store: Arc<dyn ThrottleStore> = match config.throttle.backend {
            ThrottleBackend::Redis => Arc::new(RedisThrottleStore::connect(&config.redis.url).await?),
            ThrottleBackend::Memory => Arc::new(MemoryThrottleStore::new(clock.clone())),
        };
        info!("Throttle store ready ({:?})", config.throttle.backend);

        Self::from_parts(config, Arc::new(db), throttle_store, clock)
    }

    /// Builds the state from already constructed collaborators.
    pub fn from_parts(
        config: Settings,
        users: Arc<dyn UserRepository>,
        throttle_store: Arc<dyn ThrottleStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenService::from_config(&config.auth, clock)?);
        let hasher = PasswordHasher::new(&config.password)?;
        let auth_service = AuthService::new(users, tokens, hasher)?;
        let throttle = LoginThrottle::new(throttle_store, ThrottleConfig::from(&config.throttle));

        Ok(Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            throttle: Arc::new(throttle),
        })
    }
}
