//! Brute-force protection for the login endpoint.
//!
//! Per email the throttle moves between three states, all of them held in the
//! throttle store as expiring keys:
//!
//! * `Clear`: no keys.
//! * `Attempting`: `login_attempt:{email}` holds the failure count. Every failure
//!   rewrites it with a fresh `attempt_window` TTL.
//! * `Blocked`: `login_blocked:{email}` exists. Once the count passes
//!   `max_attempts`, each further failure blocks for
//!   `base_block * (count - max_attempts)`.
//!
//! A successful login deletes both keys. Nothing lives in process memory, so
//! several instances can share one store. The read-increment-write sequence is
//! not atomic; concurrent failures for the same email may lose an update.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::ThrottleSettings;
use crate::error::{AppError, AuthError, StoreError};
use crate::store::ThrottleStore;

const BLOCK_MARKER: &str = "blocked";

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub base_block: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::from_secs(15 * 60),
            base_block: Duration::from_secs(5 * 60),
        }
    }
}

impl From<&ThrottleSettings> for ThrottleConfig {
    fn from(settings: &ThrottleSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            attempt_window: Duration::from_secs(settings.attempt_window_secs),
            base_block: Duration::from_secs(settings.base_block_secs),
        }
    }
}

/// What a recorded failure did to the throttle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Counted { attempts: u32 },
    Blocked { attempts: u32, retry_after: Duration },
}

impl From<FailureOutcome> for AuthError {
    fn from(outcome: FailureOutcome) -> Self {
        match outcome {
            FailureOutcome::Counted { .. } => AuthError::InvalidCredentials,
            FailureOutcome::Blocked { retry_after, .. } => AuthError::TooManyAttempts { retry_after },
        }
    }
}

pub fn attempt_key(email: &str) -> String {
    format!("login_attempt:{}", email)
}

pub fn block_key(email: &str) -> String {
    format!("login_blocked:{}", email)
}

pub struct LoginThrottle {
    store: Arc<dyn ThrottleStore>,
    config: ThrottleConfig,
}

impl LoginThrottle {
    pub fn new(store: Arc<dyn ThrottleStore>, config: ThrottleConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Rejects the attempt while a block is active. Store errors abort the request.
    pub async fn check(&self, email: &str) -> Result<(), AppError> {
        let remaining = self.store.ttl(&block_key(email)).await.map_err(|e| {
            error!("Throttle store TTL lookup failed for {}: {}", email, e);
            e
        })?;

        match remaining {
            Some(retry_after) if !retry_after.is_zero() => {
                warn!(
                    "Login blocked for {}, retry after {}s",
                    email,
                    retry_after.as_secs()
                );
                Err(AuthError::TooManyAttempts { retry_after }.into())
            }
            _ => Ok(()),
        }
    }

    /// Clears all throttle state for the email. Failures are logged, not returned.
    pub async fn record_success(&self, email: &str) {
        let keys = [attempt_key(email), block_key(email)];
        if let Err(e) = self.store.delete(&keys).await {
            warn!("Failed to clear throttle state after login for {}: {}", email, e);
        }
    }

    pub async fn record_failure(&self, email: &str) -> Result<FailureOutcome, StoreError> {
        let key = attempt_key(email);

        let previous = self.store.get_int(&key).await.map_err(|e| {
            error!("Failed to read login attempts for {}: {}", email, e);
            e
        })?;
        let attempts = u32::try_from(previous.unwrap_or(0).max(0))
            .unwrap_or(u32::MAX)
            .saturating_add(1);

        self.store
            .set_with_ttl(&key, &attempts.to_string(), self.config.attempt_window)
            .await
            .map_err(|e| {
                error!("Failed to record login attempt for {}: {}", email, e);
                e
            })?;

        if attempts <= self.config.max_attempts {
            info!("Failed login {}/{} for {}", attempts, self.config.max_attempts, email);
            return Ok(FailureOutcome::Counted { attempts });
        }

        let retry_after = self.block_duration(attempts);
        self.store
            .set_with_ttl(&block_key(email), BLOCK_MARKER, retry_after)
            .await
            .map_err(|e| {
                error!("Failed to set login block for {}: {}", email, e);
                e
            })?;

        warn!(
            "Blocking logins for {} for {}s after {} failed attempts",
            email,
            retry_after.as_secs(),
            attempts
        );
        Ok(FailureOutcome::Blocked {
            attempts,
            retry_after,
        })
    }

    /// Linear escalation: the first attempt past the limit blocks for one
    /// `base_block`, the next for two, and so on.
    pub fn block_duration(&self, attempts: u32) -> Duration {
        let multiplier = attempts.saturating_sub(self.config.max_attempts);
        self.config.base_block.saturating_mul(multiplier)
    }

    /// Runs `attempt` behind the throttle.
    ///
    /// The block check happens first and short-circuits without running the
    /// attempt. Only `InvalidCredentials` counts as a failure; other errors pass
    /// through untouched.
    pub async fn guard<T, F>(&self, email: &str, attempt: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        self.check(email).await?;

        match attempt.await {
            Ok(value) => {
                self.record_success(email).await;
                Ok(value)
            }
            Err(AppError::AuthError(AuthError::InvalidCredentials)) => {
                let outcome = self.record_failure(email).await?;
                Err(AuthError::from(outcome).into())
            }
            Err(e) => Err(e),
        }
    }
}
