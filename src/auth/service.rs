use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::password::PasswordHasher;
use crate::auth::token::{TokenPair, TokenService};
use crate::db::models::{NewUser, PublicProfile, User};
use crate::db::operations::UserRepository;
use crate::error::{AppError, AuthError, DatabaseError};

/// Registration, login and token refresh. Throttling is layered on top by `LoginThrottle`.
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
    // Verified against when the email is unknown, so both failure paths cost one hash.
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        hasher: PasswordHasher,
    ) -> Result<Self, AuthError> {
        let dummy_hash = hasher.hash(&Uuid::new_v4().to_string())?;
        Ok(Self {
            users,
            tokens,
            hasher,
            dummy_hash,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub async fn register(&self, new_user: NewUser) -> Result<PublicProfile, AppError> {
        let NewUser {
            name,
            email,
            password,
        } = new_user;

        let hasher = self.hasher.clone();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;

        let user = User::new(name, email, password_hash);
        let created = self.users.create(&user).await.map_err(|e| {
            if matches!(e, AppError::DatabaseError(DatabaseError::Duplicate)) {
                warn!("Registration rejected, email already in use: {}", user.email);
            }
            e
        })?;

        info!("Registered user {} ({})", created.id, created.email);
        Ok(created.into())
    }

    /// Unknown email and wrong password both yield `InvalidCredentials`.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AppError> {
        let user = self.users.find_by_email(email).await?;

        let stored_hash = user
            .as_ref()
            .map(|u| u.password_hash.clone())
            .unwrap_or_else(|| self.dummy_hash.clone());
        let verified = self.verify_password(password, stored_hash).await?;

        match user {
            Some(user) if verified => {
                let pair = self.tokens.issue_token_pair(user.id)?;
                info!("Issued token pair for user {}", user.id);
                Ok(pair)
            }
            _ => Err(AuthError::InvalidCredentials.into()),
        }
    }

    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AppError> {
        Ok(self.tokens.refresh_access_token(refresh_token)?)
    }

    pub async fn list_users(&self) -> Result<Vec<PublicProfile>, AppError> {
        let users = self.users.list().await?;
        Ok(users.into_iter().map(PublicProfile::from).collect())
    }

    async fn verify_password(&self, password: &str, stored_hash: String) -> Result<bool, AppError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || hasher.verify(&password, &stored_hash)).await??;
        Ok(verified)
    }
}
