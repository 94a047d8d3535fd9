use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::error::{AppError, AuthError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,  // User ID
    pub exp: i64,   // Expiration time
    pub iat: i64,   // Issued at
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues and verifies HS256 tokens. Holds no per-token state.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        if secret.is_empty() {
            return Err(AppError::ConfigError("JWT secret must not be empty".into()));
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl,
            refresh_ttl,
            clock,
        })
    }

    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AppError> {
        Self::new(
            &config.jwt_secret,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
            clock,
        )
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_token_pair(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.generate_token(user_id, TokenKind::Access)?,
            refresh_token: self.generate_token(user_id, TokenKind::Refresh)?,
        })
    }

    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        self.generate_token(user_id, TokenKind::Access)
    }

    /// Verifies signature, structure and expiry. Expiry is judged by the injected clock.
    pub fn parse_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| {
                debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })?
            .claims;

        if claims.exp <= self.clock.now().timestamp() {
            debug!("Token rejected: expired at {}", claims.exp);
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    pub fn parse_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.parse_kind(token, TokenKind::Access)
    }

    pub fn parse_refresh_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.parse_kind(token, TokenKind::Refresh)
    }

    /// Mints a new access token from a valid refresh token. The refresh token is not rotated.
    pub fn refresh_access_token(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self.parse_refresh_token(refresh_token)?;
        self.issue_access_token(claims.sub)
    }

    fn parse_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.parse_token(token)?;
        if claims.kind != kind {
            debug!("Token rejected: expected {:?}, got {:?}", kind, claims.kind);
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn generate_token(&self, user_id: Uuid, kind: TokenKind) -> Result<String, AuthError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = self.clock.now();
        let exp = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| AuthError::TokenSigning(format!("token lifetime out of range: {:?}", ttl)))?;

        let claims = Claims {
            sub: user_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenSigning(e.to_string()))
    }
}
