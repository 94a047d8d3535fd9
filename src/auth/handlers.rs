use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{error::JsonPayloadError, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::auth::middleware::AuthenticatedUser;
use crate::auth::validation::{validate_login, validate_registration};
use crate::config::CookieConfig;
use crate::db::models::NewUser;
use crate::error::{AppError, AuthError, ValidationErrors};
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Mounts the auth routes. Shared by `main` and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/refresh-token", web::post().to(refresh_token))
        .service(
            web::resource("/users")
                .route(web::get().to(list_users))
                .route(web::post().to(create_user)),
        );
}

/// Malformed bodies get the same 400 shape as failed field validation.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err: JsonPayloadError, _req| {
        warn!("Rejected request body: {}", err);
        let mut fields = ValidationErrors::new();
        fields.insert("body".to_string(), "invalid data".to_string());
        AppError::ValidationError(fields).into()
    })
}

fn cookie_max_age(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn token_cookie<'c>(name: &'c str, value: String, ttl: Duration, config: &CookieConfig) -> Cookie<'c> {
    Cookie::build(name, value)
        .path("/")
        .domain(config.domain.clone())
        .max_age(CookieDuration::seconds(cookie_max_age(ttl)))
        .secure(config.secure)
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish()
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let RegisterRequest {
        name,
        email,
        password,
    } = req.into_inner();
    info!("Received registration request for email: {}", email);

    validate_registration(&name, &email, &password)?;

    match state
        .auth_service
        .register(NewUser {
            name,
            email: email.clone(),
            password,
        })
        .await
    {
        Ok(profile) => {
            info!("Registration successful for email: {}", email);
            Ok(HttpResponse::Created().json(profile))
        }
        Err(e) => {
            error!("Registration failed for email: {}: {}", email, e);
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);

    validate_login(&req.email, &req.password)?;

    let pair = state
        .throttle
        .guard(&req.email, state.auth_service.login(&req.email, &req.password))
        .await
        .map_err(|e| {
            warn!("Login failed for email: {}: {}", req.email, e);
            e
        })?;

    info!("Login successful for email: {}", req.email);

    let tokens = state.auth_service.tokens();
    let cookies = &state.config.cookie;
    Ok(HttpResponse::Ok()
        .cookie(token_cookie(
            ACCESS_TOKEN_COOKIE,
            pair.access_token,
            tokens.access_ttl(),
            cookies,
        ))
        .cookie(token_cookie(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token,
            tokens.refresh_ttl(),
            cookies,
        ))
        .json(serde_json::json!({ "message": "login success" })))
}

pub async fn refresh_token(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let refresh = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            warn!("Refresh requested without a refresh token cookie");
            AuthError::MissingToken
        })?;

    let access = state
        .auth_service
        .refresh_access_token(&refresh)
        .await
        .map_err(|e| {
            warn!("Token refresh failed: {}", e);
            e
        })?;

    Ok(HttpResponse::Ok()
        .cookie(token_cookie(
            ACCESS_TOKEN_COOKIE,
            access,
            state.auth_service.tokens().access_ttl(),
            &state.config.cookie,
        ))
        .json(serde_json::json!({ "message": "token refreshed" })))
}

pub async fn list_users(
    user: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("User {} listed users", user.user_id);
    let users = state.auth_service.list_users().await?;
    Ok(HttpResponse::Ok().json(users))
}

/// Account creation on behalf of a signed-in user. Same validation and hashing as `/register`.
pub async fn create_user(
    user: AuthenticatedUser,
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let RegisterRequest {
        name,
        email,
        password,
    } = req.into_inner();
    info!("User {} is creating an account for email: {}", user.user_id, email);

    validate_registration(&name, &email, &password)?;

    let profile = state
        .auth_service
        .register(NewUser {
            name,
            email: email.clone(),
            password,
        })
        .await
        .map_err(|e| {
            error!("Account creation failed for email: {}: {}", email, e);
            e
        })?;

    Ok(HttpResponse::Created().json(profile))
}
