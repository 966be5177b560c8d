use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::extract::CookieJar;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::{
    error::AppError,
    state::AppState,
    users::repo::{is_unique_violation, User},
    validation::{format_issues, validate_login, validate_signup},
};

use super::cookies::{expired_cookie, session_cookie};
use super::dto::{AuthResponse, JwtKeys, LoginRequest, SignupRequest};
use super::services::{hash_password, verify_password};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    if let Err(issues) = validate_signup(&payload) {
        warn!("signup payload failed validation");
        return Err(AppError::Validation(format_issues(&issues)));
    }

    let hash = hash_password(&payload.password)?;

    let user = match User::create(
        &state.db,
        &payload.name,
        &payload.email,
        &hash,
        payload.role,
    )
    .await
    {
        Ok(user) => user,
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %payload.email, "signup with already registered email");
            return Err(AppError::EmailTaken);
        }
        Err(e) => return Err(AppError::Internal(e)),
    };

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user)?;
    let jar = jar.add(session_cookie(token, state.config.is_production()));

    info!(user_id = user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            message: "User created successfully",
            user,
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    if let Err(issues) = validate_login(&payload) {
        warn!("login payload failed validation");
        return Err(AppError::Validation(format_issues(&issues)));
    }

    // Unknown email and wrong password produce the same response body.
    let user = match User::find_by_email(&state.db, &payload.email).await? {
        Some(user) => user,
        None => {
            warn!(email = %payload.email, "login unknown email");
            return Err(AppError::InvalidCredentials);
        }
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(AppError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(&user)?;
    let jar = jar.add(session_cookie(token, state.config.is_production()));

    info!(user_id = user.id, email = %user.email, "user logged in");
    Ok((
        jar,
        Json(AuthResponse {
            message: "Login successful",
            user,
        }),
    ))
}

/// Clears the cookie unconditionally; tokens are stateless so there is
/// nothing to invalidate server-side. Safe to call repeatedly.
#[instrument(skip(state, jar))]
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Value>) {
    let jar = jar.remove(expired_cookie(state.config.is_production()));
    info!("user logged out");
    (jar, Json(json!({ "message": "Logged out successfully" })))
}
