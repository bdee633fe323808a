//! Account registration, login, and external-assertion exchange (§6)

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::{Error, Result};

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/external", post(external))
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct RegisterResponse {
    id: i64,
    username: String,
}

async fn register(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    let hash = state.identity.hash_password(&body.password)?;
    let account = state.accounts.create_with_password(&body.username, &hash)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { id: account.id, username: account.username }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user_id: i64,
}

async fn login(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    if let Err(retry_after_secs) = state.login_limiter.check(&body.username) {
        return Err(Error::TooManyAttempts { retry_after_secs });
    }

    let account = state
        .accounts
        .find_by_username(&body.username)?
        .ok_or(Error::Unauthenticated)?;

    let Some(hash) = &account.password_hash else {
        return Err(Error::Unauthenticated);
    };

    if !state.identity.verify_password(&body.password, hash)? {
        return Err(Error::Unauthenticated);
    }

    let token = state.identity.mint_token(account.id);
    Ok(Json(LoginResponse { token, user_id: account.id }))
}

#[derive(Deserialize)]
struct ExternalRequest {
    assertion: String,
}

#[derive(Serialize)]
struct ExternalResponse {
    token: String,
    user_id: i64,
}

async fn external(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ExternalRequest>,
) -> Result<Json<ExternalResponse>> {
    let identity = state.identity.verify_external_assertion(&body.assertion).await?;
    let account = state
        .accounts
        .find_or_create_external(&identity.subject, identity.email.as_deref())?;
    let token = state.identity.mint_token(account.id);
    Ok(Json(ExternalResponse { token, user_id: account.id }))
}
