//! Pairing-code issuance and redemption (§6, §4.3)

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::AuthenticatedAccount;
use super::ApiState;
use crate::{Error, Result};

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/pair", post(issue))
        .route("/pair/confirm", post(confirm))
}

#[derive(Deserialize)]
struct IssueRequest {
    host_device_id: i64,
}

#[derive(Serialize)]
struct IssueResponse {
    code: String,
    expires_at: DateTime<Utc>,
}

async fn issue(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<IssueRequest>,
) -> Result<Json<IssueResponse>> {
    let issued = state.pairing_service.issue_code(account_id, body.host_device_id)?;
    Ok(Json(IssueResponse { code: issued.code, expires_at: issued.expires_at }))
}

#[derive(Deserialize)]
struct ConfirmRequest {
    code: String,
    client_device_id: i64,
}

#[derive(Serialize)]
struct ConfirmResponse {
    pairing_id: i64,
    host_device_id: i64,
}

async fn confirm(
    State(state): State<Arc<ApiState>>,
    AuthenticatedAccount(account_id): AuthenticatedAccount,
    Json(body): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>> {
    let account = state
        .accounts
        .find(account_id)?
        .ok_or(Error::Unauthenticated)?;

    if let Err(retry_after_secs) = state.pair_confirm_limiter.check(&account.username) {
        return Err(Error::TooManyAttempts { retry_after_secs });
    }

    let pairing = state
        .pairing_service
        .confirm_code(account_id, &body.code, body.client_device_id)?;

    Ok(Json(ConfirmResponse {
        pairing_id: pairing.id,
        host_device_id: pairing.host_device_id,
    }))
}
