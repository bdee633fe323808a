//! Bearer token extraction for authenticated REST routes (§6)

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;

use super::ApiState;
use crate::identity::TokenVerification;
use crate::Error;

/// The authenticated account id, extracted from the `Authorization: Bearer
/// <token>` header. Handlers that take this as an argument are implicitly
/// protected: extraction fails before the handler body runs.
pub struct AuthenticatedAccount(pub i64);

impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    Arc<ApiState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<ApiState>::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::Unauthenticated)?;

        let token = header.strip_prefix("Bearer ").ok_or(Error::Unauthenticated)?;

        match state.identity.verify_token(token) {
            TokenVerification::Valid(account_id) => Ok(Self(account_id)),
            TokenVerification::Expired | TokenVerification::Malformed => Err(Error::Unauthenticated),
        }
    }
}
