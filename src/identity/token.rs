//! Symmetric HMAC-signed bearer session tokens (§2 Identity)

use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use base64::Engine;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime from mint to expiry
pub const TOKEN_TTL_HOURS: i64 = 24;

/// Outcome of verifying a bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenVerification {
    /// Token is well-formed, unexpired, and its signature matches
    Valid(i64),
    /// Signature checked out but the expiry has passed
    Expired,
    /// Signature mismatch, unparsable payload, or any other structural defect
    Malformed,
}

/// Mint a bearer token carrying `account_id` as subject, signed with `secret`
#[must_use]
pub fn mint_token(account_id: i64, secret: &[u8]) -> String {
    let expires_at = (Utc::now() + Duration::hours(TOKEN_TTL_HOURS)).timestamp();
    let payload = format!("{account_id}.{expires_at}");
    let signature = sign(payload.as_bytes(), secret);
    format!("{}.{}", B64.encode(payload.as_bytes()), B64.encode(signature))
}

/// Verify a bearer token previously minted by [`mint_token`] with the same
/// secret
#[must_use]
pub fn verify_token(token: &str, secret: &[u8]) -> TokenVerification {
    let Some((payload_b64, signature_b64)) = token.split_once('.') else {
        return TokenVerification::Malformed;
    };

    let Ok(payload_bytes) = B64.decode(payload_b64) else {
        return TokenVerification::Malformed;
    };
    let Ok(signature) = B64.decode(signature_b64) else {
        return TokenVerification::Malformed;
    };

    let expected = sign(&payload_bytes, secret);
    if expected.len() != signature.len() || expected.ct_eq(&signature).unwrap_u8() != 1 {
        return TokenVerification::Malformed;
    }

    let Ok(payload) = String::from_utf8(payload_bytes) else {
        return TokenVerification::Malformed;
    };
    let Some((account_id_str, expires_at_str)) = payload.split_once('.') else {
        return TokenVerification::Malformed;
    };
    let Ok(account_id) = account_id_str.parse::<i64>() else {
        return TokenVerification::Malformed;
    };
    let Ok(expires_at) = expires_at_str.parse::<i64>() else {
        return TokenVerification::Malformed;
    };

    if Utc::now().timestamp() > expires_at {
        return TokenVerification::Expired;
    }

    TokenVerification::Valid(account_id)
}

fn sign(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}
