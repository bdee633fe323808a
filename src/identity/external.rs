//! Verification of third-party identity assertions (§2 Identity)
//!
//! The core only needs one capability from an identity provider: turn an
//! assertion (a signed JWT) into a stable subject identifier. Key discovery
//! and rotation are handled the same way regardless of which provider is
//! configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Claims extracted from a verified external assertion
#[derive(Debug, Deserialize)]
struct ExternalClaims {
    sub: String,
    email: Option<String>,
}

/// The result of a successful [`ExternalIdentityVerifier::verify`] call
#[derive(Debug, Clone)]
pub struct ExternalIdentity {
    pub subject: String,
    pub email: Option<String>,
}

struct CachedJwks {
    keys: Vec<jsonwebtoken::jwk::Jwk>,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct OidcDiscovery {
    jwks_uri: Option<String>,
}

/// Verifies externally-issued identity assertions against the issuer's
/// published keys, caching the JWKS for an hour
pub struct ExternalIdentityVerifier {
    issuer_base_url: String,
    audience: Option<String>,
    client: reqwest::Client,
    keys: Arc<RwLock<Option<CachedJwks>>>,
    jwks_uri: Arc<RwLock<Option<String>>>,
}

impl ExternalIdentityVerifier {
    /// Create a verifier for the given issuer, optionally checking a
    /// required audience claim
    #[must_use]
    pub fn new(issuer_base_url: String, audience: Option<String>) -> Self {
        Self {
            issuer_base_url,
            audience,
            client: reqwest::Client::new(),
            keys: Arc::new(RwLock::new(None)),
            jwks_uri: Arc::new(RwLock::new(None)),
        }
    }

    /// Verify an assertion, returning the subject and (if present) email
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthenticated` if the assertion does not validate
    /// against any published key, or `Error::ServiceUnavailable` if the
    /// issuer's keys cannot be fetched
    pub async fn verify(&self, assertion: &str) -> Result<ExternalIdentity> {
        let jwks = self.get_jwks().await?;

        let header =
            decode_header(assertion).map_err(|_| Error::Unauthenticated)?;

        for jwk in &jwks {
            let Ok(key) = DecodingKey::from_jwk(jwk) else {
                continue;
            };

            let mut validation = Validation::new(header.alg);
            validation.validate_exp = true;
            if let Some(audience) = &self.audience {
                validation.set_audience(&[audience]);
            } else {
                validation.validate_aud = false;
                validation.required_spec_claims.remove("aud");
            }

            if let Ok(data) = decode::<ExternalClaims>(assertion, &key, &validation) {
                return Ok(ExternalIdentity {
                    subject: data.claims.sub,
                    email: data.claims.email,
                });
            }
        }

        Err(Error::Unauthenticated)
    }

    async fn resolve_jwks_uri(&self) -> Result<String> {
        {
            let cached = self.jwks_uri.read().await;
            if let Some(uri) = cached.as_ref() {
                return Ok(uri.clone());
            }
        }

        let discovery_url = format!("{}/.well-known/openid-configuration", self.issuer_base_url);
        let fallback = format!("{}/.well-known/jwks.json", self.issuer_base_url);

        let jwks_url = match self.client.get(&discovery_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<OidcDiscovery>().await {
                Ok(doc) => doc.jwks_uri.unwrap_or(fallback),
                Err(_) => fallback,
            },
            _ => fallback,
        };

        let mut cached = self.jwks_uri.write().await;
        *cached = Some(jwks_url.clone());
        Ok(jwks_url)
    }

    async fn get_jwks(&self) -> Result<Vec<jsonwebtoken::jwk::Jwk>> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let url = self.resolve_jwks_uri().await?;

        let response = self.client.get(&url).send().await.map_err(|e| {
            Error::ServiceUnavailable(format!("external identity provider unreachable: {e}"))
        })?;

        if !response.status().is_success() {
            return Err(Error::ServiceUnavailable(format!(
                "external identity provider returned {}",
                response.status()
            )));
        }

        let jwk_set: jsonwebtoken::jwk::JwkSet = response.json().await.map_err(|e| {
            Error::ServiceUnavailable(format!("external identity provider returned bad JWKS: {e}"))
        })?;

        let keys = jwk_set.keys;
        let mut cache = self.keys.write().await;
        *cache = Some(CachedJwks {
            keys: keys.clone(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        });

        Ok(keys)
    }
}
