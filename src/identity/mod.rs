//! Identity: password hashing/verification, session tokens, and third-party
//! assertion verification (§2)

mod external;
mod password;
mod token;

pub use external::{ExternalIdentity, ExternalIdentityVerifier};
pub use password::{hash_password, verify_password};
pub use token::{mint_token, verify_token, TokenVerification, TOKEN_TTL_HOURS};

/// Owns the token-signing secret and (optionally) an external-identity
/// verifier; the single entry point the API layer calls through.
#[derive(Clone)]
pub struct Identity {
    token_secret: Vec<u8>,
    external: Option<std::sync::Arc<ExternalIdentityVerifier>>,
}

impl Identity {
    /// Build an identity service. `token_secret` must be non-empty; callers
    /// are expected to have already enforced this at startup.
    #[must_use]
    pub fn new(token_secret: Vec<u8>, external: Option<ExternalIdentityVerifier>) -> Self {
        Self {
            token_secret,
            external: external.map(std::sync::Arc::new),
        }
    }

    /// Hash a plaintext password
    ///
    /// # Errors
    ///
    /// Returns error if the underlying KDF fails
    pub fn hash_password(&self, plaintext: &str) -> crate::Result<String> {
        password::hash_password(plaintext)
    }

    /// Verify a plaintext password against a stored hash
    ///
    /// # Errors
    ///
    /// Returns error if the stored hash is malformed
    pub fn verify_password(&self, plaintext: &str, hash: &str) -> crate::Result<bool> {
        password::verify_password(plaintext, hash)
    }

    /// Mint a bearer token for an account
    #[must_use]
    pub fn mint_token(&self, account_id: i64) -> String {
        token::mint_token(account_id, &self.token_secret)
    }

    /// Verify a bearer token
    #[must_use]
    pub fn verify_token(&self, token: &str) -> TokenVerification {
        token::verify_token(token, &self.token_secret)
    }

    /// Verify a third-party identity assertion
    ///
    /// # Errors
    ///
    /// Returns `Error::ServiceUnavailable` if no external verifier is
    /// configured, or whatever [`ExternalIdentityVerifier::verify`] returns
    pub async fn verify_external_assertion(&self, assertion: &str) -> crate::Result<ExternalIdentity> {
        match &self.external {
            Some(verifier) => verifier.verify(assertion).await,
            None => Err(crate::Error::ServiceUnavailable(
                "no external identity provider configured".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_mint_and_verify_through_identity() {
        let identity = Identity::new(b"secret".to_vec(), None);
        let token = identity.mint_token(7);
        assert_eq!(identity.verify_token(&token), TokenVerification::Valid(7));
    }

    #[test]
    fn test_password_roundtrip_through_identity() {
        let identity = Identity::new(b"secret".to_vec(), None);
        let hash = identity.hash_password("hunter2").unwrap();
        assert!(identity.verify_password("hunter2", &hash).unwrap());
        assert!(!identity.verify_password("wrong", &hash).unwrap());
    }
}
