//! Bearer-token identity verification.
//!
//! Tokens are RS256-signed by the identity provider; the signing key is
//! looked up through a [`KeyResolver`]. Signature, issuer, and expiry are
//! validated. Audience validation is intentionally off unless configured:
//! the provider issues tokens for any frontend and the original deployment
//! accepted all of them.
//!
//! Callers only ever see `MissingToken` or a unified `Unauthorized`; the
//! concrete failure cause is logged, never surfaced.

use crate::config::AuthConfig;
use crate::jwks::KeyResolver;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Identity verification outcome for a rejected request
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("no bearer token provided")]
    MissingToken,

    #[error("token verification failed")]
    Unauthorized,
}

/// Claims the gateway cares about; everything else in the token is ignored
#[derive(Debug, Clone, Deserialize)]
struct Claims {
    /// Stable subject identifier assigned by the provider
    sub: String,
}

/// Extract the token from an authorization header value.
/// Accepts the standard `Bearer <token>` form and a bare token.
pub fn extract_bearer(header: Option<&str>) -> Option<&str> {
    let header = header?.trim();

    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if token.is_empty() || token.contains(' ') {
        return None;
    }

    Some(token)
}

/// Validates bearer tokens and yields the subject identifier
pub struct IdentityVerifier {
    resolver: Arc<dyn KeyResolver>,
    issuer: String,
    validate_audience: bool,
    audience: Option<String>,
}

impl IdentityVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>, config: &AuthConfig) -> Self {
        Self {
            resolver,
            issuer: config.issuer_base_url.trim_end_matches('/').to_string(),
            validate_audience: config.validate_audience,
            audience: config.audience.clone(),
        }
    }

    /// Verify the bearer token carried in an authorization header value and
    /// return the token's subject. Pure with respect to everything except
    /// the resolver's key cache.
    pub async fn verify(&self, auth_header: Option<&str>) -> Result<String, AuthError> {
        let token = extract_bearer(auth_header).ok_or(AuthError::MissingToken)?;

        let header = decode_header(token).map_err(|err| {
            warn!(error = %err, "rejected token with unparseable header");
            AuthError::Unauthorized
        })?;

        let kid = header.kid.ok_or_else(|| {
            warn!("rejected token without a key id");
            AuthError::Unauthorized
        })?;

        let key = self.resolver.resolve(&kid).await.map_err(|err| {
            warn!(kid = %kid, error = %err, "signing key resolution failed");
            AuthError::Unauthorized
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_nbf = true;
        match (self.validate_audience, &self.audience) {
            (true, Some(audience)) => validation.set_audience(&[audience.as_str()]),
            // Accept tokens for any audience
            _ => validation.validate_aud = false,
        }

        let data = decode::<Claims>(token, &key, &validation).map_err(|err| {
            warn!(kid = %kid, error = %err, "token validation failed");
            AuthError::Unauthorized
        })?;

        debug!(subject = %data.claims.sub, "token verified");
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        mint_token, mint_token_with_aud, mint_token_with_nbf, FixedKeyResolver, TEST_ISSUER,
    };

    fn test_verifier() -> IdentityVerifier {
        IdentityVerifier::new(
            Arc::new(FixedKeyResolver::with_test_key()),
            &AuthConfig {
                issuer_base_url: TEST_ISSUER.to_string(),
                validate_audience: false,
                audience: None,
            },
        )
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_bearer(Some("abc123")), Some("abc123"));

        assert_eq!(extract_bearer(None), None);
        assert_eq!(extract_bearer(Some("")), None);
        assert_eq!(extract_bearer(Some("Bearer ")), None);
        assert_eq!(extract_bearer(Some("Basic abc123")), None);
    }

    #[tokio::test]
    async fn test_valid_token_yields_stable_subject() {
        let verifier = test_verifier();
        let token = mint_token("user_42", TEST_ISSUER, 3600);

        let header = format!("Bearer {token}");
        let subject = verifier.verify(Some(&header)).await.unwrap();
        assert_eq!(subject, "user_42");

        // Deterministic in the token's subject claim
        let again = verifier.verify(Some(&header)).await.unwrap();
        assert_eq!(again, subject);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let verifier = test_verifier();

        assert_eq!(
            verifier.verify(None).await.unwrap_err(),
            AuthError::MissingToken
        );
        assert_eq!(
            verifier.verify(Some("Bearer ")).await.unwrap_err(),
            AuthError::MissingToken
        );
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let verifier = test_verifier();
        let token = mint_token("user_42", TEST_ISSUER, -3600);

        let result = verifier.verify(Some(&format!("Bearer {token}"))).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_not_yet_valid_token_rejected() {
        let verifier = test_verifier();
        let token = mint_token_with_nbf("user_42", TEST_ISSUER, 7200, 3600);

        let result = verifier.verify(Some(&format!("Bearer {token}"))).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);

        // A not-before in the past is fine
        let token = mint_token_with_nbf("user_42", TEST_ISSUER, 3600, -60);
        assert!(verifier.verify(Some(&format!("Bearer {token}"))).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_issuer_rejected() {
        let verifier = test_verifier();
        let token = mint_token("user_42", "https://evil.example.com", 3600);

        let result = verifier.verify(Some(&format!("Bearer {token}"))).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_malformed_token_rejected() {
        let verifier = test_verifier();

        let result = verifier.verify(Some("Bearer not.a.token")).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let verifier = test_verifier();
        let token = mint_token("user_42", TEST_ISSUER, 3600);

        // Corrupt the signature segment
        let mut parts: Vec<&str> = token.split('.').collect();
        let tampered_sig = "AAAA";
        parts[2] = tampered_sig;
        let tampered = parts.join(".");

        let result = verifier.verify(Some(&format!("Bearer {tampered}"))).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_unknown_signing_key_rejected() {
        let verifier = IdentityVerifier::new(
            Arc::new(FixedKeyResolver::empty()),
            &AuthConfig {
                issuer_base_url: TEST_ISSUER.to_string(),
                validate_audience: false,
                audience: None,
            },
        );
        let token = mint_token("user_42", TEST_ISSUER, 3600);

        let result = verifier.verify(Some(&format!("Bearer {token}"))).await;
        assert_eq!(result.unwrap_err(), AuthError::Unauthorized);
    }

    #[tokio::test]
    async fn test_audience_ignored_by_default() {
        let verifier = test_verifier();
        let token = mint_token_with_aud("user_42", TEST_ISSUER, 3600, "some-frontend");

        let subject = verifier
            .verify(Some(&format!("Bearer {token}")))
            .await
            .unwrap();
        assert_eq!(subject, "user_42");
    }

    #[tokio::test]
    async fn test_audience_enforced_when_configured() {
        let verifier = IdentityVerifier::new(
            Arc::new(FixedKeyResolver::with_test_key()),
            &AuthConfig {
                issuer_base_url: TEST_ISSUER.to_string(),
                validate_audience: true,
                audience: Some("expected-app".to_string()),
            },
        );

        let token = mint_token_with_aud("user_42", TEST_ISSUER, 3600, "expected-app");
        assert!(verifier.verify(Some(&format!("Bearer {token}"))).await.is_ok());

        let token = mint_token_with_aud("user_42", TEST_ISSUER, 3600, "other-app");
        assert_eq!(
            verifier
                .verify(Some(&format!("Bearer {token}")))
                .await
                .unwrap_err(),
            AuthError::Unauthorized
        );
    }
}
