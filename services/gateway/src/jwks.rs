//! Signing-key resolution against the identity provider's published key set.
//!
//! The provider rotates its RS256 signing keys and publishes the current set
//! at a well-known JWKS endpoint. Keys are cached process-wide and refreshed
//! lazily: a lookup miss triggers one fetch of the full set, replacing the
//! cache wholesale, before the lookup is retried. There is no background
//! refresh and no explicit invalidation.

use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Errors that can occur while resolving a signing key
#[derive(Error, Debug)]
pub enum KeyResolverError {
    #[error("signing key {0} not present in the provider key set")]
    KeyNotFound(String),

    #[error("key set discovery failed: {0}")]
    DiscoveryUnavailable(String),
}

/// Single key entry in the provider's published set
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key identifier referenced from token headers
    pub kid: Option<String>,
    /// Key type (only RSA keys are usable for RS256)
    pub kty: String,
    #[serde(rename = "use")]
    pub key_use: Option<String>,
    pub alg: Option<String>,
    /// RSA modulus, base64url
    pub n: Option<String>,
    /// RSA public exponent, base64url
    pub e: Option<String>,
}

/// The provider's published key set
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Resolves a token header's key identifier to a verification key
#[async_trait]
pub trait KeyResolver: Send + Sync {
    async fn resolve(&self, kid: &str) -> Result<DecodingKey, KeyResolverError>;
}

/// Process-wide cache over the provider's JWKS discovery endpoint
pub struct JwksCache {
    http: reqwest::Client,
    jwks_url: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
}

impl JwksCache {
    /// Create a cache for the provider at the given base URL.
    /// The discovery endpoint is `{base}/.well-known/jwks.json`.
    pub fn new(issuer_base_url: &str) -> Self {
        let jwks_url = format!(
            "{}/.well-known/jwks.json",
            issuer_base_url.trim_end_matches('/')
        );

        Self {
            http: reqwest::Client::new(),
            jwks_url,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// The derived discovery URL
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch the current key set and replace the cache wholesale.
    /// Concurrent refreshes race harmlessly: both write a full fresh set.
    async fn refresh(&self) -> Result<(), KeyResolverError> {
        debug!(url = %self.jwks_url, "refreshing provider key set");

        let set: JwkSet = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeyResolverError::DiscoveryUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| KeyResolverError::DiscoveryUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| KeyResolverError::DiscoveryUnavailable(e.to_string()))?;

        let fresh = build_key_map(&set);

        info!(key_count = fresh.len(), "provider key set refreshed");

        *self.keys.write().await = fresh;
        Ok(())
    }
}

#[async_trait]
impl KeyResolver for JwksCache {
    async fn resolve(&self, kid: &str) -> Result<DecodingKey, KeyResolverError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        // Miss: the provider may have rotated keys since the last fetch
        self.refresh().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyResolverError::KeyNotFound(kid.to_string()))
    }
}

/// Convert a published key set into usable verification keys.
/// Entries without a key id, non-RSA entries, and malformed RSA components
/// are skipped with a warning rather than failing the whole set.
fn build_key_map(set: &JwkSet) -> HashMap<String, DecodingKey> {
    let mut keys = HashMap::new();

    for jwk in &set.keys {
        let Some(kid) = jwk.kid.clone() else {
            warn!("skipping provider key without a key id");
            continue;
        };

        if jwk.kty != "RSA" {
            warn!(kid = %kid, kty = %jwk.kty, "skipping non-RSA provider key");
            continue;
        }

        let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
            warn!(kid = %kid, "skipping RSA key with missing components");
            continue;
        };

        match DecodingKey::from_rsa_components(n, e) {
            Ok(key) => {
                keys.insert(kid, key);
            }
            Err(err) => {
                warn!(kid = %kid, error = %err, "skipping malformed RSA key");
            }
        }
    }

    keys
}
