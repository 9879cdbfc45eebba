//! Narrow blob-storage capability over S3-compatible backends.
//!
//! Both media objects and (in object mode) per-subject entry collections go
//! through this interface, so callers never see SDK types. Missing objects
//! are a distinguished outcome, not an error; everything else the backend
//! reports collapses to [`StoreError::Unavailable`].

use crate::config::S3Config;
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during object store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

/// Capability interface for durable byte blobs at string keys
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes at a key, overwriting any previous object
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Fetch the object at a key; `None` when it does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Delete the object at a key; `false` when the backend can tell the
    /// object was not there (S3 cannot and always reports `true`)
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Durable, externally resolvable locator for the object at a key
    fn public_url(&self, key: &str) -> String;

    /// Invert [`Self::public_url`]: recover the key from a locator this
    /// store issued. `None` when the locator is not recognized.
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    url_base: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            url_base: derive_url_base(config),
        })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        let size_bytes = bytes.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        debug!(key = %key, size_bytes, "object stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match response {
            Ok(output) => {
                let data = output
                    .body
                    .collect()
                    .await
                    .map_err(|err| StoreError::Unavailable(err.to_string()))?;
                Ok(Some(data.into_bytes().to_vec()))
            }
            Err(err) => {
                if err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    Ok(None)
                } else {
                    Err(StoreError::Unavailable(err.to_string()))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        debug!(key = %key, "object deleted");
        Ok(true)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.url_base, key)
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&format!("{}/", self.url_base))
            .filter(|key| !key.is_empty())
            .map(String::from)
    }
}

/// Base URL media locators are built from.
/// Priority: explicit override, custom endpoint (path-style), then the
/// virtual-hosted S3 URL for the bucket/region.
fn derive_url_base(config: &S3Config) -> String {
    if let Some(ref base) = config.public_url_base {
        return base.trim_end_matches('/').to_string();
    }

    if let Some(ref endpoint) = config.endpoint_url {
        return format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket);
    }

    format!(
        "https://{}.s3.{}.amazonaws.com",
        config.bucket, config.region
    )
}

/// Sanitize a path component to prevent path traversal
pub fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Content type inferred from a file extension
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "ogg" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            bucket: "keepsake-media".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            public_url_base: None,
        }
    }

    #[test]
    fn test_url_base_virtual_hosted_default() {
        assert_eq!(
            derive_url_base(&test_config()),
            "https://keepsake-media.s3.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_url_base_custom_endpoint_is_path_style() {
        let config = S3Config {
            endpoint_url: Some("http://localhost:9000/".to_string()),
            ..test_config()
        };
        assert_eq!(derive_url_base(&config), "http://localhost:9000/keepsake-media");
    }

    #[test]
    fn test_url_base_override_wins() {
        let config = S3Config {
            endpoint_url: Some("http://localhost:9000".to_string()),
            public_url_base: Some("https://media.keepsake.app/".to_string()),
            ..test_config()
        };
        assert_eq!(derive_url_base(&config), "https://media.keepsake.app");
    }

    #[test]
    fn test_sanitize_path_component() {
        assert_eq!(sanitize_path_component("user_2abc"), "user_2abc");
        assert_eq!(sanitize_path_component("user/2abc"), "user_2abc");
        assert_eq!(sanitize_path_component("a..b"), "a__b");
        assert_eq!(sanitize_path_component("hello world"), "hello_world");
    }

    #[test]
    fn test_content_type_for_extension() {
        assert_eq!(content_type_for_extension("jpg"), "image/jpeg");
        assert_eq!(content_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(content_type_for_extension("mp4"), "video/mp4");
        assert_eq!(content_type_for_extension("mp3"), "audio/mpeg");
        assert_eq!(
            content_type_for_extension("unknown"),
            "application/octet-stream"
        );
    }
}
