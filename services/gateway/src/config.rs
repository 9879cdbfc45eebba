use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration for the gateway service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Identity provider configuration
    pub auth: AuthConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Entry persistence configuration
    #[serde(default)]
    pub entries: EntryStoreConfig,
    /// Media handling configuration
    #[serde(default)]
    pub media: MediaConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Identity provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Identity provider base URL; also the expected token issuer.
    /// The JWKS discovery endpoint is derived from it.
    pub issuer_base_url: String,
    /// Enforce audience validation. Off by default: tokens for any
    /// audience are accepted, matching the provider's default setup.
    #[serde(default)]
    pub validate_audience: bool,
    /// Expected audience when `validate_audience` is set
    pub audience: Option<String>,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for media storage
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Override for the public base URL media locators are built from.
    /// Defaults to the virtual-hosted S3 URL for the bucket/region.
    pub public_url_base: Option<String>,
}

/// Entry persistence backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryBackend {
    /// One shared local JSON file holding every subject's entries
    SharedFile,
    /// One JSON object per subject in the object store
    Object,
}

/// Entry persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EntryStoreConfig {
    /// Which backend owns the entry collections
    #[serde(default = "default_entry_backend")]
    pub backend: EntryBackend,
    /// Path of the shared entries file (shared_file backend)
    #[serde(default = "default_entries_file")]
    pub file_path: PathBuf,
    /// Key prefix for per-subject entry objects (object backend)
    #[serde(default = "default_entries_prefix")]
    pub object_key_prefix: String,
}

/// Media handling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Key prefix for stored media objects
    #[serde(default = "default_media_prefix")]
    pub key_prefix: String,
    /// Extensions treated as already-encoded video containers
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    /// Transcoder binary invoked for image+audio synthesis
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,
    /// Directory for transient synthesis scratch files (system temp if unset)
    pub scratch_dir: Option<PathBuf>,
    /// Maximum accepted request body size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "keepsake-gateway".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_entry_backend() -> EntryBackend {
    EntryBackend::SharedFile
}

fn default_entries_file() -> PathBuf {
    PathBuf::from("entries.json")
}

fn default_entries_prefix() -> String {
    "entries".to_string()
}

fn default_media_prefix() -> String {
    "user_uploads".to_string()
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mov", "webm", "mkv", "avi", "m4v"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_max_upload_bytes() -> usize {
    100 * 1024 * 1024 // 100MB
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "keepsake-gateway")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/gateway").required(false))
            .add_source(config::File::with_name("/etc/keepsake/gateway").required(false))
            // Override with environment variables
            // KEEPSAKE__S3__BUCKET -> s3.bucket
            .add_source(
                config::Environment::with_prefix("KEEPSAKE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for EntryStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_entry_backend(),
            file_path: default_entries_file(),
            object_key_prefix: default_entries_prefix(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_media_prefix(),
            video_extensions: default_video_extensions(),
            ffmpeg_path: default_ffmpeg_path(),
            scratch_dir: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: default_true(),
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_entry_backend(), EntryBackend::SharedFile);
        assert_eq!(default_entries_file(), PathBuf::from("entries.json"));
        assert_eq!(default_media_prefix(), "user_uploads");
        assert_eq!(default_max_upload_bytes(), 100 * 1024 * 1024);
    }

    #[test]
    fn test_video_extension_defaults_cover_common_containers() {
        let exts = default_video_extensions();
        for ext in ["mp4", "mov", "webm"] {
            assert!(exts.iter().any(|e| e == ext), "missing {ext}");
        }
    }

    #[test]
    fn test_entry_backend_deserializes_snake_case() {
        let backend: EntryBackend = serde_json::from_str("\"shared_file\"").unwrap();
        assert_eq!(backend, EntryBackend::SharedFile);
        let backend: EntryBackend = serde_json::from_str("\"object\"").unwrap();
        assert_eq!(backend, EntryBackend::Object);
    }
}
