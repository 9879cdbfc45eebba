//! Per-upload media handling: store as-is, or synthesize a video.
//!
//! The decision is made once per upload. Submissions that are already video
//! containers, and submissions without a companion audio track, are stored
//! unmodified (the common fast path). A still image arriving with an audio
//! track is combined into a single video via the [`Transcoder`], and only
//! the produced video becomes the entry's media object.

use crate::config::MediaConfig;
use crate::object_store::{content_type_for_extension, sanitize_path_component, ObjectStore, StoreError};
use crate::transcoder::{TranscodeError, Transcoder};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A file received from the client
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name; only its extension is trusted
    pub filename: String,
    /// Client-supplied content type
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Durable reference to the media object an upload resolved to
#[derive(Debug, Clone)]
pub struct StoredMedia {
    /// Object key under the subject's namespace
    pub key: String,
    /// Durable public locator
    pub url: String,
}

/// Errors that can occur while resolving an upload to stored media
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no file provided")]
    NoFile,

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("scratch storage failed: {0}")]
    Scratch(String),
}

/// Decides, per upload, between storing the submitted file unmodified and
/// synthesizing a video from an image+audio pair
pub struct MediaPipeline {
    store: Arc<dyn ObjectStore>,
    transcoder: Arc<dyn Transcoder>,
    config: MediaConfig,
}

impl MediaPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transcoder: Arc<dyn Transcoder>,
        config: MediaConfig,
    ) -> Self {
        Self {
            store,
            transcoder,
            config,
        }
    }

    /// Resolve an upload to a durable media reference.
    ///
    /// Writes exactly one object on the direct path, two on the synthesis
    /// path (the audio track plus the produced video). A failed synthesis
    /// leaves the already-stored audio object behind; that orphan is an
    /// accepted cost, logged for a future reconciliation sweep.
    #[instrument(skip(self, primary, audio), fields(subject = %subject))]
    pub async fn handle(
        &self,
        subject: &str,
        primary: Option<UploadedFile>,
        audio: Option<UploadedFile>,
    ) -> Result<StoredMedia, PipelineError> {
        let primary = primary.ok_or(PipelineError::NoFile)?;
        let ext = file_extension(&primary.filename);

        match audio {
            Some(audio) if !self.is_video(&ext) => {
                self.synthesize(subject, primary, &ext, audio).await
            }
            _ => self.store_direct(subject, primary, &ext).await,
        }
    }

    fn is_video(&self, ext: &str) -> bool {
        self.config
            .video_extensions
            .iter()
            .any(|v| v.eq_ignore_ascii_case(ext))
    }

    /// Fresh object key under the subject's namespace
    fn media_key(&self, subject: &str, ext: &str) -> String {
        format!(
            "{}/{}/{}.{}",
            self.config.key_prefix.trim_end_matches('/'),
            sanitize_path_component(subject),
            Uuid::new_v4(),
            ext
        )
    }

    async fn store_direct(
        &self,
        subject: &str,
        file: UploadedFile,
        ext: &str,
    ) -> Result<StoredMedia, PipelineError> {
        let key = self.media_key(subject, ext);
        let content_type = file
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_extension(ext).to_string());

        debug!(key = %key, size_bytes = file.bytes.len(), "storing media unmodified");
        self.store.put(&key, file.bytes, &content_type).await?;

        let url = self.store.public_url(&key);
        Ok(StoredMedia { key, url })
    }

    async fn synthesize(
        &self,
        subject: &str,
        image: UploadedFile,
        image_ext: &str,
        audio: UploadedFile,
    ) -> Result<StoredMedia, PipelineError> {
        // Scratch space released unconditionally when this scope ends
        let scratch = match &self.config.scratch_dir {
            Some(dir) => tempfile::Builder::new()
                .prefix("keepsake-synthesis-")
                .tempdir_in(dir),
            None => tempfile::tempdir(),
        }
        .map_err(|err| PipelineError::Scratch(err.to_string()))?;

        let audio_ext = file_extension(&audio.filename);
        let image_path = scratch.path().join(format!("input.{image_ext}"));
        let audio_path = scratch.path().join(format!("audio.{audio_ext}"));
        let output_path = scratch.path().join("output.mp4");

        tokio::fs::write(&image_path, &image.bytes)
            .await
            .map_err(|err| PipelineError::Scratch(err.to_string()))?;
        tokio::fs::write(&audio_path, &audio.bytes)
            .await
            .map_err(|err| PipelineError::Scratch(err.to_string()))?;

        // The audio track is stored under its own key before synthesis runs,
        // so the raw submission survives even if synthesis fails
        let audio_key = self.media_key(subject, &audio_ext);
        let audio_content_type = audio
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for_extension(&audio_ext).to_string());
        self.store
            .put(&audio_key, audio.bytes, &audio_content_type)
            .await?;
        info!(key = %audio_key, "stored companion audio track");

        self.transcoder
            .synthesize(&image_path, &audio_path, &output_path)
            .await
            .inspect_err(|_| {
                // No cleanup of the audio object: orphan accepted
                info!(orphaned_key = %audio_key, "synthesis failed; audio object left in place");
            })?;

        let video = tokio::fs::read(&output_path)
            .await
            .map_err(|err| PipelineError::Scratch(err.to_string()))?;

        let key = self.media_key(subject, "mp4");
        self.store.put(&key, video, "video/mp4").await?;
        info!(key = %key, "stored synthesized video");

        let url = self.store.public_url(&key);
        Ok(StoredMedia { key, url })
    }
}

/// Extension of a client-supplied file name: last dot segment, restricted
/// to ASCII alphanumerics, lowercased. Anything unusable becomes "bin".
pub fn file_extension(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            ext.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryObjectStore, StubTranscoder};

    fn pipeline(
        store: Arc<MemoryObjectStore>,
        transcoder: StubTranscoder,
    ) -> MediaPipeline {
        MediaPipeline::new(store, Arc::new(transcoder), MediaConfig::default())
    }

    fn video_file() -> UploadedFile {
        UploadedFile {
            filename: "clip.mp4".to_string(),
            content_type: Some("video/mp4".to_string()),
            bytes: b"raw video bytes".to_vec(),
        }
    }

    fn image_file() -> UploadedFile {
        UploadedFile {
            filename: "photo.jpg".to_string(),
            content_type: Some("image/jpeg".to_string()),
            bytes: b"raw image bytes".to_vec(),
        }
    }

    fn audio_file() -> UploadedFile {
        UploadedFile {
            filename: "track.mp3".to_string(),
            content_type: Some("audio/mpeg".to_string()),
            bytes: b"raw audio bytes".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_missing_primary_file() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::succeeding());

        let err = p.handle("alice", None, None).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoFile));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_direct_path_stores_input_byte_identical() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::succeeding());

        let media = p
            .handle("alice", Some(video_file()), None)
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.object(&media.key).unwrap(), b"raw video bytes");
        assert_eq!(media.url, format!("memory://{}", media.key));
        assert!(media.key.starts_with("user_uploads/alice/"));
        assert!(media.key.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_video_with_audio_skips_synthesis() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::succeeding());

        let media = p
            .handle("alice", Some(video_file()), Some(audio_file()))
            .await
            .unwrap();

        // Already a video container: stored unmodified, audio discarded
        assert_eq!(store.len(), 1);
        assert_eq!(store.object(&media.key).unwrap(), b"raw video bytes");
    }

    #[tokio::test]
    async fn test_image_without_audio_is_direct() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::succeeding());

        let media = p.handle("alice", Some(image_file()), None).await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(media.key.ends_with(".jpg"));
        assert_eq!(store.object(&media.key).unwrap(), b"raw image bytes");
    }

    #[tokio::test]
    async fn test_synthesis_path_stores_audio_and_video() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::succeeding());

        let media = p
            .handle("alice", Some(image_file()), Some(audio_file()))
            .await
            .unwrap();

        // The audio track and the produced video; the image is never stored
        assert_eq!(store.len(), 2);
        assert!(media.key.ends_with(".mp4"));
        assert_eq!(
            store.object(&media.key).unwrap(),
            StubTranscoder::OUTPUT_BYTES
        );

        let audio_key = store
            .keys()
            .into_iter()
            .find(|k| k.ends_with(".mp3"))
            .expect("audio object stored under its own key");
        assert_eq!(store.object(&audio_key).unwrap(), b"raw audio bytes");
    }

    #[tokio::test]
    async fn test_failed_synthesis_keeps_audio_but_no_video() {
        let store = Arc::new(MemoryObjectStore::new());
        let p = pipeline(store.clone(), StubTranscoder::failing());

        let err = p
            .handle("alice", Some(image_file()), Some(audio_file()))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Transcode(_)));
        // Audio object left in place, no video object written
        assert_eq!(store.len(), 1);
        assert!(store.keys()[0].ends_with(".mp3"));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("photo.jpg"), "jpg");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("CLIP.MP4"), "mp4");
        assert_eq!(file_extension("noextension"), "bin");
        assert_eq!(file_extension("trailing."), "bin");
        assert_eq!(file_extension("weird.j/p\\g"), "jpg");
    }
}
