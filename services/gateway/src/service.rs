//! Upload orchestration: identity, media handling, entry persistence.
//!
//! Every request runs the same short state machine. Uploads go
//! verify → resolve media → persist entry; reads and deletes go
//! verify → entry store. Identity and validation failures abort before any
//! side effect. A delete removes the metadata first and then attempts to
//! delete the referenced media object best-effort: a failure there is
//! logged, never surfaced, and the metadata removal is not rolled back.

use crate::auth::IdentityVerifier;
use crate::entry_store::{Entry, EntryStore};
use crate::error::ServiceError;
use crate::media_pipeline::{MediaPipeline, UploadedFile};
use crate::object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Composes the verifier, media pipeline, and entry store
pub struct GatewayService {
    verifier: IdentityVerifier,
    pipeline: MediaPipeline,
    entries: Arc<dyn EntryStore>,
    media: Arc<dyn ObjectStore>,
}

impl GatewayService {
    pub fn new(
        verifier: IdentityVerifier,
        pipeline: MediaPipeline,
        entries: Arc<dyn EntryStore>,
        media: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            verifier,
            pipeline,
            entries,
            media,
        }
    }

    /// Verify the caller's identity, counting rejected requests
    async fn verify(&self, auth_header: Option<&str>) -> Result<String, ServiceError> {
        self.verifier.verify(auth_header).await.map_err(|err| {
            metrics::counter!("gateway.auth.rejected").increment(1);
            err.into()
        })
    }

    /// Handle an upload: resolve media, then append a fresh entry.
    #[instrument(skip_all)]
    pub async fn upload(
        &self,
        auth_header: Option<&str>,
        primary: Option<UploadedFile>,
        audio: Option<UploadedFile>,
        caption: String,
    ) -> Result<Entry, ServiceError> {
        let subject = self.verify(auth_header).await?;

        let media = self
            .pipeline
            .handle(&subject, primary, audio)
            .await
            .map_err(|err| {
                metrics::counter!("gateway.uploads.failed").increment(1);
                ServiceError::from(err)
            })?;

        let entry = Entry::new(media.url, caption);
        self.entries
            .append(&subject, entry.clone())
            .await
            .map_err(|err| {
                metrics::counter!("gateway.uploads.failed").increment(1);
                ServiceError::from(err)
            })?;

        metrics::counter!("gateway.uploads.persisted").increment(1);
        info!(subject = %subject, entry_id = %entry.id, "upload persisted");

        Ok(entry)
    }

    /// The subject's entries in append order; empty when none exist.
    #[instrument(skip_all)]
    pub async fn list_entries(
        &self,
        auth_header: Option<&str>,
    ) -> Result<Vec<Entry>, ServiceError> {
        let subject = self.verify(auth_header).await?;

        let entries = self.entries.list(&subject).await.map_err(|err| {
            metrics::counter!("gateway.lists.failed").increment(1);
            ServiceError::from(err)
        })?;

        metrics::counter!("gateway.lists.served").increment(1);
        debug!(subject = %subject, count = entries.len(), "entries listed");

        Ok(entries)
    }

    /// Remove an entry by id, then best-effort delete its media object.
    #[instrument(skip_all, fields(entry_id = %entry_id))]
    pub async fn delete_entry(
        &self,
        auth_header: Option<&str>,
        entry_id: &str,
    ) -> Result<(), ServiceError> {
        let subject = self.verify(auth_header).await?;

        let removed = self
            .entries
            .remove(&subject, entry_id)
            .await
            .map_err(|err| {
                metrics::counter!("gateway.removals.failed").increment(1);
                ServiceError::from(err)
            })?
            .ok_or_else(|| {
                metrics::counter!("gateway.removals.missed").increment(1);
                ServiceError::EntryNotFound
            })?;

        // Metadata removal already succeeded; the blob delete may fail
        // without affecting the outcome, at the cost of an orphaned object
        match self.media.key_for_url(&removed.media_url) {
            Some(key) => match self.media.delete(&key).await {
                Ok(_) => debug!(subject = %subject, key = %key, "media object deleted"),
                Err(err) => warn!(
                    subject = %subject,
                    key = %key,
                    error = %err,
                    "best-effort media delete failed; object orphaned"
                ),
            },
            None => warn!(
                subject = %subject,
                media_url = %removed.media_url,
                "could not derive object key from media locator"
            ),
        }

        metrics::counter!("gateway.removals.completed").increment(1);
        info!(subject = %subject, entry_id = %entry_id, "entry removed");

        Ok(())
    }
}
