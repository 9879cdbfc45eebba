//! Keepsake Media Gateway
//!
//! Upload and entry service for the Keepsake personal media diary. Clients
//! submit media (an image or video, optionally with a companion audio
//! track) over HTTP with a provider-issued bearer token; the gateway stores
//! the media durably in S3 and keeps a per-user ordered list of lightweight
//! entry records pointing at it.
//!
//! ## Features
//!
//! - **JWKS-backed identity**: bearer tokens validated against the identity
//!   provider's rotating RS256 key set, cached and refreshed on demand
//! - **Conditional media handling**: already-encoded videos and plain
//!   images are stored as-is; an image arriving with an audio track is
//!   synthesized into a single video via ffmpeg
//! - **Interchangeable entry persistence**: one shared local JSON file, or
//!   one object per user in S3, behind the same contract
//! - **Best-effort cleanup**: deleting an entry removes its metadata first
//!   and then tries to delete the media object, never the other way around
//!
//! ## Architecture
//!
//! ```text
//!  HTTP (axum)            Identity                 Storage
//! ┌──────────────┐      ┌──────────────┐        ┌──────────────┐
//! │ /api/upload  │─────▶│ Identity     │        │ S3 bucket    │
//! │ /api/entries │      │ Verifier     │        │  user_uploads│
//! │ /api/entry/:id      └──────┬───────┘        │  entries/    │
//! └──────┬───────┘             │                └──────▲───────┘
//!        │              ┌──────▼───────┐               │
//!        │              │ JWKS cache   │               │
//!        ▼              └──────────────┘               │
//! ┌──────────────┐      ┌──────────────┐        ┌──────┴───────┐
//! │ Gateway      │─────▶│ Media        │───────▶│ Object       │
//! │ Service      │      │ Pipeline     │ ffmpeg │ Store        │
//! └──────┬───────┘      └──────────────┘        └──────────────┘
//!        │                                             ▲
//!        ▼                                             │
//! ┌──────────────┐   shared file ─ or ─ per-user object│
//! │ Entry Store  │─────────────────────────────────────┘
//! └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod entry_store;
pub mod error;
pub mod jwks;
pub mod media_pipeline;
pub mod object_store;
pub mod service;
pub mod transcoder;

#[cfg(test)]
pub(crate) mod testutil;

pub use auth::{AuthError, IdentityVerifier};
pub use config::Config;
pub use entry_store::{Entry, EntryStore, ObjectEntryStore, SharedFileStore};
pub use error::ServiceError;
pub use jwks::{JwksCache, KeyResolver};
pub use media_pipeline::{MediaPipeline, StoredMedia, UploadedFile};
pub use object_store::{ObjectStore, S3ObjectStore};
pub use service::GatewayService;
pub use transcoder::{FfmpegTranscoder, Transcoder};
