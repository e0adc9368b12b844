//! Media resolution through pluggable blob stores.
//!
//! A `media` content part that only carries a URI has to be turned into something the
//! provider can fetch. The [`MediaManager`] looks the URI up in a list of resolver
//! stores, copies the blob it finds into its canonical store, and rewrites the part to
//! point at the canonical URI.

use crate::error::{GoogleError, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use gemlink_abstraction::{ContentPart, MessageContent};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// MIME type of the placeholder stored for missing media.
pub const EMPTY_BLOB_MIME_TYPE: &str = "application/octet-stream";

/// A piece of binary media.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Where the blob lives, if it has a name.
    pub path: Option<String>,
    /// MIME type of the data.
    pub mime_type: String,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Blob {
    /// Creates a blob with a path.
    pub fn new<P: Into<String>, M: Into<String>>(path: P, mime_type: M, data: Vec<u8>) -> Self {
        Self { path: Some(path.into()), mime_type: mime_type.into(), data }
    }

    /// Creates an unnamed blob, addressed by its content hash once stored.
    pub fn anonymous<M: Into<String>>(mime_type: M, data: Vec<u8>) -> Self {
        Self { path: None, mime_type: mime_type.into(), data }
    }

    /// Creates the empty placeholder stored for missing media.
    pub fn empty<P: Into<String>>(path: P) -> Self {
        Self::new(path, EMPTY_BLOB_MIME_TYPE, Vec::new())
    }

    /// Hex-encoded SHA-256 digest of the data.
    pub fn sha256_hex(&self) -> String {
        Sha256::digest(&self.data).iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

/// An asynchronous key/value store for blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches the blob stored under `uri`.
    ///
    /// # Errors
    /// Returns `BlobStore` if the store cannot be read. A missing blob is `Ok(None)`.
    async fn fetch(&self, uri: &str) -> Result<Option<Blob>>;

    /// Stores a blob and returns the canonical URI it can be fetched from.
    ///
    /// # Errors
    /// Returns `BlobStore` if the store cannot be written.
    async fn store(&self, blob: Blob) -> Result<String>;
}

/// What to do when no resolver knows a media URI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingMediaPolicy {
    /// Fail the conversion with `MediaResolutionFailed`.
    #[default]
    Fail,
    /// Store an empty placeholder blob and reference it.
    EmptyBlob,
}

/// In-process [`BlobStore`] backed by a hash map.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Blob>>,
    path_prefix: Option<String>,
}

impl InMemoryBlobStore {
    /// Creates an empty store that keeps blob paths as they are.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that re-roots every stored path under `prefix`.
    ///
    /// The URI scheme of the incoming path is dropped, so with the prefix
    /// `canonical://store/` the path `resolve://host/a.png` is stored as
    /// `canonical://store/host/a.png`.
    pub fn with_path_prefix<S: Into<String>>(prefix: S) -> Self {
        Self { blobs: RwLock::default(), path_prefix: Some(prefix.into()) }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|blobs| blobs.len()).unwrap_or_default()
    }

    /// Returns `true` if the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn canonical_uri(&self, blob: &Blob) -> String {
        match (&blob.path, &self.path_prefix) {
            (Some(path), Some(prefix)) => {
                let without_scheme = path.split_once("://").map_or(path.as_str(), |(_, rest)| rest);
                format!("{prefix}{without_scheme}")
            }
            (Some(path), None) => path.clone(),
            (None, prefix) => {
                let root = prefix.as_deref().unwrap_or("memory://");
                format!("{root}sha256/{}", blob.sha256_hex())
            }
        }
    }
}

fn poisoned<T>(_: T) -> GoogleError {
    GoogleError::BlobStore("blob store lock poisoned".to_string())
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn fetch(&self, uri: &str) -> Result<Option<Blob>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs.get(uri).cloned())
    }

    async fn store(&self, mut blob: Blob) -> Result<String> {
        let uri = self.canonical_uri(&blob);
        blob.path = Some(uri.clone());
        self.blobs.write().map_err(poisoned)?.insert(uri.clone(), blob);
        Ok(uri)
    }
}

/// Resolves `media` content parts to canonical, provider-readable URIs.
#[derive(Clone)]
pub struct MediaManager {
    store: Arc<dyn BlobStore>,
    resolvers: Vec<Arc<dyn BlobStore>>,
    missing_policy: MissingMediaPolicy,
}

impl std::fmt::Debug for MediaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaManager")
            .field("resolvers", &self.resolvers.len())
            .field("missing_policy", &self.missing_policy)
            .finish_non_exhaustive()
    }
}

impl MediaManager {
    /// Creates a manager that copies resolved media into `store`.
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store, resolvers: Vec::new(), missing_policy: MissingMediaPolicy::default() }
    }

    /// Adds a resolver. Resolvers are consulted in insertion order.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn BlobStore>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    /// Sets what happens when no resolver knows a URI.
    #[must_use]
    pub fn with_missing_policy(mut self, policy: MissingMediaPolicy) -> Self {
        self.missing_policy = policy;
        self
    }

    /// Resolves every media part of `content`, keeping part order.
    ///
    /// # Errors
    /// Returns the first resolution error; no partial result is produced.
    pub async fn resolve_content(&self, content: &MessageContent) -> Result<MessageContent> {
        match content {
            MessageContent::Text(_) => Ok(content.clone()),
            MessageContent::Parts(parts) => {
                let resolved = try_join_all(parts.iter().map(|part| self.resolve_part(part))).await?;
                Ok(MessageContent::Parts(resolved))
            }
        }
    }

    /// Resolves a single content part. Parts other than URI-only media are returned as is.
    ///
    /// # Errors
    /// Returns `MediaResolutionFailed` when the URI is unknown and the policy is `Fail`,
    /// or a `BlobStore` error from any store involved.
    pub async fn resolve_part(&self, part: &ContentPart) -> Result<ContentPart> {
        let uri = match part {
            ContentPart::Media { file_uri: Some(uri), data: None, .. } => uri,
            _ => return Ok(part.clone()),
        };

        let blob = match self.fetch_from_resolvers(uri).await? {
            Some(blob) => blob,
            None => match self.missing_policy {
                MissingMediaPolicy::Fail => {
                    return Err(GoogleError::MediaResolutionFailed {
                        uri: uri.clone(),
                        reason: "no resolver has this media".to_string(),
                    });
                }
                MissingMediaPolicy::EmptyBlob => Blob::empty(uri.clone()),
            },
        };

        let mime_type = blob.mime_type.clone();
        let canonical = self.store.store(blob).await?;
        debug!(uri = %uri, canonical = %canonical, mime_type = %mime_type, "Resolved media");

        Ok(ContentPart::Media { file_uri: Some(canonical), mime_type: Some(mime_type), data: None })
    }

    async fn fetch_from_resolvers(&self, uri: &str) -> Result<Option<Blob>> {
        for resolver in &self.resolvers {
            if let Some(mut blob) = resolver.fetch(uri).await? {
                blob.path.get_or_insert_with(|| uri.to_string());
                return Ok(Some(blob));
            }
        }
        Ok(None)
    }
}
