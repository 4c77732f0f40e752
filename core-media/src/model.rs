//! Media items and their embedded streams.
//!
//! A [`MediaItem`] is a cheap, cloneable handle. Its lifecycle fields
//! (cache state, extraction state, progress) are only written from inside this
//! crate: cache strategies own `CacheState`, the extractor owns
//! `ExtractState`, and channels report playback metadata.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{MediaKind, StreamKind};
use core_runtime::events::{CacheState, ExtractState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MediaError, Result};
use crate::naming::sanitize_component;
use crate::progress::Progress;

/// Process-unique identity of a [`MediaItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaItemId(Uuid);

impl MediaItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MediaItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MediaItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies one embedded stream within its item, e.g. `audio1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub kind: StreamKind,
    /// Container stream index
    pub index: usize,
}

impl StreamId {
    pub fn new(kind: StreamKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExtractStatus {
    NotExtracted,
    Extracting,
    Extracted(PathBuf),
}

/// An elementary stream embedded in a media item.
#[derive(Debug)]
pub struct MediaStream {
    id: StreamId,
    codec: Option<String>,
    status: RwLock<ExtractStatus>,
    progress: Progress,
}

impl MediaStream {
    fn new(id: StreamId, codec: Option<String>) -> Self {
        Self {
            id,
            codec,
            status: RwLock::new(ExtractStatus::NotExtracted),
            progress: Progress::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    pub fn extract_state(&self) -> ExtractState {
        match &*self.status.read() {
            ExtractStatus::NotExtracted => ExtractState::NotExtracted,
            ExtractStatus::Extracting => ExtractState::Extracting,
            ExtractStatus::Extracted(_) => ExtractState::Extracted,
        }
    }

    /// Artifact path, present only while the stream is extracted.
    pub fn extracted_path(&self) -> Option<PathBuf> {
        match &*self.status.read() {
            ExtractStatus::Extracted(path) => Some(path.clone()),
            _ => None,
        }
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    pub(crate) fn begin_extract(&self) {
        *self.status.write() = ExtractStatus::Extracting;
        self.progress.reset();
    }

    pub(crate) fn finish_extract(&self, path: PathBuf) {
        *self.status.write() = ExtractStatus::Extracted(path);
    }

    /// Back to `NotExtracted`. Returns the previous artifact path, if any.
    pub(crate) fn reset_extract(&self) -> Option<PathBuf> {
        match std::mem::replace(&mut *self.status.write(), ExtractStatus::NotExtracted) {
            ExtractStatus::Extracted(path) => Some(path),
            _ => None,
        }
    }
}

struct ItemInner {
    id: MediaItemId,
    owner_id: String,
    source: PathBuf,
    title: String,
    kind: MediaKind,
    cache_state: RwLock<CacheState>,
    cache_progress: Progress,
    streams: Vec<MediaStream>,
    metadata: RwLock<HashMap<String, String>>,
}

/// A playable unit. Cloning yields another handle to the same item.
#[derive(Clone)]
pub struct MediaItem {
    inner: Arc<ItemInner>,
}

impl MediaItem {
    pub fn builder(owner_id: impl Into<String>, source: impl Into<PathBuf>) -> MediaItemBuilder {
        MediaItemBuilder {
            owner_id: owner_id.into(),
            source: source.into(),
            title: None,
            kind: MediaKind::Generic,
            streams: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn id(&self) -> MediaItemId {
        self.inner.id
    }

    pub fn owner_id(&self) -> &str {
        &self.inner.owner_id
    }

    pub fn source_path(&self) -> &Path {
        &self.inner.source
    }

    pub fn title(&self) -> &str {
        &self.inner.title
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    /// File stem of the source path, sanitized for use in artifact names.
    pub fn path_title(&self) -> String {
        let stem = self
            .inner
            .source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        sanitize_component(&stem)
    }

    pub fn cache_state(&self) -> CacheState {
        *self.inner.cache_state.read()
    }

    pub fn is_cached(&self) -> bool {
        self.cache_state() == CacheState::Cached
    }

    pub fn cache_progress(&self) -> &Progress {
        &self.inner.cache_progress
    }

    pub fn streams(&self) -> &[MediaStream] {
        &self.inner.streams
    }

    pub fn stream(&self, id: StreamId) -> Option<&MediaStream> {
        self.inner.streams.iter().find(|s| s.id == id)
    }

    pub fn metadata(&self, key: &str) -> Option<String> {
        self.inner.metadata.read().get(key).cloned()
    }

    pub fn metadata_snapshot(&self) -> HashMap<String, String> {
        self.inner.metadata.read().clone()
    }

    /// Returns `true` when the state actually changed.
    pub(crate) fn set_cache_state(&self, state: CacheState) -> bool {
        let mut current = self.inner.cache_state.write();
        if *current == state {
            return false;
        }
        *current = state;
        true
    }

    pub(crate) fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.metadata.write().insert(key.into(), value.into());
    }
}

impl PartialEq for MediaItem {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaItem {}

impl fmt::Debug for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaItem")
            .field("id", &self.inner.id)
            .field("owner_id", &self.inner.owner_id)
            .field("title", &self.inner.title)
            .field("kind", &self.inner.kind)
            .field("cache_state", &self.cache_state())
            .field("streams", &self.inner.streams.len())
            .finish()
    }
}

/// Builder returned by [`MediaItem::builder`].
#[derive(Debug)]
pub struct MediaItemBuilder {
    owner_id: String,
    source: PathBuf,
    title: Option<String>,
    kind: MediaKind,
    streams: Vec<(StreamId, Option<String>)>,
    metadata: HashMap<String, String>,
}

impl MediaItemBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn stream(mut self, kind: StreamKind, index: usize) -> Self {
        self.streams.push((StreamId::new(kind, index), None));
        self
    }

    pub fn stream_with_codec(
        mut self,
        kind: StreamKind,
        index: usize,
        codec: impl Into<String>,
    ) -> Self {
        self.streams
            .push((StreamId::new(kind, index), Some(codec.into())));
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// # Errors
    ///
    /// [`MediaError::Validation`] for an empty owner id or source path, or a
    /// stream id listed twice.
    pub fn build(self) -> Result<MediaItem> {
        if self.owner_id.trim().is_empty() {
            return Err(MediaError::Validation("owner id cannot be empty".into()));
        }
        if self.source.as_os_str().is_empty() {
            return Err(MediaError::Validation("source path cannot be empty".into()));
        }

        let mut streams: Vec<MediaStream> = Vec::with_capacity(self.streams.len());
        for (id, codec) in self.streams {
            if streams.iter().any(|s| s.id == id) {
                return Err(MediaError::Validation(format!("duplicate stream {id}")));
            }
            streams.push(MediaStream::new(id, codec));
        }
        // Video first, then audio, then subtitles; index order within a kind.
        streams.sort_by_key(|s| (s.id.kind as u8, s.id.index));

        let title = self.title.unwrap_or_else(|| {
            self.source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        Ok(MediaItem {
            inner: Arc::new(ItemInner {
                id: MediaItemId::new(),
                owner_id: self.owner_id,
                source: self.source,
                title,
                kind: self.kind,
                cache_state: RwLock::new(CacheState::NotCached),
                cache_progress: Progress::new(),
                streams,
                metadata: RwLock::new(self.metadata),
            }),
        })
    }
}
