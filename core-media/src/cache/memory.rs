//! In-memory cache for hosts without writable storage or for short-lived
//! sound effects.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::ByteReader;
use bytes::Bytes;
use core_runtime::events::CacheState;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::source::copy_chunked;
use super::strategy::{spawn_progress_events, CacheLifecycle};
use super::{CacheConfig, CacheSource, CacheStats, CachedMedia, CacheStrategy};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::model::{MediaItem, MediaItemId};

/// Upper bound, in chunks, on the buffer reserved from an advertised length.
/// Larger sources grow the buffer as bytes actually arrive.
const MAX_PREALLOC_CHUNKS: usize = 64;

/// Cache strategy holding artifacts as shared [`Bytes`] keyed by cache name.
///
/// `cached_path` is always `None`; engines receive the bytes directly.
#[derive(Clone)]
pub struct MemoryCacheStrategy {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    config: CacheConfig,
    lifecycle: CacheLifecycle<Bytes>,
    blobs: RwLock<HashMap<String, Bytes>>,
    entries: RwLock<HashMap<MediaItemId, String>>,
}

impl MemoryCacheStrategy {
    pub fn new(ctx: MediaContext, config: CacheConfig) -> Result<Self> {
        config.validate().map_err(MediaError::Validation)?;
        Ok(Self {
            inner: Arc::new(MemoryInner {
                config,
                lifecycle: CacheLifecycle::new(ctx),
                blobs: RwLock::new(HashMap::new()),
                entries: RwLock::new(HashMap::new()),
            }),
        })
    }

    fn cached_bytes(&self, item: &MediaItem) -> Option<Bytes> {
        if item.cache_state() != CacheState::Cached {
            return None;
        }

        let name = self.inner.entries.read().get(&item.id()).cloned();
        let blob = name
            .as_ref()
            .and_then(|n| self.inner.blobs.read().get(n).cloned());

        if blob.is_none() {
            self.inner.entries.write().remove(&item.id());
            self.inner.lifecycle.invalidate(item, "blob evicted");
        }
        blob
    }
}

impl MemoryInner {
    async fn copy_into(
        self: Arc<Self>,
        item: MediaItem,
        source: CacheSource,
        cancel: CancellationToken,
    ) -> Result<Bytes> {
        let ctx = self.lifecycle.ctx();
        let (mut reader, total) = source.open(ctx.fs().as_ref()).await?;

        let stop = CancellationToken::new();
        let _stop_sampler = stop.clone().drop_guard();
        let sampler = spawn_progress_events(
            ctx,
            &item,
            self.config.progress_interval,
            total.is_some(),
            stop.clone(),
        );

        let mut buffer: Vec<u8> = Vec::with_capacity(prealloc_len(total, self.config.chunk_size));
        let copied = copy_chunked(
            &mut reader,
            total,
            &mut buffer,
            self.config.chunk_size,
            item.cache_progress(),
            &cancel,
        )
        .await;

        stop.cancel();
        let _ = sampler.await;

        let bytes = copied?;
        debug!(bytes, "Buffered item in memory");
        Ok(Bytes::from(buffer))
    }
}

/// Bytes to reserve for a source advertising `total` bytes. The advertised
/// length is only a hint and is never trusted for the full reservation.
fn prealloc_len(total: Option<u64>, chunk_size: usize) -> usize {
    let cap = chunk_size.max(1).saturating_mul(MAX_PREALLOC_CHUNKS);
    total
        .map(|t| usize::try_from(t).unwrap_or(usize::MAX))
        .unwrap_or(0)
        .min(cap)
}

#[async_trait]
impl CacheStrategy for MemoryCacheStrategy {
    fn name(&self) -> &str {
        "memory"
    }

    #[instrument(skip(self, item, source, cancel), fields(item = %item.id()))]
    async fn cache(
        &self,
        item: &MediaItem,
        source: CacheSource,
        cache_name: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        if cache_name.trim().is_empty() {
            return Err(MediaError::Validation("cache name cannot be empty".into()));
        }
        if let Err(err) = source.validate() {
            self.inner.lifecycle.set_state(item, CacheState::Failed);
            return Err(err);
        }

        if self.inner.blobs.read().contains_key(cache_name) {
            info!(cache_name, "Reusing existing in-memory artifact");
            self.inner
                .entries
                .write()
                .insert(item.id(), cache_name.to_string());
            self.inner.lifecycle.adopt(item);
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let leader_item = item.clone();
        let op_cancel = cancel.clone();
        let start = move || inner.copy_into(leader_item, source, op_cancel).boxed();

        self.inner
            .lifecycle
            .run(item, cache_name, cancel, start, |bytes: &Bytes| {
                self.inner
                    .blobs
                    .write()
                    .insert(cache_name.to_string(), bytes.clone());
                self.inner
                    .entries
                    .write()
                    .insert(item.id(), cache_name.to_string());
            })
            .await
    }

    async fn remove(&self, item: &MediaItem) -> Result<()> {
        let Some(name) = self.inner.entries.write().remove(&item.id()) else {
            return Ok(());
        };

        let still_referenced = self.inner.entries.read().values().any(|n| *n == name);
        if !still_referenced {
            self.inner.blobs.write().remove(&name);
        }

        self.inner.lifecycle.set_state(item, CacheState::NotCached);
        debug!(cache_name = %name, "Removed in-memory artifact");
        Ok(())
    }

    async fn cached_path(&self, _item: &MediaItem) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    async fn cached_stream(&self, item: &MediaItem) -> Result<Option<ByteReader>> {
        Ok(self
            .cached_bytes(item)
            .map(|bytes| Box::new(Cursor::new(bytes)) as ByteReader))
    }

    async fn cached_media(&self, item: &MediaItem) -> Result<Option<CachedMedia>> {
        Ok(self.cached_bytes(item).map(CachedMedia::Memory))
    }

    async fn clear(&self) -> Result<()> {
        self.inner.entries.write().clear();
        let dropped = {
            let mut blobs = self.inner.blobs.write();
            let n = blobs.len();
            blobs.clear();
            n
        };
        info!(artifacts = dropped, "Memory cache cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::now();
        stats.entries = self.inner.entries.read().len();
        {
            let blobs = self.inner.blobs.read();
            stats.artifacts = blobs.len();
            stats.total_bytes = blobs.values().map(|b| b.len() as u64).sum();
        }
        stats.in_flight = self.inner.lifecycle.in_flight().await;
        Ok(stats)
    }
}
