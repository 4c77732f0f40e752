//! Durable cache under `<storage_root>/<cache_directory>`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{ByteReader, FileSystemAccess};
use core_runtime::events::CacheState;
use core_runtime::logging::strip_path;
use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::source::copy_chunked;
use super::strategy::{spawn_progress_events, CacheLifecycle};
use super::{CacheConfig, CacheSource, CacheStats, CachedMedia, CacheStrategy};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::model::{MediaItem, MediaItemId};

/// Suffix for artifacts still being written.
pub(crate) const PARTIAL_SUFFIX: &str = "part";

pub(crate) fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    target.with_file_name(name)
}

/// Best-effort removal of a partial artifact.
pub(crate) async fn discard_partial(fs: &dyn FileSystemAccess, part: &Path) {
    match fs.exists(part).await {
        Ok(true) => {
            if let Err(e) = fs.delete_file(part).await {
                warn!(path = ?part, error = %e, "Failed to delete partial artifact");
            }
        }
        Ok(false) => {}
        Err(e) => warn!(path = ?part, error = %e, "Failed to inspect partial artifact"),
    }
}

/// Cache strategy that stores artifacts through [`FileSystemAccess`].
#[derive(Clone)]
pub struct FileCacheStrategy {
    inner: Arc<FileInner>,
}

struct FileInner {
    config: CacheConfig,
    root: PathBuf,
    lifecycle: CacheLifecycle<PathBuf>,
    entries: RwLock<HashMap<MediaItemId, PathBuf>>,
}

impl FileCacheStrategy {
    /// # Errors
    ///
    /// [`MediaError::Validation`] when the configuration is invalid, e.g. an
    /// unset cache directory.
    pub fn new(ctx: MediaContext, config: CacheConfig) -> Result<Self> {
        config.validate().map_err(MediaError::Validation)?;
        let root = ctx.storage_root().join(&config.cache_directory);
        debug!(root = ?root, "File cache strategy created");

        Ok(Self {
            inner: Arc::new(FileInner {
                config,
                root,
                lifecycle: CacheLifecycle::new(ctx),
                entries: RwLock::new(HashMap::new()),
            }),
        })
    }

    /// Directory holding the artifacts.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Where an artifact named `cache_name` lives.
    pub fn artifact_path(&self, cache_name: &str) -> PathBuf {
        self.inner.root.join(cache_name)
    }
}

impl FileInner {
    fn fs(&self) -> &Arc<dyn FileSystemAccess> {
        self.lifecycle.ctx().fs()
    }

    async fn copy_into(
        self: Arc<Self>,
        item: MediaItem,
        source: CacheSource,
        target: PathBuf,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let fs = Arc::clone(self.fs());
        fs.create_dir_all(&self.root).await?;

        let (mut reader, total) = source.open(fs.as_ref()).await?;
        let part = partial_path(&target);

        let stop = CancellationToken::new();
        let _stop_sampler = stop.clone().drop_guard();
        let sampler = spawn_progress_events(
            self.lifecycle.ctx(),
            &item,
            self.config.progress_interval,
            total.is_some(),
            stop.clone(),
        );

        let copied = async {
            let mut writer = fs.open_write_stream(&part).await?;
            copy_chunked(
                &mut reader,
                total,
                &mut writer,
                self.config.chunk_size,
                item.cache_progress(),
                &cancel,
            )
            .await
        }
        .await;

        let result = match copied {
            Ok(bytes) => fs.rename(&part, &target).await.map(|_| bytes).map_err(MediaError::from),
            Err(e) => Err(e),
        };

        stop.cancel();
        let _ = sampler.await;

        match result {
            Ok(bytes) => {
                let name = target.to_string_lossy();
                info!(bytes, artifact = strip_path(&name), "Cached item");
                Ok(target)
            }
            Err(err) => {
                discard_partial(fs.as_ref(), &part).await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl CacheStrategy for FileCacheStrategy {
    fn name(&self) -> &str {
        "file"
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

        let target = self.artifact_path(cache_name);
        if self.inner.fs().exists(&target).await? {
            info!(cache_name, "Reusing existing cache artifact");
            self.inner.entries.write().insert(item.id(), target);
            self.inner.lifecycle.adopt(item);
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        let leader_item = item.clone();
        let op_cancel = cancel.clone();
        let start = move || {
            inner
                .copy_into(leader_item, source, target, op_cancel)
                .boxed()
        };

        self.inner
            .lifecycle
            .run(item, cache_name, cancel, start, |path: &PathBuf| {
                self.inner.entries.write().insert(item.id(), path.clone());
            })
            .await
    }

    #[instrument(skip(self, item), fields(item = %item.id()))]
    async fn remove(&self, item: &MediaItem) -> Result<()> {
        let removed = self.inner.entries.write().remove(&item.id());
        let Some(path) = removed else {
            debug!("Item has no cache mapping");
            return Ok(());
        };

        let still_referenced = self.inner.entries.read().values().any(|p| *p == path);
        if !still_referenced && self.inner.fs().exists(&path).await? {
            self.inner.fs().delete_file(&path).await?;
        }

        self.inner.lifecycle.set_state(item, CacheState::NotCached);
        info!(path = ?path, "Removed cached item");
        Ok(())
    }

    async fn cached_path(&self, item: &MediaItem) -> Result<Option<PathBuf>> {
        if item.cache_state() != CacheState::Cached {
            return Ok(None);
        }

        let mapped = self.inner.entries.read().get(&item.id()).cloned();
        let Some(path) = mapped else {
            self.inner.lifecycle.invalidate(item, "no mapping");
            return Ok(None);
        };

        if self.inner.fs().exists(&path).await? {
            Ok(Some(path))
        } else {
            self.inner.entries.write().remove(&item.id());
            self.inner.lifecycle.invalidate(item, "artifact deleted");
            Ok(None)
        }
    }

    async fn cached_stream(&self, item: &MediaItem) -> Result<Option<ByteReader>> {
        match self.cached_path(item).await? {
            Some(path) => Ok(Some(self.inner.fs().open_read_stream(&path).await?)),
            None => Ok(None),
        }
    }

    async fn cached_media(&self, item: &MediaItem) -> Result<Option<CachedMedia>> {
        Ok(self.cached_path(item).await?.map(CachedMedia::File))
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let paths: HashSet<PathBuf> = self.inner.entries.write().drain().map(|(_, p)| p).collect();

        for path in &paths {
            match self.inner.fs().exists(path).await {
                Ok(true) => {
                    if let Err(e) = self.inner.fs().delete_file(path).await {
                        warn!(path = ?path, error = %e, "Failed to delete cache artifact");
                    }
                }
                Ok(false) => {}
                Err(e) => warn!(path = ?path, error = %e, "Failed to inspect cache artifact"),
            }
        }

        info!(artifacts = paths.len(), "Cache cleared");
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let (entries, paths) = {
            let entries = self.inner.entries.read();
            let paths: HashSet<PathBuf> = entries.values().cloned().collect();
            (entries.len(), paths)
        };

        let mut stats = CacheStats::now();
        stats.entries = entries;
        stats.artifacts = paths.len();
        for path in &paths {
            if let Ok(meta) = self.inner.fs().metadata(path).await {
                stats.total_bytes += meta.size;
            }
        }
        stats.in_flight = self.inner.lifecycle.in_flight().await;
        Ok(stats)
    }
}
