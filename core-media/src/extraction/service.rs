//! Extraction front end: naming, state, dedup and artifact placement around
//! the [`ExtractionPipeline`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bridge_traits::{FileSystemAccess, MediaToolkit, OutputMode, OutputSpec, StreamKind};
use core_runtime::events::{CoreEvent, ExtractState, ExtractionEvent};
use core_runtime::logging::strip_path;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::config::ExtractionConfig;
use super::pipeline::ExtractionPipeline;
use crate::cache::file::{discard_partial, partial_path};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::inflight::{InFlight, Role};
use crate::model::{MediaItem, MediaItemId, MediaStream, StreamId};
use crate::naming;

type ExtractionKey = (MediaItemId, StreamId);

/// Extracts embedded streams for engines that cannot select them.
///
/// Audio is transcoded into a linear container; video and subtitle streams
/// are remuxed into the source's own container.
#[derive(Clone)]
pub struct StreamExtractor {
    inner: Arc<ExtractorInner>,
}

struct ExtractorInner {
    toolkit: Arc<dyn MediaToolkit>,
    ctx: MediaContext,
    config: ExtractionConfig,
    root: PathBuf,
    inflight: Arc<InFlight<ExtractionKey, PathBuf>>,
}

impl StreamExtractor {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        ctx: MediaContext,
        config: ExtractionConfig,
    ) -> Result<Self> {
        config.validate().map_err(MediaError::Validation)?;
        let root = ctx.storage_root().join(&config.output_directory);

        Ok(Self {
            inner: Arc::new(ExtractorInner {
                toolkit,
                ctx,
                config,
                root,
                inflight: InFlight::new(),
            }),
        })
    }

    pub fn output_directory(&self) -> &Path {
        &self.inner.root
    }

    /// Directory holding `item`'s artifacts, one per owner.
    pub fn artifact_directory(&self, item: &MediaItem) -> PathBuf {
        self.inner.artifact_directory(item)
    }

    /// Extract `stream_id` of `item`, reading the container at `source`.
    ///
    /// Already extracted streams return their artifact without work. A call
    /// made while the same stream is extracting waits for and returns that
    /// run's result. Cancelling a waiting caller only stops the wait.
    #[instrument(skip(self, item, source, cancel), fields(item = %item.id(), stream = %stream_id))]
    pub async fn extract(
        &self,
        item: &MediaItem,
        stream_id: StreamId,
        source: &Path,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        if source.as_os_str().is_empty() {
            return Err(MediaError::Validation("extraction source path is empty".into()));
        }
        let stream = lookup(item, stream_id)?;

        if let Some(path) = self.validated_path(item, stream).await? {
            debug!("Stream already extracted");
            return Ok(path);
        }

        let inner = Arc::clone(&self.inner);
        let leader_item = item.clone();
        let source = source.to_path_buf();
        let op_cancel = cancel.clone();
        let (role, op) = self
            .inner
            .inflight
            .join_or_start((item.id(), stream_id), || {
                stream.begin_extract();
                inner.emit_state(item, stream_id, ExtractState::Extracting);
                inner
                    .run(leader_item, stream_id, source, op_cancel)
                    .boxed()
            })
            .await;

        match role {
            Role::Leader => op.await,
            Role::Follower => {
                debug!("Joining in-flight extraction");
                tokio::select! {
                    result = op => result,
                    _ = cancel.cancelled() => Err(MediaError::Cancelled),
                }
            }
        }
    }

    /// Delete the artifact and return the stream to `NotExtracted`.
    ///
    /// # Errors
    ///
    /// [`MediaError::State`] while the stream is extracting.
    pub async fn remove(&self, item: &MediaItem, stream_id: StreamId) -> Result<()> {
        let stream = lookup(item, stream_id)?;
        if self.inner.inflight.contains(&(item.id(), stream_id)).await {
            return Err(MediaError::State(format!(
                "stream {stream_id} is still extracting"
            )));
        }

        let Some(path) = stream.reset_extract() else {
            return Ok(());
        };

        let fs = self.inner.ctx.fs();
        if fs.exists(&path).await? {
            fs.delete_file(&path).await?;
        }
        self.inner.emit_state(item, stream_id, ExtractState::NotExtracted);
        info!(stream = %stream_id, path = ?path, "Removed extracted stream");
        Ok(())
    }

    /// Artifact path while extracted, re-validated against the filesystem.
    pub async fn extracted_path(
        &self,
        item: &MediaItem,
        stream_id: StreamId,
    ) -> Result<Option<PathBuf>> {
        let stream = lookup(item, stream_id)?;
        self.validated_path(item, stream).await
    }

    /// Extractions currently running.
    pub async fn active_extractions(&self) -> usize {
        self.inner.inflight.len().await
    }

    async fn validated_path(
        &self,
        item: &MediaItem,
        stream: &MediaStream,
    ) -> Result<Option<PathBuf>> {
        let Some(path) = stream.extracted_path() else {
            return Ok(None);
        };

        if self.inner.ctx.fs().exists(&path).await? {
            Ok(Some(path))
        } else {
            warn!(stream = %stream.id(), "Extracted artifact is gone, demoting stream");
            stream.reset_extract();
            self.inner
                .emit_state(item, stream.id(), ExtractState::NotExtracted);
            Ok(None)
        }
    }
}

fn lookup(item: &MediaItem, stream_id: StreamId) -> Result<&MediaStream> {
    item.stream(stream_id)
        .ok_or_else(|| MediaError::Validation(format!("item has no stream {stream_id}")))
}

impl ExtractorInner {
    fn artifact_directory(&self, item: &MediaItem) -> PathBuf {
        self.root.join(naming::extraction_dir_name(item))
    }

    fn emit_state(&self, item: &MediaItem, stream: StreamId, state: ExtractState) {
        self.ctx.emit(CoreEvent::Extraction(ExtractionEvent::StateChanged {
            item_id: item.id().to_string(),
            stream: stream.to_string(),
            state,
        }));
    }

    async fn run(
        self: Arc<Self>,
        item: MediaItem,
        stream_id: StreamId,
        source: PathBuf,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let result = self.extract_to_artifact(&item, stream_id, &source, &cancel).await;

        if let Some(stream) = item.stream(stream_id) {
            match &result {
                Ok(path) => {
                    stream.finish_extract(path.clone());
                    self.emit_state(&item, stream_id, ExtractState::Extracted);
                }
                Err(err) => {
                    stream.reset_extract();
                    self.emit_state(&item, stream_id, ExtractState::NotExtracted);
                    if err.is_cancelled() {
                        debug!(stream = %stream_id, "Extraction cancelled");
                    } else {
                        warn!(stream = %stream_id, error = %err, "Extraction failed");
                    }
                }
            }
        }

        result
    }

    async fn extract_to_artifact(
        &self,
        item: &MediaItem,
        stream_id: StreamId,
        source: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let fs: &dyn FileSystemAccess = self.ctx.fs().as_ref();
        let dir = self.artifact_directory(item);
        fs.create_dir_all(&dir).await?;

        let reader = self.toolkit.open_input(source).await?;
        let info = reader.info().clone();
        let stream_info = info
            .stream(stream_id.index)
            .cloned()
            .ok_or_else(|| {
                MediaError::Validation(format!(
                    "source has no stream at index {}",
                    stream_id.index
                ))
            })?;
        if stream_info.kind != stream_id.kind {
            return Err(MediaError::Validation(format!(
                "stream {} is {}, not {}",
                stream_id.index, stream_info.kind, stream_id.kind
            )));
        }

        let (container, mode) = match stream_id.kind {
            StreamKind::Audio => (
                self.config.audio_container.clone(),
                OutputMode::Transcode {
                    codec: self.config.audio_codec.clone(),
                },
            ),
            StreamKind::Video | StreamKind::Subtitle => (info.format.clone(), OutputMode::Remux),
        };

        let target = dir.join(naming::extraction_file_name(item, stream_id, &container));
        let part = partial_path(&target);

        let writer = self
            .toolkit
            .open_output(
                &part,
                OutputSpec {
                    container,
                    stream: stream_info,
                    mode: mode.clone(),
                },
            )
            .await?;

        let progress = item
            .stream(stream_id)
            .map(|s| s.progress().clone())
            .unwrap_or_default();
        let ctx = self.ctx.clone();
        let item_id = item.id().to_string();
        let stream_name = stream_id.to_string();
        let on_progress = move |value: f64| {
            ctx.emit(CoreEvent::Extraction(ExtractionEvent::Progress {
                item_id: item_id.clone(),
                stream: stream_name.clone(),
                progress: value,
            }))
        };

        let pipeline = ExtractionPipeline::from_config(&self.config);
        let outcome = pipeline
            .run(reader, writer, stream_id.index, &mode, progress, cancel, on_progress)
            .await;

        let outcome = match outcome {
            Ok(stats) => fs.rename(&part, &target).await.map(|_| stats).map_err(MediaError::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(stats) => {
                let name = target.to_string_lossy();
                info!(
                    artifact = strip_path(&name),
                    units = stats.units_written,
                    "Stream extracted"
                );
                Ok(target)
            }
            Err(err) => {
                discard_partial(fs, &part).await;
                Err(err)
            }
        }
    }
}
