//! # Backend Service
//!
//! Factory and registry for the channels of one engine.
//!
//! Channel creation is gated on the item's cache state: only `Cached` items
//! are opened, unless the engine reads sources directly. Items are never
//! opened speculatively, so a rejected request allocates nothing native.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridge_traits::{
    AudioDevice, EngineCapabilities, MediaSource, OpenRequest, PlaybackEngine,
};
use core_runtime::events::{BackendEvent, CacheState, CoreEvent};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::registry::EngineRegistry;
use super::retry::with_init_retry;
use crate::cache::{CacheStrategy, CachedMedia};
use crate::channel::{ChannelConfig, ChannelId, MediaChannel};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::extraction::StreamExtractor;
use crate::model::{MediaItem, StreamId};

pub struct BackendService {
    engine: Arc<dyn PlaybackEngine>,
    name: String,
    capabilities: EngineCapabilities,
    ctx: MediaContext,
    cache: Arc<dyn CacheStrategy>,
    extractor: Option<StreamExtractor>,
    channel_config: ChannelConfig,
    channels: RwLock<HashMap<ChannelId, MediaChannel>>,
    current_device: RwLock<Option<String>>,
}

impl BackendService {
    /// Select `engine_name` from `registry` (initializing it if needed) and
    /// build a service around it.
    #[instrument(skip(registry, ctx, cache))]
    pub async fn new(
        registry: &EngineRegistry,
        engine_name: &str,
        ctx: MediaContext,
        cache: Arc<dyn CacheStrategy>,
    ) -> Result<Self> {
        let engine = registry.select(engine_name).await?;
        Ok(Self::with_engine(engine, ctx, cache))
    }

    /// Wrap an engine the caller has already initialized.
    pub fn with_engine(
        engine: Arc<dyn PlaybackEngine>,
        ctx: MediaContext,
        cache: Arc<dyn CacheStrategy>,
    ) -> Self {
        let name = engine.name().to_string();
        let capabilities = engine.capabilities();
        ctx.emit(CoreEvent::Backend(BackendEvent::Initialized {
            backend: name.clone(),
        }));
        info!(backend = %name, ?capabilities, "Backend ready");

        Self {
            engine,
            name,
            capabilities,
            ctx,
            cache,
            extractor: None,
            channel_config: ChannelConfig::default(),
            channels: RwLock::new(HashMap::new()),
            current_device: RwLock::new(None),
        }
    }

    /// Extractor used by [`create_stream_channel`](Self::create_stream_channel)
    /// when the engine cannot select streams itself.
    pub fn with_extractor(mut self, extractor: StreamExtractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_channel_config(mut self, config: ChannelConfig) -> Self {
        self.channel_config = config;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }

    pub fn cache(&self) -> &Arc<dyn CacheStrategy> {
        &self.cache
    }

    // ------------------------------------------------------------------
    // Channels
    // ------------------------------------------------------------------

    /// Open a channel for `item`.
    ///
    /// # Errors
    ///
    /// [`MediaError::State`] when the item is not `Cached` (and the engine
    /// cannot read sources directly), or its artifact has disappeared.
    #[instrument(skip(self, item), fields(backend = %self.name, item = %item.id()))]
    pub async fn create_channel(&self, item: &MediaItem) -> Result<MediaChannel> {
        let source = self.playable_source(item).await?;
        self.open_channel(item, source).await
    }

    /// Open a channel playing one embedded stream of `item`.
    ///
    /// Engines with stream selection open the item and select the stream.
    /// Other engines play an extracted artifact, extracting first when
    /// needed.
    #[instrument(skip(self, item, cancel), fields(backend = %self.name, item = %item.id(), stream = %stream_id))]
    pub async fn create_stream_channel(
        &self,
        item: &MediaItem,
        stream_id: StreamId,
        cancel: CancellationToken,
    ) -> Result<MediaChannel> {
        if item.stream(stream_id).is_none() {
            return Err(MediaError::Validation(format!(
                "item has no stream {stream_id}"
            )));
        }

        if self.capabilities.stream_selection {
            let channel = self.create_channel(item).await?;
            let selected = match channel.stream_selection() {
                Some(selection) => selection.select(stream_id.kind, stream_id.index).await,
                None => Err(MediaError::engine(format!(
                    "{} advertises stream selection but the channel has none",
                    self.name
                ))),
            };
            if let Err(err) = selected {
                self.destroy_channel(channel.id()).await;
                return Err(err);
            }
            return Ok(channel);
        }

        let extractor = self.extractor.as_ref().ok_or_else(|| {
            MediaError::Validation(format!(
                "{} cannot select streams and no extraction toolkit is configured",
                self.name
            ))
        })?;

        let container = match self.cache.cached_path(item).await? {
            Some(path) => path,
            None if self.capabilities.direct_read => item.source_path().to_path_buf(),
            None => return Err(not_cached(item)),
        };

        let artifact = extractor.extract(item, stream_id, &container, cancel).await?;
        self.open_channel(item, MediaSource::File(artifact)).await
    }

    /// Destroy a channel and drop it from the registry. Returns `false` when
    /// the id is unknown, e.g. on a second call, or when the channel was
    /// already destroyed through its own handle.
    #[instrument(skip(self), fields(backend = %self.name))]
    pub async fn destroy_channel(&self, id: ChannelId) -> bool {
        let removed = self.channels.write().remove(&id);
        let Some(channel) = removed else {
            debug!(channel = %id, "Channel already removed");
            return false;
        };

        if !channel.destroy().await {
            debug!(channel = %id, "Channel was already destroyed");
            return false;
        }
        self.ctx.emit(CoreEvent::Backend(BackendEvent::ChannelDestroyed {
            backend: self.name.clone(),
            channel_id: id.to_string(),
        }));
        true
    }

    pub fn channel(&self, id: ChannelId) -> Option<MediaChannel> {
        self.channels
            .read()
            .get(&id)
            .filter(|c| !c.is_destroyed())
            .cloned()
    }

    /// Live channels. Channels destroyed directly through their handle are
    /// pruned here.
    pub fn channels(&self) -> Vec<MediaChannel> {
        let mut channels = self.channels.write();
        channels.retain(|_, c| !c.is_destroyed());
        channels.values().cloned().collect()
    }

    pub fn channel_count(&self) -> usize {
        self.channels().len()
    }

    /// Destroy every channel. Failures are logged by the channels and never
    /// interrupt teardown.
    #[instrument(skip(self), fields(backend = %self.name))]
    pub async fn shutdown(&self) {
        let ids: Vec<ChannelId> = self.channels.read().keys().copied().collect();
        for id in &ids {
            self.destroy_channel(*id).await;
        }
        info!(channels = ids.len(), "Backend shut down");
    }

    // ------------------------------------------------------------------
    // Output devices
    // ------------------------------------------------------------------

    pub async fn devices(&self) -> Result<Vec<AudioDevice>> {
        with_init_retry(self.engine.as_ref(), "devices", || self.engine.devices()).await
    }

    /// The device selected through [`set_device`](Self::set_device), else
    /// the engine's default device.
    pub async fn current_device(&self) -> Result<Option<AudioDevice>> {
        let devices = self.devices().await?;
        let selected = self.current_device.read().clone();

        Ok(match selected {
            Some(id) => devices.into_iter().find(|d| d.id == id),
            None => devices.into_iter().find(|d| d.is_default),
        })
    }

    /// Switch the engine-wide output device. Publishes a backend-scoped
    /// `DeviceChanged`.
    pub async fn set_device(&self, device_id: &str) -> Result<()> {
        if device_id.trim().is_empty() {
            return Err(MediaError::Validation("device id cannot be empty".into()));
        }

        let devices = self.devices().await?;
        if !devices.iter().any(|d| d.id == device_id) {
            return Err(MediaError::Validation(format!("unknown device {device_id}")));
        }

        with_init_retry(self.engine.as_ref(), "set_device", || {
            self.engine.set_device(device_id)
        })
        .await?;

        *self.current_device.write() = Some(device_id.to_string());
        info!(backend = %self.name, device_id, "Output device changed");
        self.ctx.emit(CoreEvent::Backend(BackendEvent::DeviceChanged {
            backend: self.name.clone(),
            device_id: device_id.to_string(),
        }));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn playable_source(&self, item: &MediaItem) -> Result<MediaSource> {
        if item.cache_state() == CacheState::Cached {
            return match self.cache.cached_media(item).await? {
                Some(CachedMedia::File(path)) => Ok(MediaSource::File(path)),
                Some(CachedMedia::Memory(bytes)) => Ok(MediaSource::Memory(bytes)),
                None if self.capabilities.direct_read => {
                    Ok(MediaSource::File(item.source_path().to_path_buf()))
                }
                None => Err(MediaError::State(format!(
                    "cached artifact for item {} is no longer available",
                    item.id()
                ))),
            };
        }

        if self.capabilities.direct_read {
            debug!("Engine reads the source directly");
            return Ok(MediaSource::File(item.source_path().to_path_buf()));
        }

        Err(not_cached(item))
    }

    async fn open_channel(&self, item: &MediaItem, source: MediaSource) -> Result<MediaChannel> {
        let request = OpenRequest::new(source, item.kind()).with_title(item.title());
        let native = with_init_retry(self.engine.as_ref(), "open", || {
            self.engine.open(request.clone())
        })
        .await
        .map_err(|e| {
            warn!(backend = %self.name, error = %e, "Engine failed to open channel");
            e
        })?;

        let channel = MediaChannel::new(
            item.clone(),
            self.name.clone(),
            native,
            self.ctx.clone(),
            self.channel_config.clone(),
        );
        self.channels.write().insert(channel.id(), channel.clone());

        self.ctx.emit(CoreEvent::Backend(BackendEvent::ChannelCreated {
            backend: self.name.clone(),
            channel_id: channel.id().to_string(),
            item_id: item.id().to_string(),
        }));
        info!(channel = %channel.id(), "Channel created");
        Ok(channel)
    }
}

fn not_cached(item: &MediaItem) -> MediaError {
    MediaError::State(format!(
        "item {} is {}, channels need a cached item",
        item.id(),
        item.cache_state()
    ))
}

impl fmt::Debug for BackendService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendService")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("cache", &self.cache.name())
            .field("channels", &self.channels.read().len())
            .finish()
    }
}
