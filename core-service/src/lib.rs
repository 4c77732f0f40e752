//! Core service façade and bootstrap helpers.
//!
//! [`MediaCore`] wires a validated [`CoreConfig`] and an [`EngineRegistry`]
//! into the shared media core: one [`MediaContext`], one cache strategy, an
//! optional stream extractor, and one [`BackendService`] per selected engine.
//! Desktop hosts typically enable the `desktop-shims` feature so the config
//! falls back to `bridge-desktop`'s file system.
//!
//! ```ignore
//! let config = CoreConfig::builder().storage_root("/var/lib/showrunner").build()?;
//! let registry = EngineRegistry::new();
//! registry.register(Arc::new(MyMixer::new()))?;
//!
//! let core = MediaCore::builder(config, registry).build()?;
//! let backend = core.backend("mixer").await?;
//! core.cache_item(&item, CacheSource::Path(item.source_path().into()), CancellationToken::new()).await?;
//! let channel = backend.create_channel(&item).await?;
//! channel.play().await?;
//! ```

pub mod error;
pub mod scene;

pub use error::{CoreError, Result};
pub use scene::{Scene, SceneCue};

pub use core_media::{
    BackendService, CacheConfig, CacheSource, CacheStrategy, ChannelConfig, EngineRegistry,
    ExtractionConfig, MediaChannel, MediaContext, MediaItem, StreamExtractor,
};
pub use core_runtime::config::{CoreConfig, FeatureFlags};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bridge_traits::EngineCapabilities;
use core_media::{FileCacheStrategy, MemoryCacheStrategy};
use core_runtime::events::EventStream;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Builder for [`MediaCore`]. Component configs default to their own
/// defaults.
pub struct MediaCoreBuilder {
    config: CoreConfig,
    registry: EngineRegistry,
    cache: CacheConfig,
    extraction: ExtractionConfig,
    channels: ChannelConfig,
}

impl MediaCoreBuilder {
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    pub fn extraction_config(mut self, config: ExtractionConfig) -> Self {
        self.extraction = config;
        self
    }

    pub fn channel_config(mut self, config: ChannelConfig) -> Self {
        self.channels = config;
        self
    }

    /// Validate every config and assemble the core.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Runtime`] when the core config is invalid
    /// - [`CoreError::InitializationFailed`] when a component config is invalid
    pub fn build(self) -> Result<MediaCore> {
        self.config.validate()?;
        self.channels
            .validate()
            .map_err(|e| CoreError::InitializationFailed(format!("channel config: {e}")))?;

        let ctx = MediaContext::from_config(&self.config)?;

        let cache: Arc<dyn CacheStrategy> = if self.config.features.enable_memory_cache {
            Arc::new(MemoryCacheStrategy::new(ctx.clone(), self.cache)?)
        } else {
            Arc::new(FileCacheStrategy::new(ctx.clone(), self.cache)?)
        };

        let extractor = match (self.config.features.enable_extraction, self.registry.toolkit()) {
            (true, Some(toolkit)) => Some(StreamExtractor::new(
                toolkit,
                ctx.clone(),
                self.extraction,
            )?),
            _ => None,
        };

        info!(
            root = ?ctx.storage_root(),
            cache = cache.name(),
            extraction = extractor.is_some(),
            "Media core ready"
        );

        Ok(MediaCore {
            config: self.config,
            ctx,
            registry: Arc::new(self.registry),
            cache,
            extractor,
            channel_config: self.channels,
            backends: RwLock::new(HashMap::new()),
            creating: tokio::sync::Mutex::new(()),
        })
    }
}

/// Primary façade exposed to host applications.
pub struct MediaCore {
    config: CoreConfig,
    ctx: MediaContext,
    registry: Arc<EngineRegistry>,
    cache: Arc<dyn CacheStrategy>,
    extractor: Option<StreamExtractor>,
    channel_config: ChannelConfig,
    backends: RwLock<HashMap<String, Arc<BackendService>>>,
    /// Held while a backend is built so racing first calls share one.
    creating: tokio::sync::Mutex<()>,
}

impl MediaCore {
    pub fn builder(config: CoreConfig, registry: EngineRegistry) -> MediaCoreBuilder {
        MediaCoreBuilder {
            config,
            registry,
            cache: CacheConfig::default(),
            extraction: ExtractionConfig::default(),
            channels: ChannelConfig::default(),
        }
    }

    /// Assemble a core with default component configs.
    pub fn new(config: CoreConfig, registry: EngineRegistry) -> Result<Self> {
        Self::builder(config, registry).build()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn context(&self) -> &MediaContext {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<dyn CacheStrategy> {
        &self.cache
    }

    pub fn extractor(&self) -> Option<&StreamExtractor> {
        self.extractor.as_ref()
    }

    /// Every event the core publishes.
    pub fn events(&self) -> EventStream {
        self.ctx.events().stream()
    }

    /// Backend for `engine`, created (and the engine initialized) on first
    /// use and shared afterwards.
    #[instrument(skip(self))]
    pub async fn backend(&self, engine: &str) -> Result<Arc<BackendService>> {
        let existing = self.backends.read().get(engine).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let _creating = self.creating.lock().await;
        let existing = self.backends.read().get(engine).cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let service = BackendService::new(
            &self.registry,
            engine,
            self.ctx.clone(),
            Arc::clone(&self.cache),
        )
        .await?;
        let service = self.attach(service);

        let service = Arc::new(service);
        self.backends
            .write()
            .insert(engine.to_string(), Arc::clone(&service));
        Ok(service)
    }

    /// Backend for the first registered engine whose capabilities satisfy
    /// `accept`.
    pub async fn backend_matching<F>(&self, accept: F) -> Result<Arc<BackendService>>
    where
        F: Fn(&EngineCapabilities) -> bool,
    {
        let engine = self.registry.select_matching(accept).await?;
        let name = engine.name().to_string();
        self.backend(&name).await
    }

    /// Backends created so far.
    pub fn backends(&self) -> Vec<Arc<BackendService>> {
        self.backends.read().values().cloned().collect()
    }

    /// Cache `item` under its deterministic artifact name.
    pub async fn cache_item(
        &self,
        item: &MediaItem,
        source: CacheSource,
        cancel: CancellationToken,
    ) -> Result<()> {
        let name = self.cache.cache_file_name(item);
        self.cache.cache(item, source, &name, cancel).await?;
        Ok(())
    }

    /// Destroy every channel of every backend. Teardown failures are logged
    /// by the components and never returned.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        let backends: Vec<Arc<BackendService>> =
            self.backends.write().drain().map(|(_, b)| b).collect();
        for backend in &backends {
            backend.shutdown().await;
        }
        info!(backends = backends.len(), "Media core shut down");
    }

    fn attach(&self, service: BackendService) -> BackendService {
        let service = service.with_channel_config(self.channel_config.clone());
        match &self.extractor {
            Some(extractor) if !service.capabilities().stream_selection => {
                service.with_extractor(extractor.clone())
            }
            _ => service,
        }
    }
}

impl fmt::Debug for MediaCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaCore")
            .field("config", &self.config)
            .field("cache", &self.cache.name())
            .field("extraction", &self.extractor.is_some())
            .field("backends", &self.backends.read().len())
            .finish()
    }
}
