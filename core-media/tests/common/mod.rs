//! Fakes shared by the integration suites.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::{
    AudioDevice, AudioOutput, BridgeError, ByteReader, ByteWriter, EngineCapabilities,
    EngineChannel, FileMetadata, FileSystemAccess, MediaSource, OpenRequest, PlaybackEngine,
    StreamInfo, StreamKind, StreamSelector,
};
use bytes::Bytes;
use bridge_traits::MediaKind;
use core_media::{
    BackendService, CacheConfig, ChannelConfig, FileCacheStrategy, MediaContext, MediaItem,
    MemoryCacheStrategy,
};
use core_runtime::events::{CoreEvent, EventBus, EventStream};
use parking_lot::Mutex;

// ============================================================================
// Workspace helpers
// ============================================================================

pub fn scratch(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join("core-media-tests")
        .join(format!("{name}-{}", uuid::Uuid::new_v4()))
}

pub fn context(root: &Path) -> (MediaContext, EventBus) {
    context_with(root, Arc::new(TokioFileSystem::with_cache_dir(root)))
}

pub fn context_with(root: &Path, fs: Arc<dyn FileSystemAccess>) -> (MediaContext, EventBus) {
    let bus = EventBus::new(4096);
    let ctx = MediaContext::new(fs, bus.clone(), root).expect("context");
    (ctx, bus)
}

pub fn drain(stream: &mut EventStream) -> Vec<CoreEvent> {
    stream.drain()
}

pub fn song(owner: &str, path: &str) -> MediaItem {
    MediaItem::builder(owner, path)
        .kind(MediaKind::Audio)
        .build()
        .expect("item")
}

/// Channels whose ticker never fires on its own during a test; tests drive
/// `update_position` by hand.
pub fn manual_ticks() -> ChannelConfig {
    ChannelConfig::new().with_tick_interval(Duration::from_secs(3600))
}

pub fn file_cache(ctx: &MediaContext) -> Arc<FileCacheStrategy> {
    Arc::new(
        FileCacheStrategy::new(ctx.clone(), CacheConfig::default().with_chunk_size(64))
            .expect("file cache"),
    )
}

pub fn memory_cache(ctx: &MediaContext) -> Arc<MemoryCacheStrategy> {
    Arc::new(MemoryCacheStrategy::new(ctx.clone(), CacheConfig::default()).expect("memory cache"))
}

/// A backend over `engine` with a file cache and manual ticks.
pub fn backend(engine: Arc<FakeEngine>, ctx: &MediaContext) -> BackendService {
    BackendService::with_engine(engine, ctx.clone(), file_cache(ctx))
        .with_channel_config(manual_ticks())
}

// ============================================================================
// Counting filesystem
// ============================================================================

/// Delegates to [`TokioFileSystem`] and counts artifact writes.
pub struct CountingFs {
    inner: TokioFileSystem,
    pub write_streams: AtomicUsize,
}

impl CountingFs {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: TokioFileSystem::with_cache_dir(root),
            write_streams: AtomicUsize::new(0),
        })
    }

    pub fn writes(&self) -> usize {
        self.write_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileSystemAccess for CountingFs {
    async fn get_cache_directory(&self) -> bridge_traits::Result<PathBuf> {
        self.inner.get_cache_directory().await
    }

    async fn exists(&self, path: &Path) -> bridge_traits::Result<bool> {
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &Path) -> bridge_traits::Result<FileMetadata> {
        self.inner.metadata(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> bridge_traits::Result<()> {
        self.inner.create_dir_all(path).await
    }

    async fn read_file(&self, path: &Path) -> bridge_traits::Result<Bytes> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> bridge_traits::Result<()> {
        self.inner.write_file(path, data).await
    }

    async fn delete_file(&self, path: &Path) -> bridge_traits::Result<()> {
        self.inner.delete_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> bridge_traits::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn list_directory(&self, path: &Path) -> bridge_traits::Result<Vec<PathBuf>> {
        self.inner.list_directory(path).await
    }

    async fn open_read_stream(&self, path: &Path) -> bridge_traits::Result<ByteReader> {
        self.inner.open_read_stream(path).await
    }

    async fn open_write_stream(&self, path: &Path) -> bridge_traits::Result<ByteWriter> {
        self.write_streams.fetch_add(1, Ordering::SeqCst);
        self.inner.open_write_stream(path).await
    }
}

// ============================================================================
// Fake playback engine
// ============================================================================

/// Observable state of one fake native channel.
#[derive(Default)]
pub struct FakeNative {
    pub position_ms: AtomicU64,
    pub length_ms: AtomicU64,
    pub playing: AtomicBool,
    pub exhausted: AtomicBool,
    pub releases: AtomicUsize,
    pub fail_next: AtomicBool,
    pub fail_release: AtomicBool,
    pub volume: Mutex<f32>,
    pub device: Mutex<Option<String>>,
    pub selected: Mutex<Option<(StreamKind, usize)>>,
    pub source: Mutex<Option<MediaSource>>,
    /// Block the next `position()` read for this many milliseconds after
    /// sampling, simulating a slow native query.
    pub stall_position_ms: AtomicU64,
}

impl FakeNative {
    pub fn set_position(&self, ms: u64) {
        self.position_ms.store(ms, Ordering::SeqCst);
    }

    pub fn finish(&self) {
        let length = self.length_ms.load(Ordering::SeqCst);
        self.position_ms.store(length, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
        self.exhausted.store(true, Ordering::SeqCst);
    }

    fn check(&self) -> bridge_traits::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(BridgeError::engine(-9, "native call failed"))
        } else {
            Ok(())
        }
    }
}

pub struct FakeChannel {
    native: Arc<FakeNative>,
    audio: bool,
    selector: bool,
}

#[async_trait]
impl EngineChannel for FakeChannel {
    async fn play(&self) -> bridge_traits::Result<()> {
        self.native.check()?;
        self.native.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> bridge_traits::Result<()> {
        self.native.check()?;
        self.native.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> bridge_traits::Result<()> {
        self.native.check()?;
        self.native.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> bridge_traits::Result<()> {
        self.native.check()?;
        self.native.playing.store(false, Ordering::SeqCst);
        self.native.exhausted.store(false, Ordering::SeqCst);
        self.native.set_position(0);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> bridge_traits::Result<()> {
        self.native.check()?;
        self.native.exhausted.store(false, Ordering::SeqCst);
        self.native.set_position(position.as_millis() as u64);
        Ok(())
    }

    fn position(&self) -> Duration {
        let ms = self.native.position_ms.load(Ordering::SeqCst);
        let stall = self.native.stall_position_ms.swap(0, Ordering::SeqCst);
        if stall > 0 {
            std::thread::sleep(Duration::from_millis(stall));
        }
        Duration::from_millis(ms)
    }

    fn length(&self) -> Option<Duration> {
        match self.native.length_ms.load(Ordering::SeqCst) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn is_playing(&self) -> bool {
        self.native.playing.load(Ordering::SeqCst)
    }

    fn is_exhausted(&self) -> bool {
        self.native.exhausted.load(Ordering::SeqCst)
    }

    async fn release(&self) -> bridge_traits::Result<()> {
        self.native.releases.fetch_add(1, Ordering::SeqCst);
        if self.native.fail_release.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed("handle already gone".into()));
        }
        Ok(())
    }

    fn audio(&self) -> Option<&dyn AudioOutput> {
        if self.audio {
            Some(self)
        } else {
            None
        }
    }

    fn stream_selector(&self) -> Option<&dyn StreamSelector> {
        if self.selector {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AudioOutput for FakeChannel {
    async fn set_volume(&self, volume: f32) -> bridge_traits::Result<()> {
        *self.native.volume.lock() = volume;
        Ok(())
    }

    fn volume(&self) -> f32 {
        *self.native.volume.lock()
    }

    async fn set_device(&self, device_id: &str) -> bridge_traits::Result<()> {
        *self.native.device.lock() = Some(device_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl StreamSelector for FakeChannel {
    fn streams(&self) -> Vec<StreamInfo> {
        vec![
            StreamInfo {
                index: 0,
                kind: StreamKind::Video,
                codec: "h264".into(),
                language: None,
            },
            StreamInfo {
                index: 1,
                kind: StreamKind::Audio,
                codec: "aac".into(),
                language: Some("en".into()),
            },
        ]
    }

    async fn select_stream(&self, kind: StreamKind, index: usize) -> bridge_traits::Result<()> {
        *self.native.selected.lock() = Some((kind, index));
        Ok(())
    }
}

pub struct FakeEngine {
    name: String,
    caps: EngineCapabilities,
    pub opens: AtomicUsize,
    pub inits: AtomicUsize,
    /// Report `NotInitialized` from `open` until `initialize` has run.
    pub lazy: bool,
    initialized: AtomicBool,
    pub length_ms: u64,
    pub natives: Mutex<Vec<Arc<FakeNative>>>,
    pub devices: Vec<AudioDevice>,
    pub device: Mutex<Option<String>>,
}

impl FakeEngine {
    pub fn new(name: &str, caps: EngineCapabilities) -> Self {
        Self {
            name: name.to_string(),
            caps,
            opens: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
            lazy: false,
            initialized: AtomicBool::new(false),
            length_ms: 10_000,
            natives: Mutex::new(Vec::new()),
            devices: vec![
                AudioDevice {
                    id: "speakers".into(),
                    name: "Speakers".into(),
                    is_default: true,
                },
                AudioDevice {
                    id: "headphones".into(),
                    name: "Headphones".into(),
                    is_default: false,
                },
            ],
            device: Mutex::new(None),
        }
    }

    pub fn audio() -> Self {
        Self::new(
            "fake-audio",
            EngineCapabilities {
                audio: true,
                output_devices: true,
                ..Default::default()
            },
        )
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn last_native(&self) -> Arc<FakeNative> {
        self.natives.lock().last().cloned().expect("no channel opened")
    }
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.caps
    }

    async fn initialize(&self) -> bridge_traits::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn open(&self, request: OpenRequest) -> bridge_traits::Result<Box<dyn EngineChannel>> {
        if self.lazy && !self.initialized.load(Ordering::SeqCst) {
            return Err(BridgeError::NotInitialized(format!("{} mixer is cold", self.name)));
        }

        self.opens.fetch_add(1, Ordering::SeqCst);
        let native = Arc::new(FakeNative::default());
        native.length_ms.store(self.length_ms, Ordering::SeqCst);
        *native.volume.lock() = 1.0;
        *native.source.lock() = Some(request.source);
        self.natives.lock().push(Arc::clone(&native));

        Ok(Box::new(FakeChannel {
            native,
            audio: self.caps.audio,
            selector: self.caps.stream_selection,
        }))
    }

    async fn devices(&self) -> bridge_traits::Result<Vec<AudioDevice>> {
        if !self.caps.output_devices {
            return Err(BridgeError::NotAvailable("no devices".into()));
        }
        Ok(self.devices.clone())
    }

    async fn set_device(&self, device_id: &str) -> bridge_traits::Result<()> {
        *self.device.lock() = Some(device_id.to_string());
        Ok(())
    }
}
