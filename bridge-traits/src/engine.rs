//! Playback engine bridge traits.
//!
//! A native engine (a mixer, a video player, a platform media framework) is
//! exposed to the core through [`PlaybackEngine`], which opens
//! [`EngineChannel`] handles for individual media sources. Optional features
//! such as volume control or in-container stream selection are published as
//! separate capability traits that a channel may or may not provide.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Broad classification of a playable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Audio,
    Video,
    Subtitle,
    Generic,
}

/// Kind of an elementary stream embedded in a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "subtitle",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an engine should read media from.
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// A file on local storage, typically a cache or extraction artifact.
    File(PathBuf),
    /// Bytes already resident in memory.
    Memory(Bytes),
}

/// Request to open a playback channel.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub source: MediaSource,
    pub kind: MediaKind,
    /// Display title, forwarded for platform media sessions.
    pub title: Option<String>,
}

impl OpenRequest {
    pub fn new(source: MediaSource, kind: MediaKind) -> Self {
        Self {
            source,
            kind,
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Static description of what an engine can do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineCapabilities {
    pub audio: bool,
    pub video: bool,
    /// The engine can pick one embedded stream out of a multiplexed container.
    pub stream_selection: bool,
    /// The engine reads its source itself, so items need not be cached first.
    pub direct_read: bool,
    /// The engine enumerates and switches output devices.
    pub output_devices: bool,
}

/// An audio output device reported by an engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Metadata for one elementary stream inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: usize,
    pub kind: StreamKind,
    pub codec: String,
    pub language: Option<String>,
}

/// A native playback engine.
///
/// # Initialization
///
/// Engines that need explicit bring-up report [`BridgeError::NotInitialized`]
/// from `open` or device calls until [`PlaybackEngine::initialize`] has run.
/// The core retries such calls once after initializing.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// Stable engine name used for registry lookup and diagnostics.
    fn name(&self) -> &str;

    fn capabilities(&self) -> EngineCapabilities;

    /// Bring up the engine. Must be safe to call more than once.
    async fn initialize(&self) -> Result<()>;

    /// Allocate a native channel for `request`.
    async fn open(&self, request: OpenRequest) -> Result<Box<dyn EngineChannel>>;

    async fn devices(&self) -> Result<Vec<AudioDevice>> {
        Err(BridgeError::NotAvailable(format!(
            "{} does not enumerate output devices",
            self.name()
        )))
    }

    async fn set_device(&self, device_id: &str) -> Result<()> {
        Err(BridgeError::NotAvailable(format!(
            "{} cannot switch to device {device_id}",
            self.name()
        )))
    }
}

/// A native playback session owned by a core channel.
///
/// `position`, `length`, `is_playing` and `is_exhausted` are polled from the
/// channel's position ticker and must not block.
#[async_trait]
pub trait EngineChannel: Send + Sync {
    async fn play(&self) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Halt playback and rewind to the start.
    async fn stop(&self) -> Result<()>;

    async fn seek(&self, position: Duration) -> Result<()>;

    fn position(&self) -> Duration;

    fn length(&self) -> Option<Duration>;

    fn is_playing(&self) -> bool;

    /// True once the source has been played to its end.
    fn is_exhausted(&self) -> bool;

    /// Release native resources. Called exactly once by the owning channel.
    async fn release(&self) -> Result<()>;

    fn audio(&self) -> Option<&dyn AudioOutput> {
        None
    }

    fn video(&self) -> Option<&dyn VideoOutput> {
        None
    }

    fn stream_selector(&self) -> Option<&dyn StreamSelector> {
        None
    }
}

/// Volume and routing control for audio-capable channels.
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Volume is normalized to `0.0..=1.0`.
    async fn set_volume(&self, volume: f32) -> Result<()>;

    fn volume(&self) -> f32;

    async fn set_device(&self, device_id: &str) -> Result<()>;
}

/// Read-only video surface properties.
pub trait VideoOutput: Send + Sync {
    fn frame_size(&self) -> Option<(u32, u32)>;

    fn frame_rate(&self) -> Option<f64>;
}

/// In-container stream selection.
#[async_trait]
pub trait StreamSelector: Send + Sync {
    fn streams(&self) -> Vec<StreamInfo>;

    async fn select_stream(&self, kind: StreamKind, index: usize) -> Result<()>;
}
