//! # Media Orchestration Core
//!
//! Plays media through interchangeable native engines without the host
//! knowing which engine is active.
//!
//! ## Overview
//!
//! - [`cache`]: copies an item's bytes into local storage and owns its
//!   `CacheState`. Channels are only created for cached items.
//! - [`channel`]: one playback session with a uniform state machine,
//!   position ticks and one-shot position triggers.
//! - [`backend`]: engine registry plus the per-engine channel factory.
//! - [`extraction`]: a bounded decode/encode pipeline that pulls a single
//!   embedded stream out of a container for engines that cannot select
//!   streams.
//!
//! ## Architecture
//!
//! ```text
//! MediaItem ──> CacheStrategy ──Cached──> BackendService ──> MediaChannel
//!                                              │                  │
//!                                              │ no stream        └─> EventBus
//!                                              │ selection
//!                                              └──> StreamExtractor ──> artifact
//! ```
//!
//! Every component receives its collaborators through a [`MediaContext`];
//! there is no global state.

pub mod backend;
pub mod cache;
pub mod channel;
pub mod context;
pub mod error;
pub mod extraction;
pub(crate) mod inflight;
pub mod model;
pub mod naming;
pub mod progress;

pub use backend::{BackendService, EngineRegistry};
pub use cache::{
    CacheConfig, CacheSource, CacheStats, CacheStrategy, CachedMedia, FileCacheStrategy,
    MemoryCacheStrategy,
};
pub use channel::{
    AudioChannel, ChannelConfig, ChannelId, MediaChannel, PositionTrigger, StreamSelection,
    VideoChannel, LENGTH_METADATA_KEY,
};
pub use context::MediaContext;
pub use error::{MediaError, Result};
pub use extraction::{ExtractionConfig, ExtractionPipeline, PipelineStats, StreamExtractor};
pub use model::{MediaItem, MediaItemBuilder, MediaItemId, MediaStream, StreamId};
pub use progress::Progress;
