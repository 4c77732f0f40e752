//! # Host Bridge Traits
//!
//! Contracts between the media core and everything it does not own: the
//! file system, native playback engines, the demux/mux toolkit used for
//! stream extraction, and the host's log pipeline.
//!
//! ## Traits
//!
//! ### Storage
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Artifact I/O
//!
//! ### Engines
//! - [`PlaybackEngine`](engine::PlaybackEngine) - Opens native playback channels
//! - [`EngineChannel`](engine::EngineChannel) - One native playback session
//! - [`AudioOutput`](engine::AudioOutput), [`VideoOutput`](engine::VideoOutput),
//!   [`StreamSelector`](engine::StreamSelector) - Optional channel capabilities
//! - [`MediaToolkit`](toolkit::MediaToolkit) - Packet-level demux/decode/encode/mux
//!
//! ### Diagnostics
//! - [`LoggerSink`](diagnostics::LoggerSink) - Forward structured logs to the host
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map native failures to [`BridgeError::Engine`] with the engine's own
//! code so callers can report it unchanged.
//!
//! ## Thread Safety
//!
//! Engine, toolkit and storage traits require `Send + Sync`. Packet readers and
//! writers are only `Send`: each is owned by a single pipeline stage.

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod storage;
pub mod toolkit;

pub use error::{BridgeError, Result};

pub use diagnostics::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use engine::{
    AudioDevice, AudioOutput, EngineCapabilities, EngineChannel, MediaKind, MediaSource,
    OpenRequest, PlaybackEngine, StreamInfo, StreamKind, StreamSelector, VideoOutput,
};
pub use storage::{ByteReader, ByteWriter, FileMetadata, FileSystemAccess};
pub use toolkit::{
    ContainerInfo, MediaFrame, MediaPacket, MediaToolkit, OutputMode, OutputSpec, PacketReader,
    PacketWriter,
};
