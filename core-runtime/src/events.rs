//! # Event Bus System
//!
//! Typed notifications for the media core, carried over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **State vocabulary**: [`CacheState`], [`ExtractState`], [`ChannelState`]
//! - **Event Types**: one enum per subsystem wrapped by [`CoreEvent`]
//! - **EventBus**: cloneable publisher handle shared by every component
//! - **EventStream**: receiver wrapper with an optional filter predicate
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐     emit      ┌───────────┐
//! │ CacheStrategy  ├──────────────>│           │
//! └────────────────┘               │           │     subscribe    ┌────────────┐
//! ┌────────────────┐     emit      │ EventBus  ├─────────────────>│ Host UI    │
//! │ Extraction     ├──────────────>│ (broadcast│                  └────────────┘
//! └────────────────┘               │  channel) │     subscribe    ┌────────────┐
//! ┌────────────────┐     emit      │           ├─────────────────>│ Scene      │
//! │ Channels       ├──────────────>│           │                  └────────────┘
//! └────────────────┘               └───────────┘
//! ```
//!
//! ## Delivery Guarantees
//!
//! Components emit exactly one event per realized state transition. Emitting
//! with no subscribers is not an error for producers; they discard the
//! `SendError`. Slow subscribers see `RecvError::Lagged(n)` and keep going.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ChannelEvent, CoreEvent, EventBus, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut channel_events = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Channel(_)));
//!
//! bus.emit(CoreEvent::Channel(ChannelEvent::Stopped {
//!     channel_id: "c-1".to_string(),
//! }))
//! .ok();
//!
//! let event = channel_events.recv().await.unwrap();
//! assert_eq!(event.channel_id(), Some("c-1"));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Position ticks dominate the volume; 256 covers a few seconds of ticks for
/// a handful of channels.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// State Vocabulary
// ============================================================================

/// Whether an item's bytes are locally available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CacheState {
    #[default]
    NotCached,
    Caching,
    Cached,
    /// The source handed to the cache was unusable.
    Failed,
}

/// Whether an embedded stream has been extracted to a standalone artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ExtractState {
    #[default]
    NotExtracted,
    Extracting,
    Extracted,
}

/// Lifecycle of a playback channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Ended,
    /// Destroyed; the channel can no longer be used.
    Invalid,
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ExtractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Cache(CacheEvent),
    Extraction(ExtractionEvent),
    Channel(ChannelEvent),
    Backend(BackendEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Extraction(e) => e.description(),
            CoreEvent::Channel(e) => e.description(),
            CoreEvent::Backend(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::StateChanged {
                state: CacheState::Failed,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::Progress { .. })
            | CoreEvent::Extraction(ExtractionEvent::Progress { .. })
            | CoreEvent::Channel(ChannelEvent::PositionChanged { .. }) => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    /// Channel the event belongs to, if it is channel scoped.
    pub fn channel_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Channel(e) => Some(e.channel_id()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Cache Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    StateChanged { item_id: String, state: CacheState },
    /// Unit interval progress of the running cache operation.
    Progress { item_id: String, progress: f64 },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::StateChanged { .. } => "Cache state changed",
            CacheEvent::Progress { .. } => "Caching in progress",
        }
    }
}

// ============================================================================
// Extraction Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ExtractionEvent {
    StateChanged {
        item_id: String,
        stream: String,
        state: ExtractState,
    },
    Progress {
        item_id: String,
        stream: String,
        progress: f64,
    },
}

impl ExtractionEvent {
    fn description(&self) -> &str {
        match self {
            ExtractionEvent::StateChanged { .. } => "Extraction state changed",
            ExtractionEvent::Progress { .. } => "Extraction in progress",
        }
    }
}

// ============================================================================
// Channel Events
// ============================================================================

/// Channel scoped notifications.
///
/// A realized transition produces one `StateChanged` followed by exactly one
/// of the semantic variants (`Playing`, `Paused`, `Resumed`, `Stopped`,
/// `Ended`, `Destroyed`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ChannelEvent {
    StateChanged {
        channel_id: String,
        from: ChannelState,
        to: ChannelState,
    },
    Playing {
        channel_id: String,
    },
    Paused {
        channel_id: String,
        position_ms: u64,
    },
    Resumed {
        channel_id: String,
        position_ms: u64,
    },
    Stopped {
        channel_id: String,
    },
    Ended {
        channel_id: String,
    },
    Destroyed {
        channel_id: String,
    },
    PositionChanged {
        channel_id: String,
        position_ms: u64,
        length_ms: Option<u64>,
    },
    TriggerFired {
        channel_id: String,
        name: String,
        target_ms: u64,
    },
    DeviceChanged {
        channel_id: String,
        device_id: String,
    },
}

impl ChannelEvent {
    fn description(&self) -> &str {
        match self {
            ChannelEvent::StateChanged { .. } => "Channel state changed",
            ChannelEvent::Playing { .. } => "Playback started",
            ChannelEvent::Paused { .. } => "Playback paused",
            ChannelEvent::Resumed { .. } => "Playback resumed",
            ChannelEvent::Stopped { .. } => "Playback stopped",
            ChannelEvent::Ended { .. } => "Playback reached the end",
            ChannelEvent::Destroyed { .. } => "Channel destroyed",
            ChannelEvent::PositionChanged { .. } => "Playback position changed",
            ChannelEvent::TriggerFired { .. } => "Position trigger fired",
            ChannelEvent::DeviceChanged { .. } => "Channel output device changed",
        }
    }

    pub fn channel_id(&self) -> &str {
        match self {
            ChannelEvent::StateChanged { channel_id, .. }
            | ChannelEvent::Playing { channel_id }
            | ChannelEvent::Paused { channel_id, .. }
            | ChannelEvent::Resumed { channel_id, .. }
            | ChannelEvent::Stopped { channel_id }
            | ChannelEvent::Ended { channel_id }
            | ChannelEvent::Destroyed { channel_id }
            | ChannelEvent::PositionChanged { channel_id, .. }
            | ChannelEvent::TriggerFired { channel_id, .. }
            | ChannelEvent::DeviceChanged { channel_id, .. } => channel_id,
        }
    }

    /// True for the per-transition semantic notifications.
    pub fn is_semantic_transition(&self) -> bool {
        matches!(
            self,
            ChannelEvent::Playing { .. }
                | ChannelEvent::Paused { .. }
                | ChannelEvent::Resumed { .. }
                | ChannelEvent::Stopped { .. }
                | ChannelEvent::Ended { .. }
                | ChannelEvent::Destroyed { .. }
        )
    }
}

// ============================================================================
// Backend Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum BackendEvent {
    Initialized {
        backend: String,
    },
    ChannelCreated {
        backend: String,
        channel_id: String,
        item_id: String,
    },
    ChannelDestroyed {
        backend: String,
        channel_id: String,
    },
    /// Backend wide output device switch, distinct from
    /// [`ChannelEvent::DeviceChanged`].
    DeviceChanged {
        backend: String,
        device_id: String,
    },
}

impl BackendEvent {
    fn description(&self) -> &str {
        match self {
            BackendEvent::Initialized { .. } => "Backend initialized",
            BackendEvent::ChannelCreated { .. } => "Channel created",
            BackendEvent::ChannelDestroyed { .. } => "Channel destroyed",
            BackendEvent::DeviceChanged { .. } => "Backend output device changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Cloneable publisher handle. All clones share one broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of subscribers that received the event, or an error
    /// when nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Unfiltered [`EventStream`] over a fresh subscription.
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Subscription that skips events rejected by its filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |f| f(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. `None` when no matching event is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.accepts(&event) => return Some(Ok(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drain every matching event currently queued.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
