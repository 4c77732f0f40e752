//! # Media Channel
//!
//! A live playback session bound to one [`MediaItem`] and one engine.
//!
//! ```text
//!            play                pause
//!  Stopped ─────────> Playing ─────────> Paused
//!     ^                │  ^                │
//!     │     stop       │  └──── resume ────┘
//!     └────────────────┤
//!                      │ engine exhausted
//!                      v
//!                    Ended            any ──destroy──> Invalid
//! ```
//!
//! Every realized transition publishes one `StateChanged` event followed by
//! one semantic event. Calls that would not change anything return
//! `Ok(true)` without events; calls that are not valid from the current state
//! return `Ok(false)` without events.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bridge_traits::EngineChannel;
use core_runtime::events::{ChannelEvent, ChannelState, CoreEvent, EventStream};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::capability::{AudioChannel, StreamSelection, VideoChannel};
use super::config::ChannelConfig;
use super::trigger::{PositionTrigger, PositionTriggers};
use crate::context::MediaContext;
use crate::error::{MediaError, Result};
use crate::model::MediaItem;

/// Item metadata key channels report the media length under.
pub const LENGTH_METADATA_KEY: &str = "length_ms";

/// Process-unique identity of a [`MediaChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Handle to a playback session. Clones share the same session.
#[derive(Clone)]
pub struct MediaChannel {
    inner: Arc<ChannelInner>,
}

pub(crate) struct ChannelInner {
    id: ChannelId,
    item: MediaItem,
    backend: String,
    engine: Box<dyn EngineChannel>,
    ctx: MediaContext,
    config: ChannelConfig,
    /// Serializes transitions against each other and against destroy.
    transition: tokio::sync::Mutex<()>,
    state: RwLock<ChannelState>,
    triggers: Mutex<PositionTriggers>,
    /// Lossless delivery of fired triggers, independent of the event bus.
    trigger_sinks: Mutex<Vec<mpsc::UnboundedSender<PositionTrigger>>>,
    ticker: Mutex<Option<CancellationToken>>,
    destroyed: AtomicBool,
}

impl MediaChannel {
    pub(crate) fn new(
        item: MediaItem,
        backend: impl Into<String>,
        engine: Box<dyn EngineChannel>,
        ctx: MediaContext,
        config: ChannelConfig,
    ) -> Self {
        let channel = Self {
            inner: Arc::new(ChannelInner {
                id: ChannelId::new(),
                item,
                backend: backend.into(),
                engine,
                ctx,
                config,
                transition: tokio::sync::Mutex::new(()),
                state: RwLock::new(ChannelState::Stopped),
                triggers: Mutex::new(PositionTriggers::new()),
                trigger_sinks: Mutex::new(Vec::new()),
                ticker: Mutex::new(None),
                destroyed: AtomicBool::new(false),
            }),
        };
        channel.report_length();
        channel
    }

    pub fn id(&self) -> ChannelId {
        self.inner.id
    }

    pub fn item(&self) -> &MediaItem {
        &self.inner.item
    }

    /// Name of the engine this channel plays through.
    pub fn backend(&self) -> &str {
        &self.inner.backend
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.read()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Current engine position. Never waits on a transition.
    pub fn position(&self) -> Duration {
        if self.is_destroyed() {
            return Duration::ZERO;
        }
        self.inner.engine.position()
    }

    pub fn length(&self) -> Option<Duration> {
        if self.is_destroyed() {
            return None;
        }
        self.inner.engine.length()
    }

    /// Events scoped to this channel.
    pub fn subscribe(&self) -> EventStream {
        let id = self.inner.id.to_string();
        self.inner
            .ctx
            .events()
            .stream()
            .filter(move |event| event.channel_id() == Some(id.as_str()))
    }

    // ------------------------------------------------------------------
    // Capabilities
    // ------------------------------------------------------------------

    pub fn audio(&self) -> Option<AudioChannel<'_>> {
        if self.is_destroyed() {
            return None;
        }
        self.inner
            .engine
            .audio()
            .map(|output| AudioChannel::new(self, output))
    }

    pub fn video(&self) -> Option<VideoChannel<'_>> {
        if self.is_destroyed() {
            return None;
        }
        self.inner.engine.video().map(VideoChannel::new)
    }

    pub fn stream_selection(&self) -> Option<StreamSelection<'_>> {
        if self.is_destroyed() {
            return None;
        }
        self.inner
            .engine
            .stream_selector()
            .map(|selector| StreamSelection::new(self, selector))
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Start playback. Behaves as [`resume`](Self::resume) when paused and
    /// restarts from the beginning when ended.
    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn play(&self) -> Result<bool> {
        let _guard = self.inner.transition.lock().await;
        self.ensure_alive()?;

        match self.state() {
            ChannelState::Playing => Ok(true),
            ChannelState::Paused => self.resume_locked().await,
            ChannelState::Stopped => {
                self.engine_call("play", self.inner.engine.play()).await?;
                self.commit(ChannelState::Stopped, ChannelState::Playing, self.playing_event());
                self.start_ticker();
                Ok(true)
            }
            ChannelState::Ended => {
                if self.inner.engine.is_exhausted() {
                    self.engine_call("seek", self.inner.engine.seek(Duration::ZERO))
                        .await?;
                    self.inner.triggers.lock().rebaseline(Duration::ZERO);
                }
                self.engine_call("play", self.inner.engine.play()).await?;
                self.commit(ChannelState::Ended, ChannelState::Playing, self.playing_event());
                self.start_ticker();
                Ok(true)
            }
            ChannelState::Invalid => Err(self.destroyed_error()),
        }
    }

    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn pause(&self) -> Result<bool> {
        let _guard = self.inner.transition.lock().await;
        self.ensure_alive()?;

        match self.state() {
            ChannelState::Paused => Ok(true),
            ChannelState::Playing => {
                self.engine_call("pause", self.inner.engine.pause()).await?;
                self.stop_ticker();
                let position_ms = millis(self.inner.engine.position());
                self.commit(
                    ChannelState::Playing,
                    ChannelState::Paused,
                    ChannelEvent::Paused {
                        channel_id: self.inner.id.to_string(),
                        position_ms,
                    },
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn resume(&self) -> Result<bool> {
        let _guard = self.inner.transition.lock().await;
        self.ensure_alive()?;

        match self.state() {
            ChannelState::Playing => Ok(true),
            ChannelState::Paused => self.resume_locked().await,
            _ => Ok(false),
        }
    }

    /// Halt playback and rewind to the start.
    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn stop(&self) -> Result<bool> {
        let _guard = self.inner.transition.lock().await;
        self.ensure_alive()?;

        let from = self.state();
        match from {
            ChannelState::Stopped => Ok(true),
            ChannelState::Playing | ChannelState::Paused | ChannelState::Ended => {
                self.engine_call("stop", self.inner.engine.stop()).await?;
                self.stop_ticker();
                self.inner.triggers.lock().rebaseline(Duration::ZERO);
                self.commit(
                    from,
                    ChannelState::Stopped,
                    ChannelEvent::Stopped {
                        channel_id: self.inner.id.to_string(),
                    },
                );
                Ok(true)
            }
            ChannelState::Invalid => Err(self.destroyed_error()),
        }
    }

    /// Seek, clamped to the media length, keeping the current state.
    ///
    /// Seeking never fires position triggers; they are re-armed relative to
    /// the new position.
    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn set_position(&self, position: Duration) -> Result<Duration> {
        let _guard = self.inner.transition.lock().await;
        self.ensure_alive()?;

        let target = match self.inner.engine.length() {
            Some(length) => position.min(length),
            None => position,
        };

        self.engine_call("seek", self.inner.engine.seek(target)).await?;
        if self.state() == ChannelState::Playing && !self.inner.engine.is_playing() {
            self.engine_call("play", self.inner.engine.play()).await?;
        }

        self.inner.triggers.lock().rebaseline(target);
        self.emit_position(target);
        Ok(target)
    }

    // ------------------------------------------------------------------
    // Position triggers
    // ------------------------------------------------------------------

    /// Arm a one-shot trigger at `target`. A trigger already behind the
    /// current position does not fire.
    pub fn register_trigger(&self, name: impl Into<String>, target: Duration) -> Result<()> {
        self.ensure_alive()?;
        let name = name.into();
        if name.trim().is_empty() {
            return Err(MediaError::Validation("trigger name cannot be empty".into()));
        }

        let current = self.inner.engine.position();
        debug!(channel = %self.inner.id, trigger = %name, ?target, "Trigger registered");
        self.inner.triggers.lock().register(name, target, current);
        Ok(())
    }

    pub fn remove_trigger(&self, name: &str) -> bool {
        self.inner.triggers.lock().remove(name)
    }

    pub fn triggers(&self) -> Vec<PositionTrigger> {
        self.inner.triggers.lock().pending()
    }

    /// Every trigger this channel fires from now on, in firing order.
    ///
    /// Unlike the bus, this stream never drops a firing for a slow reader.
    /// It ends when the channel is destroyed.
    pub fn fired_triggers(&self) -> mpsc::UnboundedReceiver<PositionTrigger> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_destroyed() {
            self.inner.trigger_sinks.lock().push(tx);
        }
        rx
    }

    /// One position tick: publish the position, fire crossed triggers and
    /// detect the end of the media.
    ///
    /// Runs automatically while playing; hosts with their own clock may call
    /// it directly.
    pub async fn update_position(&self) -> Result<Duration> {
        self.ensure_alive()?;

        let epoch = self.inner.triggers.lock().epoch();
        let position = self.inner.engine.position();
        let Some(fired) = self.inner.triggers.lock().advance_from(epoch, position) else {
            debug!(channel = %self.inner.id, "Dropping position tick overtaken by a seek");
            return Ok(self.inner.engine.position());
        };

        self.emit_position(position);
        self.report_length();

        for trigger in fired {
            debug!(channel = %self.inner.id, trigger = %trigger.name, "Trigger fired");
            self.inner
                .trigger_sinks
                .lock()
                .retain(|sink| sink.send(trigger.clone()).is_ok());
            self.emit(ChannelEvent::TriggerFired {
                channel_id: self.inner.id.to_string(),
                name: trigger.name,
                target_ms: millis(trigger.target),
            });
        }

        if self.state() == ChannelState::Playing && self.inner.engine.is_exhausted() {
            let _guard = self.inner.transition.lock().await;
            if !self.is_destroyed()
                && self.state() == ChannelState::Playing
                && self.inner.engine.is_exhausted()
            {
                self.stop_ticker();
                self.commit(
                    ChannelState::Playing,
                    ChannelState::Ended,
                    ChannelEvent::Ended {
                        channel_id: self.inner.id.to_string(),
                    },
                );
            }
        }

        Ok(position)
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Release the engine channel. Safe to call repeatedly and concurrently;
    /// only the first call does anything and returns `true`. Release
    /// failures are logged, never returned.
    #[instrument(skip(self), fields(channel = %self.inner.id))]
    pub async fn destroy(&self) -> bool {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.stop_ticker();
        let _guard = self.inner.transition.lock().await;

        let from = std::mem::replace(&mut *self.inner.state.write(), ChannelState::Invalid);
        self.inner.triggers.lock().clear();
        self.inner.trigger_sinks.lock().clear();

        if let Err(e) = self.inner.engine.release().await {
            warn!(error = %e, "Engine release failed during destroy");
        }

        self.emit(ChannelEvent::StateChanged {
            channel_id: self.inner.id.to_string(),
            from,
            to: ChannelState::Invalid,
        });
        self.emit(ChannelEvent::Destroyed {
            channel_id: self.inner.id.to_string(),
        });
        info!(backend = %self.inner.backend, "Channel destroyed");
        true
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() {
            Err(self.destroyed_error())
        } else {
            Ok(())
        }
    }

    fn destroyed_error(&self) -> MediaError {
        MediaError::State(format!("channel {} has been destroyed", self.inner.id))
    }

    pub(crate) fn emit(&self, event: ChannelEvent) {
        self.inner.ctx.emit(CoreEvent::Channel(event));
    }

    fn playing_event(&self) -> ChannelEvent {
        ChannelEvent::Playing {
            channel_id: self.inner.id.to_string(),
        }
    }

    async fn resume_locked(&self) -> Result<bool> {
        self.engine_call("resume", self.inner.engine.resume()).await?;
        let position_ms = millis(self.inner.engine.position());
        self.commit(
            ChannelState::Paused,
            ChannelState::Playing,
            ChannelEvent::Resumed {
                channel_id: self.inner.id.to_string(),
                position_ms,
            },
        );
        self.start_ticker();
        Ok(true)
    }

    async fn engine_call<F>(&self, op: &str, call: F) -> Result<()>
    where
        F: std::future::Future<Output = bridge_traits::Result<()>>,
    {
        call.await.map_err(|e| {
            warn!(channel = %self.inner.id, op, error = %e, "Engine call failed");
            MediaError::from(e)
        })
    }

    fn commit(&self, from: ChannelState, to: ChannelState, semantic: ChannelEvent) {
        *self.inner.state.write() = to;
        debug!(channel = %self.inner.id, %from, %to, "Channel state changed");
        self.emit(ChannelEvent::StateChanged {
            channel_id: self.inner.id.to_string(),
            from,
            to,
        });
        self.emit(semantic);
    }

    fn emit_position(&self, position: Duration) {
        self.emit(ChannelEvent::PositionChanged {
            channel_id: self.inner.id.to_string(),
            position_ms: millis(position),
            length_ms: self.inner.engine.length().map(millis),
        });
    }

    fn report_length(&self) {
        if let Some(length) = self.inner.engine.length() {
            let value = millis(length).to_string();
            if self.inner.item.metadata(LENGTH_METADATA_KEY).as_deref() != Some(value.as_str()) {
                self.inner.item.set_metadata(LENGTH_METADATA_KEY, value);
            }
        }
    }

    fn start_ticker(&self) {
        let mut slot = self.inner.ticker.lock();
        if slot.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let weak: Weak<ChannelInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.tick_interval;
        let stop = token.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = weak.upgrade() else { break };
                let channel = MediaChannel { inner };
                if let Err(e) = channel.update_position().await {
                    debug!(error = %e, "Position ticker stopping");
                    break;
                }
            }
        });

        *slot = Some(token);
    }

    fn stop_ticker(&self) {
        if let Some(token) = self.inner.ticker.lock().take() {
            token.cancel();
        }
    }
}

impl fmt::Debug for MediaChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaChannel")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.backend)
            .field("item", &self.inner.item.id())
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let Some(token) = self.ticker.get_mut().take() {
            token.cancel();
        }
        if !*self.destroyed.get_mut() {
            debug!(channel = %self.id, "Channel dropped without destroy");
        }
    }
}
