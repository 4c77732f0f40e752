//! # Scenes
//!
//! A scene plays several items against one lead channel. Each cue starts
//! when the lead's position crosses the cue's offset, using the lead
//! channel's position triggers; cues at offset zero start with the lead.
//!
//! ```text
//! lead  |==========================================|
//! cue a |   ^ 2s  |===============|
//! cue b |              ^ 5s |==========|
//! ```
//!
//! Cues follow the lead's lossless trigger stream rather than the event bus,
//! so a burst of bus traffic can never swallow a cue start.
//!
//! Pause, resume and stop apply to every channel in the scene. Seeking moves
//! the lead and realigns the cues that should already be running.

use std::sync::Arc;
use std::time::Duration;

use core_media::{BackendService, MediaChannel, MediaItem};
use core_runtime::events::ChannelState;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};

const TRIGGER_PREFIX: &str = "scene:";

/// An item that joins the scene `offset` into the lead's timeline.
#[derive(Debug, Clone)]
pub struct SceneCue {
    pub label: String,
    pub item: MediaItem,
    pub offset: Duration,
}

impl SceneCue {
    pub fn new(label: impl Into<String>, item: MediaItem, offset: Duration) -> Self {
        Self {
            label: label.into(),
            item,
            offset,
        }
    }
}

fn trigger_name(label: &str) -> String {
    format!("{TRIGGER_PREFIX}{label}")
}

#[derive(Clone)]
struct CueChannel {
    label: String,
    offset: Duration,
    channel: MediaChannel,
}

pub struct Scene {
    backend: Arc<BackendService>,
    lead: MediaChannel,
    cues: Arc<Vec<CueChannel>>,
    watcher: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Scene {
    /// Open a channel for the lead and for every cue.
    ///
    /// Every item must be playable on `backend`. If any channel fails to
    /// open, the channels already opened are destroyed.
    ///
    /// # Errors
    ///
    /// [`CoreError::Scene`] for duplicate or empty cue labels, otherwise the
    /// first channel creation error.
    #[instrument(skip_all, fields(backend = backend.name(), cues = cues.len()))]
    pub async fn build(
        backend: Arc<BackendService>,
        lead: &MediaItem,
        cues: Vec<SceneCue>,
    ) -> Result<Self> {
        let mut labels: Vec<&str> = cues.iter().map(|c| c.label.as_str()).collect();
        labels.sort_unstable();
        if labels.iter().any(|l| l.trim().is_empty()) {
            return Err(CoreError::Scene("cue labels cannot be empty".into()));
        }
        if labels.windows(2).any(|w| w[0] == w[1]) {
            return Err(CoreError::Scene("cue labels must be unique".into()));
        }

        let lead_channel = backend.create_channel(lead).await?;
        let mut opened: Vec<CueChannel> = Vec::with_capacity(cues.len());

        for cue in &cues {
            match backend.create_channel(&cue.item).await {
                Ok(channel) => opened.push(CueChannel {
                    label: cue.label.clone(),
                    offset: cue.offset,
                    channel,
                }),
                Err(err) => {
                    warn!(cue = %cue.label, error = %err, "Cue channel failed to open");
                    for done in &opened {
                        backend.destroy_channel(done.channel.id()).await;
                    }
                    backend.destroy_channel(lead_channel.id()).await;
                    return Err(err.into());
                }
            }
        }

        let cues = Arc::new(opened);
        let watcher = spawn_watcher(&lead_channel, Arc::clone(&cues));

        for cue in cues.iter().filter(|c| !c.offset.is_zero()) {
            lead_channel.register_trigger(trigger_name(&cue.label), cue.offset)?;
        }

        info!(lead = %lead_channel.id(), "Scene ready");
        Ok(Self {
            backend,
            lead: lead_channel,
            cues,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    pub fn lead(&self) -> &MediaChannel {
        &self.lead
    }

    pub fn cue(&self, label: &str) -> Option<&MediaChannel> {
        self.cues
            .iter()
            .find(|c| c.label == label)
            .map(|c| &c.channel)
    }

    pub fn position(&self) -> Duration {
        self.lead.position()
    }

    /// Start the lead and every cue at offset zero, then follow the lead's
    /// triggers for the rest.
    #[instrument(skip(self), fields(lead = %self.lead.id()))]
    pub async fn play(&self) -> Result<()> {
        self.lead.play().await?;
        for cue in self.cues.iter().filter(|c| c.offset.is_zero()) {
            cue.channel.play().await?;
        }
        Ok(())
    }

    pub async fn pause(&self) -> Result<()> {
        self.lead.pause().await?;
        for cue in self.cues.iter() {
            if cue.channel.state() == ChannelState::Playing {
                cue.channel.pause().await?;
            }
        }
        Ok(())
    }

    /// Resume the lead and the cues that were paused with it.
    pub async fn resume(&self) -> Result<()> {
        self.lead.resume().await?;
        for cue in self.cues.iter() {
            if cue.channel.state() == ChannelState::Paused {
                cue.channel.resume().await?;
            }
        }
        Ok(())
    }

    /// Stop everything and re-arm every cue for the next run.
    pub async fn stop(&self) -> Result<()> {
        self.lead.stop().await?;
        for cue in self.cues.iter() {
            cue.channel.stop().await?;
        }
        self.rearm()
    }

    /// Move the lead to `position`. Cues whose offset is already behind the
    /// new position are aligned and, if the lead is playing, started; the
    /// others are stopped and re-armed.
    #[instrument(skip(self), fields(lead = %self.lead.id()))]
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let landed = self.lead.set_position(position).await?;
        let playing = self.lead.state() == ChannelState::Playing;

        for cue in self.cues.iter() {
            if cue.offset <= landed {
                cue.channel.set_position(landed - cue.offset).await?;
                if playing {
                    cue.channel.play().await?;
                }
            } else {
                cue.channel.stop().await?;
            }
        }
        self.rearm()
    }

    /// Destroy every channel in the scene. Safe to call more than once.
    pub async fn teardown(&self) {
        if let Some((token, handle)) = self.watcher.lock().take() {
            token.cancel();
            handle.abort();
        }
        for cue in self.cues.iter() {
            self.backend.destroy_channel(cue.channel.id()).await;
        }
        self.backend.destroy_channel(self.lead.id()).await;
        debug!("Scene torn down");
    }

    fn rearm(&self) -> Result<()> {
        for cue in self.cues.iter().filter(|c| !c.offset.is_zero()) {
            self.lead.register_trigger(trigger_name(&cue.label), cue.offset)?;
        }
        Ok(())
    }
}

/// Play each cue as its lead trigger fires. Ends when the lead is destroyed
/// or the token is cancelled.
fn spawn_watcher(
    lead: &MediaChannel,
    cues: Arc<Vec<CueChannel>>,
) -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let stop = token.clone();
    let mut fired = lead.fired_triggers();

    let handle = tokio::spawn(async move {
        loop {
            let trigger = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = fired.recv() => match next {
                    Some(trigger) => trigger,
                    None => break,
                },
            };

            let Some(cue) = cues.iter().find(|c| trigger_name(&c.label) == trigger.name) else {
                continue;
            };
            debug!(cue = %cue.label, "Starting cue");
            if let Err(e) = cue.channel.play().await {
                warn!(cue = %cue.label, error = %e, "Cue failed to start");
            }
        }
    });

    (token, handle)
}

impl Drop for Scene {
    fn drop(&mut self) {
        if let Some((token, handle)) = self.watcher.get_mut().take() {
            token.cancel();
            handle.abort();
        }
    }
}
