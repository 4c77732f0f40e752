//! Optional channel capabilities, negotiated at the call site.
//!
//! ```rust,ignore
//! if let Some(audio) = channel.audio() {
//!     audio.set_volume(0.5).await?;
//! }
//! ```

use bridge_traits::{AudioOutput, StreamInfo, StreamKind, StreamSelector, VideoOutput};
use core_runtime::events::ChannelEvent;
use tracing::info;

use super::session::MediaChannel;
use crate::error::{MediaError, Result};

/// Volume and output routing of an audio-capable channel.
pub struct AudioChannel<'a> {
    channel: &'a MediaChannel,
    output: &'a dyn AudioOutput,
}

impl<'a> AudioChannel<'a> {
    pub(crate) fn new(channel: &'a MediaChannel, output: &'a dyn AudioOutput) -> Self {
        Self { channel, output }
    }

    pub fn volume(&self) -> f32 {
        self.output.volume()
    }

    /// # Errors
    ///
    /// [`MediaError::Validation`] unless `volume` is within `0.0..=1.0`.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(MediaError::Validation(format!(
                "volume {volume} is outside 0.0..=1.0"
            )));
        }
        self.channel.ensure_alive()?;
        self.output.set_volume(volume).await?;
        Ok(())
    }

    /// Route this channel to another output device. Publishes a
    /// channel-scoped `DeviceChanged`.
    pub async fn set_device(&self, device_id: &str) -> Result<()> {
        if device_id.trim().is_empty() {
            return Err(MediaError::Validation("device id cannot be empty".into()));
        }
        self.channel.ensure_alive()?;
        self.output.set_device(device_id).await?;

        info!(channel = %self.channel.id(), device_id, "Channel output device changed");
        self.channel.emit(ChannelEvent::DeviceChanged {
            channel_id: self.channel.id().to_string(),
            device_id: device_id.to_string(),
        });
        Ok(())
    }
}

/// Read-only surface properties of a video channel.
pub struct VideoChannel<'a> {
    output: &'a dyn VideoOutput,
}

impl<'a> VideoChannel<'a> {
    pub(crate) fn new(output: &'a dyn VideoOutput) -> Self {
        Self { output }
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.output.frame_size()
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.output.frame_rate()
    }
}

/// Picks among streams embedded in the channel's source.
pub struct StreamSelection<'a> {
    channel: &'a MediaChannel,
    selector: &'a dyn StreamSelector,
}

impl<'a> StreamSelection<'a> {
    pub(crate) fn new(channel: &'a MediaChannel, selector: &'a dyn StreamSelector) -> Self {
        Self { channel, selector }
    }

    pub fn streams(&self) -> Vec<StreamInfo> {
        self.selector.streams()
    }

    /// # Errors
    ///
    /// [`MediaError::Validation`] when the source has no such stream.
    pub async fn select(&self, kind: StreamKind, index: usize) -> Result<()> {
        self.channel.ensure_alive()?;
        let known = self
            .selector
            .streams()
            .iter()
            .any(|s| s.kind == kind && s.index == index);
        if !known {
            return Err(MediaError::Validation(format!(
                "no {kind} stream at index {index}"
            )));
        }
        self.selector.select_stream(kind, index).await?;
        Ok(())
    }
}
