//! Demux/mux toolkit bridge traits.
//!
//! Stream extraction drives an external media toolkit (FFmpeg bindings, a
//! platform transcoder) through these traits. A [`PacketReader`] demuxes and
//! decodes the source container, a [`PacketWriter`] encodes or remuxes into
//! the destination container.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

use crate::engine::StreamInfo;
use crate::error::Result;

/// Container level properties of an opened input.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    /// Container format short name, also used as file extension on remux
    /// (`mkv`, `mp4`, ...).
    pub format: String,
    /// Total duration in microseconds. Zero or negative when unknown.
    pub duration_us: i64,
    pub streams: Vec<StreamInfo>,
}

impl ContainerInfo {
    pub fn stream(&self, index: usize) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.index == index)
    }
}

/// Compressed packet as read from a container.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPacket {
    pub stream_index: usize,
    pub pts_us: i64,
    pub keyframe: bool,
    pub data: Bytes,
}

/// Decoded frame ready for re-encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFrame {
    pub stream_index: usize,
    pub pts_us: i64,
    pub data: Bytes,
}

/// How the writer should treat incoming units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Copy packets into the new container unchanged.
    Remux,
    /// Re-encode decoded frames with the named codec.
    Transcode { codec: String },
}

/// Destination description handed to [`MediaToolkit::open_output`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub container: String,
    pub stream: StreamInfo,
    pub mode: OutputMode,
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    async fn open_input(&self, path: &Path) -> Result<Box<dyn PacketReader>>;

    async fn open_output(&self, path: &Path, spec: OutputSpec) -> Result<Box<dyn PacketWriter>>;
}

#[async_trait]
pub trait PacketReader: Send {
    fn info(&self) -> &ContainerInfo;

    /// Next packet from any stream, `None` at end of input.
    async fn read_packet(&mut self) -> Result<Option<MediaPacket>>;

    /// Decode one packet. May return zero or several frames.
    async fn decode(&mut self, packet: MediaPacket) -> Result<Vec<MediaFrame>>;

    /// Drain frames still buffered in the decoder for `stream_index`.
    async fn flush(&mut self, _stream_index: usize) -> Result<Vec<MediaFrame>> {
        Ok(Vec::new())
    }
}

#[async_trait]
pub trait PacketWriter: Send {
    async fn write_packet(&mut self, packet: MediaPacket) -> Result<()>;

    async fn encode_frame(&mut self, frame: MediaFrame) -> Result<()>;

    /// Flush encoders and write the container trailer.
    async fn finish(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StreamKind;

    #[test]
    fn container_stream_lookup_by_index() {
        let info = ContainerInfo {
            format: "mkv".into(),
            duration_us: 1_000_000,
            streams: vec![
                StreamInfo {
                    index: 0,
                    kind: StreamKind::Video,
                    codec: "h264".into(),
                    language: None,
                },
                StreamInfo {
                    index: 3,
                    kind: StreamKind::Audio,
                    codec: "aac".into(),
                    language: Some("en".into()),
                },
            ],
        };

        assert_eq!(info.stream(3).map(|s| s.kind), Some(StreamKind::Audio));
        assert!(info.stream(1).is_none());
    }
}
