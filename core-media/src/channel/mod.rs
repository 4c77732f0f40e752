//! Playback channels: the lifecycle state machine, position triggers and
//! capability views.

pub mod capability;
pub mod config;
pub mod session;
pub mod trigger;

pub use capability::{AudioChannel, StreamSelection, VideoChannel};
pub use config::ChannelConfig;
pub use session::{ChannelId, MediaChannel, LENGTH_METADATA_KEY};
pub use trigger::PositionTrigger;
