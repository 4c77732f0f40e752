//! Extraction configuration

use std::time::Duration;

/// Queue depth between the decode and encode stages.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Directory under the storage root that receives extracted streams
    pub output_directory: String,

    /// Units buffered between the decode and encode stages
    pub queue_capacity: usize,

    /// How often extraction progress is sampled
    pub progress_interval: Duration,

    /// Container for extracted audio
    pub audio_container: String,

    /// Codec audio is transcoded to
    pub audio_codec: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_directory: "extracted".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_interval: Duration::from_millis(100),
            audio_container: "wav".to_string(),
            audio_codec: "pcm_s16le".to_string(),
        }
    }
}

impl ExtractionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_directory(mut self, dir: impl Into<String>) -> Self {
        self.output_directory = dir.into();
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_audio_format(
        mut self,
        container: impl Into<String>,
        codec: impl Into<String>,
    ) -> Self {
        self.audio_container = container.into();
        self.audio_codec = codec.into();
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.output_directory.trim().is_empty() {
            return Err("output_directory cannot be empty".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".to_string());
        }

        if self.progress_interval.is_zero() {
            return Err("progress_interval must be greater than 0".to_string());
        }

        if self.audio_container.trim().is_empty() || self.audio_codec.trim().is_empty() {
            return Err("audio container and codec must be set".to_string());
        }

        Ok(())
    }
}
