//! Channel configuration

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Period of the position ticker while a channel is playing
    pub tick_interval: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
        }
    }
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_interval.is_zero() {
            return Err("tick_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config() {
        assert_eq!(ChannelConfig::default().tick_interval, Duration::from_millis(50));
        assert!(ChannelConfig::new()
            .with_tick_interval(Duration::ZERO)
            .validate()
            .is_err());
    }
}
